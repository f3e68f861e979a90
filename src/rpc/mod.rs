pub mod connection;
pub mod envelope;
pub mod messages;
pub mod service;
pub mod transport;

pub use connection::FrontendConnection;
pub use envelope::{CallEnvelope, Method, ResponseFrame};
pub use service::NodeService;
pub use transport::FrontendTransport;
