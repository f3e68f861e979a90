pub mod auth;
pub mod config;
pub mod errors;
pub mod feed;
pub mod ipc;
pub mod rpc;
pub mod tls;
pub mod translator;

pub use config::Config;
pub use errors::{ErrorResponse, GatewayError};
pub use feed::{LiveFeed, SubscriptionRegistry};
pub use ipc::SessionPool;
pub use rpc::{FrontendTransport, NodeService};
pub use translator::ProtocolTranslator;
