//! Node IPC: endpoint parsing, request/reply framing, sessions and the
//! round-robin session pool.

pub mod endpoint;
pub mod error;
pub mod frame;
pub mod pool;
pub mod session;

pub use endpoint::Endpoint;
pub use error::{ErrorCategory, IpcError};
pub use pool::{PoolStats, SessionPool};
pub use session::{SessionState, TransportSession};
