pub mod cli;
pub mod config;
pub mod gateway;
pub mod types;

pub use config::Config;
pub use gateway::{AuthSettings, ConfigError, FeedSettings, GatewaySettings, NodeSettings, TlsSettings};
pub use types::LogLevel;
