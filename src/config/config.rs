use parking_lot::RwLock;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use super::{cli::CliConfig, gateway::GatewaySettings, types::LogLevel};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub gateway: &'static GatewaySettings,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the gateway file is read with non-blocking IO.
    pub async fn init() {
        CliConfig::init();

        let cli = CliConfig::snapshot();
        GatewaySettings::init(&cli.config_file_location).await;

        let next = Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            gateway: GatewaySettings::handle(),
        };

        let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next)));
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
