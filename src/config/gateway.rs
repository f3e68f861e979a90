use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::ipc::Endpoint;

// -----------------------------------------------------------------------------
// ----- Singleton -------------------------------------------------------------

static GATEWAY: OnceCell<GatewaySettings> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

pub const DEFAULT_CONNECTION: &str = "local:///tmp/nano";
pub const DEFAULT_POOL_SIZE: usize = 3;
pub const DEFAULT_FEED_URL: &str = "ws://127.0.0.1:7078/";

// -----------------------------------------------------------------------------
// ----- GatewaySettings -------------------------------------------------------

/// Validated contents of the gateway file.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub node: NodeSettings,
    pub feed: FeedSettings,
    pub tls: Option<TlsSettings>,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub endpoint: Endpoint,
    pub pool_size: usize,
    pub io_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub url: String,
    pub local_accounts_only: bool,
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSettings {
    Disabled,
    Enabled { public_key: PathBuf },
}

// -----------------------------------------------------------------------------
// ----- GatewaySettings: Static -----------------------------------------------

impl GatewaySettings {
    /// Init: panic on any error. Do not continue with a bad state.
    pub async fn init(path: &Path) {
        let settings = Self::from_file(path)
            .await
            .unwrap_or_else(|e| panic!("failed to load gateway config from {:?}: {e}", path));

        GATEWAY
            .set(settings)
            .unwrap_or_else(|_| panic!("GatewaySettings::init called twice"));
    }

    pub fn handle() -> &'static GatewaySettings {
        GATEWAY.get().expect("gateway config not initialized")
    }

    pub async fn from_file(path: &Path) -> Result<GatewaySettings, ConfigError> {
        let raw = fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<GatewaySettings, ConfigError> {
        let doc: GatewayFile = toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;

        let endpoint = Endpoint::parse(&doc.node.connection)
            .map_err(|e| ConfigError::InvalidField("node.connection".into(), e.to_string()))?;

        if doc.node.pool_size == 0 {
            return Err(ConfigError::InvalidField(
                "node.pool_size".into(),
                "must be at least 1".into(),
            ));
        }

        validate_feed_url(&doc.feed.url)?;

        let tls = match (doc.tls.cert, doc.tls.key) {
            (None, None) => None,
            (Some(cert), Some(key)) => Some(TlsSettings { cert, key }),
            (Some(_), None) => return Err(ConfigError::MissingField("tls.key".into())),
            (None, Some(_)) => return Err(ConfigError::MissingField("tls.cert".into())),
        };

        let auth = match (doc.auth.enabled, doc.auth.public_key) {
            (false, _) => AuthSettings::Disabled,
            (true, Some(public_key)) => AuthSettings::Enabled { public_key },
            (true, None) => return Err(ConfigError::MissingField("auth.public_key".into())),
        };

        Ok(GatewaySettings {
            node: NodeSettings {
                endpoint,
                pool_size: doc.node.pool_size,
                io_timeout: doc.node.io_timeout,
            },
            feed: FeedSettings {
                url: doc.feed.url,
                local_accounts_only: doc.feed.local_accounts_only,
                accounts: doc.feed.accounts,
            },
            tls,
            auth,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GatewayFile {
    #[serde(default)]
    node: NodeSection,

    #[serde(default)]
    feed: FeedSection,

    #[serde(default)]
    tls: TlsSection,

    #[serde(default)]
    auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSection {
    #[serde(default = "default_connection")]
    connection: String,

    #[serde(default = "default_pool_size")]
    pool_size: usize,

    #[serde(default, deserialize_with = "de_duration")]
    io_timeout: Option<Duration>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            pool_size: DEFAULT_POOL_SIZE,
            io_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeedSection {
    #[serde(default = "default_feed_url")]
    url: String,

    #[serde(default)]
    local_accounts_only: bool,

    #[serde(default)]
    accounts: Vec<String>,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            local_accounts_only: false,
            accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TlsSection {
    #[serde(default)]
    cert: Option<PathBuf>,

    #[serde(default)]
    key: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthSection {
    #[serde(default)]
    enabled: bool,

    #[serde(default)]
    public_key: Option<PathBuf>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_string()
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn validate_feed_url(raw: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(raw)
        .map_err(|e| ConfigError::InvalidField("feed.url".into(), e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidField(
            "feed.url".into(),
            format!("unsupported scheme '{other}'"),
        )),
    }
}

/// Humantime string ("30s", "1m 30s") or integer milliseconds.
fn de_duration<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Unexpected, Visitor};
    use std::fmt;

    struct OptVisitor;
    struct DurationVisitor;

    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration (e.g., \"30s\") or integer milliseconds")
        }
        fn visit_none<E: Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_some<D2>(self, d2: D2) -> Result<Self::Value, D2::Error>
        where
            D2: serde::Deserializer<'de>,
        {
            d2.deserialize_any(DurationVisitor)
        }
    }

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration (e.g., \"30s\") or integer milliseconds")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_millis(v)))
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
            if v < 0 {
                return Err(E::invalid_value(Unexpected::Signed(v), &self));
            }
            Ok(Some(Duration::from_millis(v as u64)))
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_option(OptVisitor)
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("invalid field '{0}': {1}")]
    InvalidField(String, String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
