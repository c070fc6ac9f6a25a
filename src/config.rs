//! Server options.
//!
//! Options are plain serde data so they can live in whatever JSON document
//! the host process loads. Callbacks cannot be expressed in JSON; attach them
//! with [`LoggingOptions::request_data`] / [`LoggingOptions::response_data`].

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::request::Request;

/// Name of the section read by [`ServerOptions::from_section`].
pub const CONFIG_SECTION: &str = "restlayer";

/// Body parser ceiling applied when no explicit limit is configured.
pub const DEFAULT_BODY_SIZE_MB: u64 = 10;

/// Extracts extra structured fields from a request for a log event.
pub type LogDataCallback = Arc<dyn Fn(&Request) -> Map<String, Value> + Send + Sync>;

/// Severity of a log event family.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// `logging` block of [`ServerOptions`].
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingOptions {
    pub request_log_level: LogLevel,
    pub response_log_level: LogLevel,
    #[serde(skip)]
    pub request_log_data_callback: Option<LogDataCallback>,
    #[serde(skip)]
    pub response_log_data_callback: Option<LogDataCallback>,
}

impl LoggingOptions {
    pub fn request_data(
        mut self,
        f: impl Fn(&Request) -> Map<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.request_log_data_callback = Some(Arc::new(f));
        self
    }

    pub fn response_data(
        mut self,
        f: impl Fn(&Request) -> Map<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.response_log_data_callback = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions")
            .field("request_log_level", &self.request_log_level)
            .field("response_log_level", &self.response_log_level)
            .field("request_log_data_callback", &self.request_log_data_callback.is_some())
            .field("response_log_data_callback", &self.response_log_data_callback.is_some())
            .finish()
    }
}

/// Everything the assembler reads. Feature toggles are opt-out: an absent
/// `noCors` means CORS is on.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOptions {
    pub port: Option<u16>,
    pub url_prefix: String,
    pub no_cors: bool,
    pub no_compression: bool,
    pub no_trust_proxy: bool,
    /// Passed through untouched to the session store factory.
    pub session: Option<Value>,
    pub json_body_size_limit_in_mb: Option<u64>,
    pub encoded_body_size_limit_in_mb: Option<u64>,
    pub logging: LoggingOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: None,
            url_prefix: "/".to_owned(),
            no_cors: false,
            no_compression: false,
            no_trust_proxy: false,
            session: None,
            json_body_size_limit_in_mb: None,
            encoded_body_size_limit_in_mb: None,
            logging: LoggingOptions::default(),
        }
    }
}

impl ServerOptions {
    /// Options listening on `port` with every default applied.
    pub fn with_port(port: u16) -> Self {
        Self { port: Some(port), ..Self::default() }
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads `config[section]`. A missing section is fatal.
    pub fn from_section(config: &Value, section: &str) -> Result<Self, ConfigError> {
        let value = config
            .get(section)
            .ok_or_else(|| ConfigError::MissingSection(section.to_owned()))?;
        Self::from_value(value.clone())
    }

    /// Returns the listening port or the reason there is none.
    pub fn validate(&self) -> Result<u16, ConfigError> {
        match self.port {
            None => Err(ConfigError::MissingPort),
            Some(0) => Err(ConfigError::InvalidPort),
            Some(port) => Ok(port),
        }
    }

    pub fn cors_enabled(&self) -> bool { !self.no_cors }
    pub fn compression_enabled(&self) -> bool { !self.no_compression }
    pub fn trust_proxy_enabled(&self) -> bool { !self.no_trust_proxy }

    pub fn json_limit_bytes(&self) -> usize {
        mb_to_bytes(self.json_body_size_limit_in_mb)
    }

    pub fn encoded_limit_bytes(&self) -> usize {
        mb_to_bytes(self.encoded_body_size_limit_in_mb)
    }
}

fn mb_to_bytes(mb: Option<u64>) -> usize {
    let mb = match mb {
        Some(0) | None => DEFAULT_BODY_SIZE_MB,
        Some(mb) => mb,
    };
    usize::try_from(mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
}
