use serde::Deserialize;
use tracing::Level;

use crate::server::ServerError;

/// Where and how a [`Server`](crate::server::Server) listens.
///
/// Deserializable from any serde format; missing fields take their defaults:
///
/// ```
/// # use micro_app::ServerConfig;
/// let config: ServerConfig = serde_json::from_str(r#"{ "port": 9000 }"#).unwrap();
/// assert_eq!(config.address(), "127.0.0.1:9000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `SERVER_NAME` of every request; the host when unset.
    pub server_name: Option<String>,
    /// Max level of the log subscriber `Server::start` installs.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8000, server_name: None, log_level: "info".to_string() }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }

    pub fn level(&self) -> Result<Level, ServerError> {
        self.log_level.parse().map_err(|_| ServerError::InvalidLogLevel { level: self.log_level.clone() })
    }
}
