use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the workflow service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub watch: WatchConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("EDUFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("EDUFLOW_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("EDUFLOW_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("EDUFLOW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let reload_debounce_ms = env::var("EDUFLOW_RELOAD_DEBOUNCE_MS")
            .unwrap_or_else(|_| "250".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidDebounce)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            watch: WatchConfig { reload_debounce_ms },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Change-feed debounce controls.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub reload_debounce_ms: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidDebounce,
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "EDUFLOW_PORT must be a valid u16"),
            ConfigError::InvalidDebounce => {
                write!(f, "EDUFLOW_RELOAD_DEBOUNCE_MS must be a valid u64")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "EDUFLOW_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDebounce => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
