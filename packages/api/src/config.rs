use actors::ConfigError;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Largest accepted upload body in bytes (default: 2 GiB).
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default      |
    /// |--------------------|--------------|
    /// | `HOST`             | `0.0.0.0`    |
    /// | `PORT`             | `3000`       |
    /// | `MAX_UPLOAD_BYTES` | `2147483648` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);
        let port = parse_env("PORT")?.unwrap_or(defaults.port);
        let max_upload_bytes = parse_env("MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes);

        Ok(Self {
            host,
            port,
            max_upload_bytes,
        })
    }
}

fn parse_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
