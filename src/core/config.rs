use crate::core::errors::ConfigError;
use std::env;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Inference service configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL of the local Ollama endpoint
    pub base_url: String,
    /// Prompt sent with every describe request
    pub prompt: String,
    /// TCP connect timeout; the generate call itself carries no overall
    /// deadline of its own (the service enforces whatever it enforces)
    pub connect_timeout: Duration,
}

/// Metadata writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// exiftool binary, resolved through PATH unless absolute
    pub binary: String,
    /// Hard deadline for one exiftool invocation
    pub timeout: Duration,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub writer: WriterConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Ok(Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1420),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                log_level,
            },
            ollama: OllamaConfig {
                base_url: env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                prompt: env::var("DESCRIBE_PROMPT")
                    .unwrap_or_else(|_| "Describe this image in detail.".to_string()),
                connect_timeout: Duration::from_secs(
                    env::var("OLLAMA_CONNECT_TIMEOUT_SECONDS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(10),
                ),
            },
            writer: WriterConfig {
                binary: env::var("EXIFTOOL_PATH").unwrap_or_else(|_| "exiftool".to_string()),
                timeout: Duration::from_secs(
                    env::var("EXIFTOOL_TIMEOUT_SECONDS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(8),
                ),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.ollama.base_url.starts_with("http://") && !self.ollama.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidServiceUrl(self.ollama.base_url.clone()));
        }

        if self.writer.timeout.is_zero() {
            return Err(ConfigError::InvalidWriterTimeout);
        }

        if self.writer.binary.trim().is_empty() {
            return Err(ConfigError::EmptyWriterBinary);
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn ollama_url(&self) -> &str {
        &self.ollama.base_url
    }

    pub fn writer_binary(&self) -> &str {
        &self.writer.binary
    }

    pub fn writer_timeout(&self) -> Duration {
        self.writer.timeout
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                port: 1420,
                host: "127.0.0.1".into(),
                log_level: Level::INFO,
            },
            ollama: OllamaConfig {
                base_url: "http://localhost:11434".into(),
                prompt: "Describe this image in detail.".into(),
                connect_timeout: Duration::from_secs(10),
            },
            writer: WriterConfig {
                binary: "exiftool".into(),
                timeout: Duration::from_secs(8),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_service_url() {
        let mut config = base_config();
        config.ollama.base_url = "localhost:11434".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidServiceUrl(_))
        ));
    }

    #[test]
    fn test_rejects_zero_writer_timeout() {
        let mut config = base_config();
        config.writer.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWriterTimeout)));
    }
}
