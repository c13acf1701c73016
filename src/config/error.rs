use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("toml error: {0}")]
    TomlDeError(#[from] toml::de::Error),
    #[error("config not found")]
    ConfigNotFound,
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
