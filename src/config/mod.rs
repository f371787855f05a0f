#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{Cli, Command};
pub use toml_config::{
    AppConfig, CacheConfig, ComputeConfig, DataConfig, LogFormat, LoggingConfig, StorageBackend,
    StorageConfig,
};
