use crate::core::compute::ComputeOptions;
use crate::utils::error::{PhenologyError, Result};
use crate::utils::validation::{self, Validate};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Application settings, loaded from TOML. Every section is optional.
///
/// ```toml
/// [data]
/// dir = "./data"
///
/// [storage]
/// backend = "postgis"
/// database_url = "${DATABASE_URL}"
///
/// [cache]
/// point_ttl_seconds = 120
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub compute: ComputeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Raster root; stacks live under `{dir}/raw/{product}/{year}/`.
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub point_max_entries: usize,
    pub point_ttl_seconds: f64,
    pub timeseries_max_entries: usize,
    pub timeseries_ttl_seconds: f64,
    pub area_stats_max_entries: usize,
    pub area_stats_ttl_seconds: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            point_max_entries: 50_000,
            point_ttl_seconds: 300.0,
            timeseries_max_entries: 10_000,
            timeseries_ttl_seconds: 300.0,
            area_stats_max_entries: 1_000,
            area_stats_ttl_seconds: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub default_threshold_frac: f64,
    pub default_is_forest: bool,
    pub batch_chunk_size: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            default_threshold_frac: crate::core::algorithm::DEFAULT_THRESHOLD_FRAC,
            default_is_forest: true,
            batch_chunk_size: crate::app::batch::DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"))
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PhenologyError::ConfigError {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| PhenologyError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
            })
            .into_owned()
    }

    pub fn compute_options(&self) -> ComputeOptions {
        ComputeOptions {
            threshold_frac: self.compute.default_threshold_frac,
            is_forest_default: self.compute.default_is_forest,
        }
    }
}

fn validate_ttl(field: &str, seconds: f64) -> Result<()> {
    if seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok() {
        Ok(())
    } else {
        Err(PhenologyError::InvalidConfigValueError {
            field: field.to_string(),
            value: seconds.to_string(),
            reason: "TTL must be a positive number of seconds".to_string(),
        })
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("data.dir", &self.data.dir.to_string_lossy())?;

        if self.storage.backend == StorageBackend::Postgis {
            let url = self.storage.database_url.as_deref().unwrap_or_default();
            validation::validate_database_url("storage.database_url", url)?;
        }
        validation::validate_range("storage.max_pool_size", self.storage.max_pool_size, 1, 256)?;

        if self.cache.enabled {
            validate_ttl("cache.point_ttl_seconds", self.cache.point_ttl_seconds)?;
            validate_ttl("cache.timeseries_ttl_seconds", self.cache.timeseries_ttl_seconds)?;
            validate_ttl("cache.area_stats_ttl_seconds", self.cache.area_stats_ttl_seconds)?;
        }

        validation::validate_fraction(
            "compute.default_threshold_frac",
            self.compute.default_threshold_frac,
        )?;
        validation::validate_positive_number(
            "compute.batch_chunk_size",
            self.compute.batch_chunk_size,
            1,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.cache.point_max_entries, 50_000);
        assert_eq!(config.cache.point_ttl_seconds, 300.0);
        assert_eq!(config.compute.default_threshold_frac, 0.5);
        assert!(config.compute.default_is_forest);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[data]
dir = "/srv/fpts"

[storage]
backend = "postgis"
database_url = "postgresql://fpts:secret@db:5432/fpts"
max_pool_size = 4

[cache]
enabled = true
point_ttl_seconds = 60
area_stats_max_entries = 10

[compute]
default_threshold_frac = 0.4
default_is_forest = false

[logging]
format = "json"
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.data.dir, PathBuf::from("/srv/fpts"));
        assert_eq!(config.storage.backend, StorageBackend::Postgis);
        assert_eq!(config.storage.max_pool_size, 4);
        assert_eq!(config.cache.point_ttl_seconds, 60.0);
        assert_eq!(config.cache.area_stats_max_entries, 10);
        assert_eq!(config.cache.timeseries_max_entries, 10_000);
        assert_eq!(config.logging.format, LogFormat::Json);

        let options = config.compute_options();
        assert_eq!(options.threshold_frac, 0.4);
        assert!(!options.is_forest_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FPTS_TEST_DATA_DIR", "/tmp/fpts-data");
        let config = AppConfig::from_toml_str(
            r#"
[data]
dir = "${FPTS_TEST_DATA_DIR}"
"#,
        )
        .unwrap();
        assert_eq!(config.data.dir, PathBuf::from("/tmp/fpts-data"));

        let untouched = AppConfig::from_toml_str(
            r#"
[data]
dir = "${FPTS_TEST_SURELY_UNSET_VAR}"
"#,
        )
        .unwrap();
        assert_eq!(
            untouched.data.dir,
            PathBuf::from("${FPTS_TEST_SURELY_UNSET_VAR}")
        );
    }

    #[test]
    fn test_postgis_requires_database_url() {
        let config = AppConfig::from_toml_str("[storage]\nbackend = \"postgis\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PhenologyError::InvalidConfigValueError { ref field, .. } if field == "storage.database_url"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_frac = AppConfig::from_toml_str("[compute]\ndefault_threshold_frac = 1.0\n").unwrap();
        assert!(bad_frac.validate().is_err());

        let bad_ttl = AppConfig::from_toml_str("[cache]\ntimeseries_ttl_seconds = 0\n").unwrap();
        assert!(bad_ttl.validate().is_err());

        let huge_ttl = AppConfig::from_toml_str("[cache]\npoint_ttl_seconds = 1e20\n").unwrap();
        let err = huge_ttl.validate().unwrap_err();
        assert!(matches!(err, PhenologyError::InvalidConfigValueError { ref field, .. } if field == "cache.point_ttl_seconds"));

        let disabled = AppConfig::from_toml_str("[cache]\nenabled = false\npoint_ttl_seconds = 0\n")
            .unwrap();
        assert!(disabled.validate().is_ok());

        assert!(AppConfig::from_toml_str("[storage]\nbackend = \"sqlite\"\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[data]\ndir = \"./rasters\"").unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.data.dir, PathBuf::from("./rasters"));

        let err = AppConfig::from_file("/nonexistent/fpts.toml").unwrap_err();
        assert!(matches!(err, PhenologyError::ConfigError { .. }));
    }
}
