use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::query::QueryClientConfig;

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "STOREFRONT_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Service root, e.g. `https://shop.example.com/api`
  #[serde(default)]
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: String::new(),
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_user_agent() -> String {
  format!("storefront/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds an unobserved query stays cached
  #[serde(default = "default_gc_time_secs")]
  pub gc_time_secs: u64,
  /// Seconds between garbage collection sweeps
  #[serde(default = "default_gc_interval_secs")]
  pub gc_interval_secs: u64,
  /// Extra attempts after a failed fetch (0 = surface the first error)
  #[serde(default)]
  pub retry: u32,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      gc_time_secs: default_gc_time_secs(),
      gc_interval_secs: default_gc_interval_secs(),
      retry: 0,
    }
  }
}

fn default_gc_time_secs() -> u64 {
  300
}

fn default_gc_interval_secs() -> u64 {
  60
}

impl CacheConfig {
  pub fn client_config(&self) -> QueryClientConfig {
    QueryClientConfig {
      gc_time: Duration::from_secs(self.gc_time_secs),
    }
  }

  pub fn gc_interval(&self) -> Duration {
    Duration::from_secs(self.gc_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// `tracing` filter directive; `RUST_LOG` wins when set
  pub filter: Option<String>,
  /// Where log files go (default: $XDG_DATA_HOME/storefront/logs)
  pub directory: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront/config.yaml
  ///
  /// Without a file, defaults are used; the base URL must then come from
  /// the environment or the command line.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api.base_url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storefront.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Check that everything needed to talk to the service is present.
  pub fn validate(&self) -> Result<()> {
    if self.api.base_url.trim().is_empty() {
      return Err(eyre!(
        "No API base URL configured. Set api.base_url in storefront.yaml, \
         the {} environment variable, or pass --api-url.",
        API_URL_ENV
      ));
    }
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be greater than zero"));
    }
    Ok(())
  }

  /// Directory for log files.
  pub fn log_directory(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.log.directory {
      return Ok(dir.clone());
    }
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("storefront").join("logs"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_load_from_path_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "api:\n  base_url: https://shop.example.com/api\ncache:\n  retry: 2\n"
    )
    .unwrap();

    let config = Config::load_from_path(file.path()).unwrap();
    assert_eq!(config.api.base_url, "https://shop.example.com/api");
    assert_eq!(config.api.timeout_secs, 10);
    assert!(config.api.user_agent.starts_with("storefront/"));
    assert_eq!(config.cache.retry, 2);
    assert_eq!(config.cache.gc_time_secs, 300);
    assert_eq!(
      config.cache.client_config().gc_time,
      Duration::from_secs(300)
    );
    assert!(config.log.filter.is_none());
    config.validate().unwrap();
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_invalid_yaml_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api: [not, a, map]").unwrap();
    let err = Config::load_from_path(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
  }

  #[test]
  fn test_validate_requires_base_url() {
    let config = Config::default();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains(API_URL_ENV));
  }

  #[test]
  fn test_gc_interval_never_zero() {
    let cache = CacheConfig {
      gc_interval_secs: 0,
      ..CacheConfig::default()
    };
    assert_eq!(cache.gc_interval(), Duration::from_secs(1));
  }

  #[test]
  fn test_explicit_log_directory() {
    let config = Config {
      log: LogConfig {
        filter: None,
        directory: Some(PathBuf::from("/tmp/storefront-logs")),
      },
      ..Config::default()
    };
    assert_eq!(
      config.log_directory().unwrap(),
      PathBuf::from("/tmp/storefront-logs")
    );
  }
}
