//! Configuration for the record store, index, search and embedding provider
//!
//! Loaded from YAML (JSON is accepted too). Every field has a default, so a
//! missing file or a partial file both work.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "CHORUS_CONFIG";
pub const DATABASE_URL_ENV: &str = "CHORUS_DATABASE_URL";
pub const EMBEDDING_ENDPOINT_ENV: &str = "CHORUS_EMBEDDING_ENDPOINT";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChorusConfig {
  #[serde(default)]
  pub database: DatabaseConfig,
  #[serde(default)]
  pub index: IndexConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub embeddings: EmbeddingsConfig,
  #[serde(default)]
  pub validation: ValidationConfig,
}

/// Record store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
  #[serde(default = "default_database_url")]
  pub url: String,
  #[serde(default = "default_max_connections")]
  pub max_connections: u32,
  #[serde(default = "default_min_connections")]
  pub min_connections: u32,
  /// How long a caller waits for a pooled connection
  #[serde(default = "default_acquire_timeout_secs")]
  pub acquire_timeout_secs: u64,
  /// Busy timeout applied to every statement
  #[serde(default = "default_statement_timeout_secs")]
  pub statement_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
  /// Used when neither stored data nor a probe reveals the dimension
  #[serde(default = "default_fallback_dimension")]
  pub fallback_dimension: usize,
  #[serde(default = "default_probe_text")]
  pub probe_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
  #[serde(default = "default_limit")]
  pub default_limit: usize,
  #[serde(default = "default_threshold")]
  pub default_threshold: f32,
  /// Candidates fetched per requested result
  #[serde(default = "default_overfetch_factor")]
  pub overfetch_factor: usize,
  #[serde(default = "default_relaxation_factor")]
  pub relaxation_factor: f32,
  #[serde(default = "default_relaxation_floor")]
  pub relaxation_floor: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
  /// Embedding service URL. Without one the dimension probe is skipped.
  #[serde(default)]
  pub endpoint: Option<String>,
  #[serde(default = "default_embedding_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
  /// In characters
  #[serde(default = "default_max_content_length")]
  pub max_content_length: usize,
  /// Serialized JSON size
  #[serde(default = "default_max_metadata_bytes")]
  pub max_metadata_bytes: usize,
}

fn default_database_url() -> String {
  let path = default_data_dir().join("records.db");
  format!("sqlite://{}", path.display())
}
fn default_max_connections() -> u32 {
  20
}
fn default_min_connections() -> u32 {
  1
}
fn default_acquire_timeout_secs() -> u64 {
  30
}
fn default_statement_timeout_secs() -> u64 {
  5
}
fn default_fallback_dimension() -> usize {
  768
}
fn default_probe_text() -> String {
  "test".to_string()
}
fn default_limit() -> usize {
  10
}
fn default_threshold() -> f32 {
  0.7
}
fn default_overfetch_factor() -> usize {
  2
}
fn default_relaxation_factor() -> f32 {
  0.8
}
fn default_relaxation_floor() -> f32 {
  0.1
}
fn default_embedding_timeout_secs() -> u64 {
  30
}
fn default_max_content_length() -> usize {
  100_000
}
fn default_max_metadata_bytes() -> usize {
  50_000
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      url: default_database_url(),
      max_connections: default_max_connections(),
      min_connections: default_min_connections(),
      acquire_timeout_secs: default_acquire_timeout_secs(),
      statement_timeout_secs: default_statement_timeout_secs(),
    }
  }
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self { fallback_dimension: default_fallback_dimension(), probe_text: default_probe_text() }
  }
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      default_limit: default_limit(),
      default_threshold: default_threshold(),
      overfetch_factor: default_overfetch_factor(),
      relaxation_factor: default_relaxation_factor(),
      relaxation_floor: default_relaxation_floor(),
    }
  }
}

impl Default for EmbeddingsConfig {
  fn default() -> Self {
    Self { endpoint: None, timeout_secs: default_embedding_timeout_secs() }
  }
}

impl Default for ValidationConfig {
  fn default() -> Self {
    Self {
      max_content_length: default_max_content_length(),
      max_metadata_bytes: default_max_metadata_bytes(),
    }
  }
}

/// `~/.chorus`, or `./.chorus` when there is no home directory
pub fn default_data_dir() -> PathBuf {
  dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".chorus")
}

pub fn default_config_path() -> PathBuf {
  default_data_dir().join("config.yaml")
}

impl ChorusConfig {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ChorusConfig = serde_yaml::from_str(&content)
      .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
  }

  /// Resolve, load, override from the environment and validate.
  ///
  /// Lookup order: `explicit`, then `CHORUS_CONFIG`, then `~/.chorus/config.yaml`,
  /// then defaults. An explicitly named file must exist.
  pub fn load(explicit: Option<&Path>) -> Result<Self> {
    let mut config = match explicit {
      Some(path) => Self::load_from_file(path)?,
      None => match std::env::var_os(CONFIG_ENV) {
        Some(path) => Self::load_from_file(PathBuf::from(path))?,
        None => {
          let path = default_config_path();
          if path.exists() {
            Self::load_from_file(path)?
          } else {
            ChorusConfig::default()
          }
        }
      },
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
  }

  pub fn apply_env_overrides(&mut self) {
    if let Some(url) = non_empty_env(DATABASE_URL_ENV) {
      self.database.url = url;
    }
    if let Some(endpoint) = non_empty_env(EMBEDDING_ENDPOINT_ENV) {
      self.embeddings.endpoint = Some(endpoint);
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.database.max_connections == 0 {
      return Err(anyhow!("database.max_connections must be at least 1"));
    }
    if self.database.min_connections > self.database.max_connections {
      return Err(anyhow!(
        "database.min_connections ({}) exceeds max_connections ({})",
        self.database.min_connections,
        self.database.max_connections
      ));
    }
    if self.index.fallback_dimension == 0 {
      return Err(anyhow!("index.fallback_dimension must be positive"));
    }
    if self.search.overfetch_factor == 0 {
      return Err(anyhow!("search.overfetch_factor must be at least 1"));
    }

    let unit_interval = [
      ("search.default_threshold", self.search.default_threshold),
      ("search.relaxation_factor", self.search.relaxation_factor),
      ("search.relaxation_floor", self.search.relaxation_floor),
    ];
    for (name, value) in unit_interval {
      if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be between 0 and 1, got {}", name, value));
      }
    }
    Ok(())
  }

  /// Save configuration to a file
  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let content = serde_yaml::to_string(self)?;
    std::fs::write(path, content)?;
    Ok(())
  }
}

fn non_empty_env(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
