use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::search::{DEFAULT_CORRECTION_CUTOFF, DEFAULT_MAX_DISTANCE, DEFAULT_TOP_K};

/// Default embedding model; small, fast, and the model the stock catalog
/// indexes are built with.
const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Configuration for the retrieval engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum candidates returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum Euclidean distance for a plausible semantic match
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Similarity cutoff [0.0, 1.0] for input correction
    #[serde(default = "default_correction_cutoff")]
    pub correction_cutoff: f64,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            max_distance: DEFAULT_MAX_DISTANCE,
            correction_cutoff: DEFAULT_CORRECTION_CUTOFF,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_max_distance() -> f64 {
    DEFAULT_MAX_DISTANCE
}

fn default_correction_cutoff() -> f64 {
    DEFAULT_CORRECTION_CUTOFF
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    /// Load config.yaml from `base_path`, creating it with defaults when
    /// missing, and re-saving it when a config upgrade adds fields.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let config_path = base_path.join("config.yaml");

        if !config_path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            let defaults = Self {
                base_path: base_path.to_path_buf(),
                ..Self::default()
            };
            defaults.save()?;
            return Ok(defaults);
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self =
            serde_yml::from_str(&config_str).context("config.yaml is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case a config upgrade added fields
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = self.base_path.join("config.yaml");
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&config_path, config_str)
            .with_context(|| format!("failed to write {}", config_path.display()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Location of the persisted vector index.
    pub fn vectors_path(&self) -> PathBuf {
        self.base_path.join("vectors.bin")
    }

    fn validate(&self) -> anyhow::Result<()> {
        let engine = &self.engine;

        if engine.model.trim().is_empty() {
            bail!("engine.model must not be empty");
        }
        if engine.top_k == 0 {
            bail!("engine.top_k must be at least 1");
        }
        if engine.max_distance <= 0.0 {
            bail!(
                "engine.max_distance must be positive, got {}",
                engine.max_distance
            );
        }
        if !(0.0..=1.0).contains(&engine.correction_cutoff) {
            bail!(
                "engine.correction_cutoff must be between 0.0 and 1.0, got {}",
                engine.correction_cutoff
            );
        }
        if engine.download_timeout_secs == 0 {
            bail!("engine.download_timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.model, "all-MiniLM-L6-v2");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_distance, 1.0);
        assert_eq!(config.correction_cutoff, 0.6);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path()).unwrap();

        assert!(dir.path().join("config.yaml").exists());
        assert_eq!(config.engine.top_k, 5);
        assert_eq!(config.vectors_path(), dir.path().join("vectors.bin"));
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let first = Config::load_with(dir.path()).unwrap();
        let second = Config::load_with(dir.path()).unwrap();
        assert_eq!(first.engine.model, second.engine.model);
    }

    #[test]
    fn test_partial_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "engine:\n  top_k: 10\n").unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.engine.top_k, 10);
        assert_eq!(config.engine.model, "all-MiniLM-L6-v2");
        assert_eq!(config.engine.max_distance, 1.0);
    }

    #[test]
    fn test_invalid_cutoff_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "engine:\n  correction_cutoff: 1.5\n",
        )
        .unwrap();

        assert!(Config::load_with(dir.path()).is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "engine:\n  top_k: 0\n").unwrap();

        assert!(Config::load_with(dir.path()).is_err());
    }
}
