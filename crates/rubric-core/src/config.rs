use crate::error::{Error, Result};
use crate::grading::GradingPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default, rename = "configVersion", alias = "version")]
    pub version: u32,
    #[serde(default = "default_db_path")]
    pub db: PathBuf,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default, skip_serializing_if = "is_default_settings")]
    pub settings: Settings,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub grader: GraderConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            db: default_db_path(),
            max_score: default_max_score(),
            review_threshold: default_review_threshold(),
            settings: Settings::default(),
            provider: ProviderConfig::default(),
            grader: GraderConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn policy(&self) -> GradingPolicy {
        GradingPolicy {
            max_score: self.max_score,
            review_threshold: self.review_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

fn is_default_settings(s: &Settings) -> bool {
    s == &Settings::default()
}

/// Run-executor provider: which model backend answers questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String, // "fake" | "openai"
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "fake".into(),
            model: "fake-model".into(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Grader provider: how answers are scored against expected answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    pub provider: String, // "heuristic" | "openai" | "fake"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Samples per grading call, averaged.
    pub samples: u32,
    /// Ignore the grader cache and re-grade live.
    #[serde(default)]
    pub refresh: bool,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            provider: "heuristic".into(),
            model: None,
            temperature: 0.0,
            max_tokens: 800,
            samples: 1,
            refresh: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".rubric/rubric.db")
}

fn default_max_score() -> f64 {
    100.0
}

fn default_review_threshold() -> f64 {
    0.7
}

pub fn load_config(path: &Path) -> Result<TrackerConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = std::collections::HashSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);

    // serde_ignored wrapper to capture unknown fields
    let cfg: TrackerConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| Error::Config(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        tracing::warn!(?ignored_keys, "ignored unknown config fields");
    }

    if cfg.version != 0 && cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(Error::Config(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }

    if cfg.max_score <= 0.0 {
        return Err(Error::Config("max_score must be positive".into()));
    }
    if !(0.0..=1.0).contains(&cfg.review_threshold) {
        return Err(Error::Config(
            "review_threshold must be within 0.0..=1.0".into(),
        ));
    }

    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<()> {
    std::fs::write(
        path,
        r#"configVersion: 1
db: .rubric/rubric.db
max_score: 100.0
review_threshold: 0.7
settings:
  parallel: 4
  timeout_seconds: 30
provider:
  provider: fake
  model: fake-model
  temperature: 0.0
  max_tokens: 1024
grader:
  provider: heuristic
  temperature: 0.0
  max_tokens: 800
  samples: 1
server:
  host: 0.0.0.0
  port: 3000
"#,
    )
    .map_err(|e| Error::Config(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.yaml");
        write_sample_config(&path).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.version, SUPPORTED_CONFIG_VERSION);
        assert_eq!(cfg.grader.provider, "heuristic");
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.yaml");
        std::fs::write(&path, "review_threshold: 1.5\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
