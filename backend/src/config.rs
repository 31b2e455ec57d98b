use actix_web::http::Uri;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection::provider::ClassLabels;

pub const DEFAULT_CONFIG_PATH: &str = "config/server.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// TorchScript export of the trained detector.
    pub path: PathBuf,
    pub class_labels: BTreeMap<u32, String>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub inference_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            uploads_dir: PathBuf::from("uploads"),
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let mut class_labels = BTreeMap::new();
        class_labels.insert(0, "head".to_string());
        class_labels.insert(1, "helmet".to_string());
        Self {
            path: PathBuf::from("models/best.torchscript"),
            class_labels,
            confidence_threshold: 0.2,
            iou_threshold: 0.7,
            input_size: 640,
            inference_timeout_secs: 30,
        }
    }
}

impl ModelConfig {
    pub fn class_labels(&self) -> ClassLabels {
        ClassLabels::new(self.class_labels.clone())
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

impl ServerConfig {
    /// Load from `HELMET_CONFIG` (or the default path) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("HELMET_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file_or_default(Path::new(&config_path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        log::info!("Loading configuration from {}", path.display());
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => log::warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(dir) = lookup("UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        let model = &self.model;
        if !(0.0..=1.0).contains(&model.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold {} outside [0, 1]",
                model.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&model.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "iou_threshold {} outside [0, 1]",
                model.iou_threshold
            )));
        }
        if model.input_size == 0 {
            return Err(ConfigError::Invalid("input_size must be positive".into()));
        }
        if model.inference_timeout_secs == 0 {
            return Err(ConfigError::Invalid("inference_timeout_secs must be positive".into()));
        }
        if model.class_labels.is_empty() {
            return Err(ConfigError::Invalid("class_labels must not be empty".into()));
        }
        for origin in &self.allowed_origins {
            validate_origin(origin)?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `*` or `scheme://host[:port]`, the forms the CORS layer accepts.
fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    if origin == "*" {
        return Ok(());
    }
    let invalid = || ConfigError::Invalid(format!("allowed origin {:?} is not scheme://host[:port]", origin));
    let uri: Uri = origin.parse().map_err(|_| invalid())?;
    if uri.scheme_str().is_none() || uri.host().is_none() {
        return Err(invalid());
    }
    if uri.path_and_query().is_some_and(|p| p.as_str() != "/" && !p.as_str().is_empty()) {
        return Err(invalid());
    }
    Ok(())
}
