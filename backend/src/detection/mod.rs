pub mod aggregator;
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub mod postprocess;
pub mod provider;
pub mod service;
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub mod shared_model;
#[cfg(feature = "torch")]
pub mod yolo;

use std::sync::Arc;

use crate::config::ModelConfig;
use provider::DetectionProvider;

/// Load the configured model, or `None` when there is nothing usable.
pub fn load_provider(config: &ModelConfig) -> Option<Arc<dyn DetectionProvider>> {
    if !config.path.exists() {
        log::warn!(
            "Model file not found at {}; detection requests will return an Error status",
            config.path.display()
        );
        return None;
    }

    #[cfg(feature = "torch")]
    {
        match yolo::YoloModel::load(config) {
            Ok(model) => {
                log::info!("Detection model ready, classes: {:?}", config.class_labels);
                Some(Arc::new(model))
            }
            Err(e) => {
                log::error!("Failed to load model {}: {}", config.path.display(), e);
                None
            }
        }
    }

    #[cfg(not(feature = "torch"))]
    {
        let err = provider::ProviderError::ModelLoad(
            "this build has no inference backend (enable the `torch` feature)".into(),
        );
        log::warn!("Cannot use {}: {}", config.path.display(), err);
        None
    }
}
