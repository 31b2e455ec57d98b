use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use shared::{DetectionResponse, ErrorResponse, Summary};
use std::sync::Arc;
use std::time::Duration;

use super::aggregator::{aggregate, to_records};
use super::provider::{Detection, DetectionProvider, ProviderError};
use crate::storage::image_store::{ImageStore, StorageError, StoredImage};
use crate::storage::upload_validator::{self, UploadError};

pub const MODEL_UNAVAILABLE_MESSAGE: &str = "Detection model is not loaded; no analysis was performed.";

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("{0}")]
    InvalidUpload(#[from] UploadError),
    #[error("Storage error: {0}")]
    Storage(std::io::Error),
    #[error("Detection failed: {0}")]
    ProviderFailure(#[from] ProviderError),
    #[error("Detection timed out after {0:?}")]
    ProviderTimeout(Duration),
}

impl From<StorageError> for DetectionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => DetectionError::Storage(e),
            StorageError::Rejected(reason) => DetectionError::InvalidUpload(reason),
        }
    }
}

impl ResponseError for DetectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            DetectionError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            DetectionError::Storage(_) | DetectionError::ProviderFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DetectionError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

/// Turns one uploaded image into a safety verdict.
#[derive(Clone)]
pub struct DetectionService {
    provider: Option<Arc<dyn DetectionProvider>>,
    store: ImageStore,
    inference_timeout: Duration,
}

impl DetectionService {
    /// `provider` is `None` when no model could be loaded; uploads are then
    /// still accepted but answered with an `Error` summary.
    pub fn new(
        provider: Option<Arc<dyn DetectionProvider>>,
        store: ImageStore,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            inference_timeout,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn has_model(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn handle_upload(
        &self,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<DetectionResponse, DetectionError> {
        let extension = upload_validator::validate(filename, &content)?;

        let store = self.store.clone();
        let stored = web::block(move || store.store(&extension, &content))
            .await
            .map_err(|e| DetectionError::Storage(std::io::Error::other(e.to_string())))??;
        log::info!(
            "Stored upload {} as {} ({}x{})",
            filename,
            stored.file_name(),
            stored.width,
            stored.height
        );

        let Some(provider) = self.provider.clone() else {
            log::warn!("No detection model loaded, returning degraded result for {}", stored.file_name());
            return Ok(DetectionResponse {
                success: true,
                image_url: stored.url(),
                image_width: stored.width,
                image_height: stored.height,
                summary: Summary::unavailable(),
                details: Vec::new(),
                error: Some(MODEL_UNAVAILABLE_MESSAGE.to_string()),
            });
        };

        let detections = self.run_inference(provider.clone(), &stored).await?;
        let labels = provider.class_labels();
        let summary = aggregate(&detections, labels);
        log::info!(
            "{}: {} workers, {} without helmet, risk {}% ({})",
            stored.file_name(),
            summary.total_workers,
            summary.helmet_not_worn,
            summary.risk_percentage,
            summary.safety_status
        );

        Ok(DetectionResponse {
            success: true,
            image_url: stored.url(),
            image_width: stored.width,
            image_height: stored.height,
            summary,
            details: to_records(&detections, labels),
            error: None,
        })
    }

    async fn run_inference(
        &self,
        provider: Arc<dyn DetectionProvider>,
        stored: &StoredImage,
    ) -> Result<Vec<Detection>, DetectionError> {
        let path = stored.path.clone();
        let inference = web::block(move || provider.infer(&path));

        match tokio::time::timeout(self.inference_timeout, inference).await {
            Ok(Ok(Ok(detections))) => Ok(detections),
            Ok(Ok(Err(e))) => {
                log::error!("Model inference error on {}: {:?}", stored.file_name(), e);
                Err(DetectionError::ProviderFailure(e))
            }
            Ok(Err(e)) => {
                log::error!("Inference task for {} failed: {}", stored.file_name(), e);
                Err(DetectionError::ProviderFailure(ProviderError::Inference(e.to_string())))
            }
            Err(_) => {
                log::error!(
                    "Inference on {} exceeded {:?}",
                    stored.file_name(),
                    self.inference_timeout
                );
                Err(DetectionError::ProviderTimeout(self.inference_timeout))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::detection::provider::ClassLabels;
    use std::path::Path;

    pub enum StubBehavior {
        Return(Vec<Detection>),
        Fail,
        Sleep(Duration),
    }

    /// Provider that answers from a script instead of a model.
    pub struct StubProvider {
        pub behavior: StubBehavior,
        pub labels: ClassLabels,
    }

    impl StubProvider {
        pub fn returning(detections: Vec<Detection>) -> Self {
            Self {
                behavior: StubBehavior::Return(detections),
                labels: ClassLabels::default(),
            }
        }
    }

    impl DetectionProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn infer(&self, image_path: &Path) -> Result<Vec<Detection>, ProviderError> {
            assert!(image_path.exists(), "provider called before the image was stored");
            match &self.behavior {
                StubBehavior::Return(detections) => Ok(detections.clone()),
                StubBehavior::Fail => Err(ProviderError::Inference("CUDA out of memory".into())),
                StubBehavior::Sleep(duration) => {
                    std::thread::sleep(*duration);
                    Ok(Vec::new())
                }
            }
        }

        fn class_labels(&self) -> &ClassLabels {
            &self.labels
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{StubBehavior, StubProvider};
    use super::*;
    use crate::detection::provider::{BoundingBox, ClassLabels};
    use crate::storage::image_store::testing::png;
    use shared::SafetyStatus;

    fn sample_detections() -> Vec<Detection> {
        vec![
            Detection {
                class_id: 0,
                confidence: 0.9,
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            },
            Detection {
                class_id: 1,
                confidence: 0.95,
                bbox: BoundingBox::new(20.0, 20.0, 40.0, 40.0),
            },
        ]
    }

    fn service(dir: &std::path::Path, provider: Option<StubProvider>) -> DetectionService {
        DetectionService::new(
            provider.map(|p| Arc::new(p) as Arc<dyn DetectionProvider>),
            ImageStore::new(dir),
            Duration::from_secs(5),
        )
    }

    #[actix_web::test]
    async fn summarizes_stub_detections() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Some(StubProvider::returning(sample_detections())));

        let response = service.handle_upload("site.jpg", png(64, 48)).await.unwrap();

        assert!(response.success);
        assert_eq!((response.image_width, response.image_height), (64, 48));
        assert!(response.image_url.starts_with("/uploads/"));
        assert!(response.image_url.ends_with(".jpg"));
        assert_eq!(
            response.summary,
            Summary {
                total_workers: 2,
                helmet_worn: 1,
                helmet_not_worn: 1,
                risk_percentage: 50.0,
                safety_status: SafetyStatus::Danger,
            }
        );
        assert_eq!(response.details.len(), 2);
        assert_eq!(response.details[0].class, "head");
        assert_eq!(response.details[0].confidence, 0.9);
        assert_eq!(response.details[1].class, "helmet");
        assert_eq!(response.details[1].confidence, 0.95);
        assert!(response.error.is_none());
    }

    #[actix_web::test]
    async fn missing_model_degrades_to_error_summary() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), None);
        assert!(!service.has_model());

        let response = service.handle_upload("site.png", png(10, 10)).await.unwrap();

        assert!(response.success);
        assert_eq!(response.summary, Summary::unavailable());
        assert_eq!(response.summary.safety_status, SafetyStatus::Error);
        assert!(response.details.is_empty());
        assert_eq!(response.error.as_deref(), Some(MODEL_UNAVAILABLE_MESSAGE));
    }

    #[actix_web::test]
    async fn invalid_uploads_never_reach_the_disk() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Some(StubProvider::returning(Vec::new())));

        let err = service.handle_upload("photo.gif", png(10, 10)).await.unwrap_err();
        assert!(matches!(err, DetectionError::InvalidUpload(UploadError::UnsupportedFileType)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = service
            .handle_upload("photo.png", vec![0u8; 11 * 1024 * 1024])
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidUpload(UploadError::FileTooLarge)));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn empty_file_is_rejected_at_decode_time() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Some(StubProvider::returning(Vec::new())));

        let err = service.handle_upload("empty.jpg", Vec::new()).await.unwrap_err();
        assert!(matches!(err, DetectionError::InvalidUpload(UploadError::CorruptImage)));
        assert_eq!(err.to_string(), "corrupt or unreadable image");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn provider_failure_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubProvider {
            behavior: StubBehavior::Fail,
            labels: ClassLabels::default(),
        };
        let service = service(dir.path(), Some(stub));

        let err = service.handle_upload("site.png", png(10, 10)).await.unwrap_err();
        assert!(matches!(err, DetectionError::ProviderFailure(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn slow_provider_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubProvider {
            behavior: StubBehavior::Sleep(Duration::from_millis(500)),
            labels: ClassLabels::default(),
        };
        let service = DetectionService::new(
            Some(Arc::new(stub)),
            ImageStore::new(dir.path()),
            Duration::from_millis(50),
        );

        let err = service.handle_upload("site.png", png(10, 10)).await.unwrap_err();
        assert!(matches!(err, DetectionError::ProviderTimeout(_)));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
