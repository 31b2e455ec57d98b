use actix_cors::Cors;
use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse};
use futures::TryStreamExt;
use shared::HealthResponse;
use std::path::PathBuf;

use crate::detection::service::{DetectionError, DetectionService};
use crate::storage::image_store::UPLOADS_URL_PREFIX;
use crate::storage::upload_validator::{self, UploadError, MAX_FILE_SIZE};

/// Multipart field that carries the image.
const FILE_FIELD: &str = "file";

pub fn configure_routes(cfg: &mut web::ServiceConfig, uploads_dir: PathBuf) {
    cfg.service(web::resource("/").route(web::get().to(health_check)))
        .service(web::resource("/api/detect").route(web::post().to(handle_detect)))
        .service(Files::new(UPLOADS_URL_PREFIX, uploads_dir));
}

/// Browser-side origin allow-list; `*` opens the API to every origin.
pub fn cors(allowed_origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }
    allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        message: "Helmet Detection API is running".to_string(),
    })
}

async fn handle_detect(
    service: web::Data<DetectionService>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await? {
        let (name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().map(str::to_owned),
                disposition.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };

        if name.as_deref() != Some(FILE_FIELD) {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let filename = filename.unwrap_or_default();
        if let Err(reason) = upload_validator::validate_extension(&filename) {
            log::warn!("Rejected upload {:?}: {}", filename, reason);
            return Err(DetectionError::from(reason).into());
        }

        let mut content = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if content.len() + chunk.len() > MAX_FILE_SIZE {
                log::warn!("Rejected upload {:?}: larger than {} bytes", filename, MAX_FILE_SIZE);
                return Err(DetectionError::from(UploadError::FileTooLarge).into());
            }
            content.extend_from_slice(&chunk);
        }
        upload = Some((filename, content));
        break;
    }

    let Some((filename, content)) = upload else {
        log::warn!("Detection request without a '{}' field", FILE_FIELD);
        return Err(DetectionError::from(UploadError::MissingFile).into());
    };

    match service.handle_upload(&filename, content).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => {
            if let DetectionError::InvalidUpload(reason) = &e {
                log::warn!("Rejected upload {:?}: {}", filename, reason);
            }
            Err(e.into())
        }
    }
}
