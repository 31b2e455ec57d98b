mod config;
mod detection;
mod routes;
mod storage;

use actix_web::{web, App, HttpServer};
use config::ServerConfig;
use detection::load_provider;
use detection::provider::DetectionProvider;
use detection::service::DetectionService;
use routes::{configure_routes, cors};
use std::env;
use storage::image_store::ImageStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServerConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let store = ImageStore::new(&config.uploads_dir);
    store.ensure_dir()?;

    let provider = load_provider(&config.model);
    if let Some(provider) = &provider {
        log::info!("Using detection provider {}", provider.name());
    }
    let service = DetectionService::new(provider, store, config.model.inference_timeout());
    if !service.has_model() {
        log::warn!("Running without a detection model");
    }

    let uploads_dir = service.store().root().to_path_buf();
    let allowed_origins = config.allowed_origins.clone();
    let bind_address = config.bind_address();

    log::info!("Serving uploads from {}", uploads_dir.display());
    log::info!("Allowed origins: {:?}", allowed_origins);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&allowed_origins))
            .app_data(web::Data::new(service.clone()))
            .configure(|cfg| configure_routes(cfg, uploads_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
