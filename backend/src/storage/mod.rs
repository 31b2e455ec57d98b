pub mod image_store;
pub mod upload_validator;
