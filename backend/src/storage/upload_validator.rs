use std::path::Path;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("unsupported file type")]
    UnsupportedFileType,
    #[error("file too large")]
    FileTooLarge,
    #[error("corrupt or unreadable image")]
    CorruptImage,
    #[error("no image file in request")]
    MissingFile,
}

/// Returns the lowercased extension when it is on the allow-list.
pub fn validate_extension(filename: &str) -> Result<String, UploadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or(UploadError::UnsupportedFileType)?;

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(UploadError::UnsupportedFileType)
    }
}

pub fn validate_size(len: usize) -> Result<(), UploadError> {
    if len > MAX_FILE_SIZE {
        return Err(UploadError::FileTooLarge);
    }
    Ok(())
}

/// Checks that can run before anything touches the disk.
pub fn validate(filename: &str, content: &[u8]) -> Result<String, UploadError> {
    let extension = validate_extension(filename)?;
    validate_size(content.len())?;
    Ok(extension)
}
