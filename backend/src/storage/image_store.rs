use image::ImageReader;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::upload_validator::UploadError;

pub const UPLOADS_URL_PREFIX: &str = "/uploads";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(UploadError),
}

/// An accepted upload that has been written to disk and decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub id: String,
    pub extension: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl StoredImage {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.extension)
    }

    pub fn url(&self) -> String {
        format!("{}/{}", UPLOADS_URL_PREFIX, self.file_name())
    }
}

/// Flat directory of uploaded images, each under a random name.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Persist `content` and confirm it decodes to a non-empty image.
    ///
    /// Undecodable files are removed again before the error is returned.
    pub fn store(&self, extension: &str, content: &[u8]) -> Result<StoredImage, StorageError> {
        let id = Self::generate_id();
        let path = self.root.join(format!("{}.{}", id, extension));

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);

        match probe_dimensions(&path) {
            Some((width, height)) => Ok(StoredImage {
                id,
                extension: extension.to_string(),
                path,
                width,
                height,
            }),
            None => {
                if let Err(e) = fs::remove_file(&path) {
                    log::error!("Failed to remove unreadable upload {}: {}", path.display(), e);
                }
                Err(StorageError::Rejected(UploadError::CorruptImage))
            }
        }
    }
}

fn probe_dimensions(path: &Path) -> Option<(u32, u32)> {
    let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    match reader.into_dimensions() {
        Ok((width, height)) if width > 0 && height > 0 => Some((width, height)),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Cannot decode {}: {}", path.display(), e);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{encode_image, png};
    use super::*;
    use image::ImageFormat;

    fn files_in(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn stores_decodable_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let stored = store.store("png", &png(32, 24)).unwrap();
        assert_eq!((stored.width, stored.height), (32, 24));
        assert!(stored.path.exists());
        assert_eq!(stored.url(), format!("/uploads/{}.png", stored.id));
        assert_eq!(stored.id.len(), 32);
    }

    #[test]
    fn detects_format_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        // JPEG bytes uploaded with a .png name still decode
        let stored = store.store("png", &encode_image(8, 6, ImageFormat::Jpeg)).unwrap();
        assert_eq!((stored.width, stored.height), (8, 6));
    }

    #[test]
    fn zero_byte_upload_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let err = store.store("jpg", &[]).unwrap_err();
        assert!(matches!(err, StorageError::Rejected(UploadError::CorruptImage)));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn garbage_bytes_are_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let err = store.store("png", b"definitely not an image").unwrap_err();
        assert_eq!(err.to_string(), "corrupt or unreadable image");
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn every_upload_gets_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let bytes = png(4, 4);

        let first = store.store("png", &bytes).unwrap();
        let second = store.store("png", &bytes).unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(files_in(dir.path()), 2);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("missing"));
        assert!(matches!(store.store("png", &png(2, 2)), Err(StorageError::Io(_))));

        store.ensure_dir().unwrap();
        assert!(store.store("png", &png(2, 2)).is_ok());
    }
}
