//! Image storage
//!
//! Recipe images and avatars arrive as base64 data URIs
//! (`data:image/png;base64,...`). They are validated against the media
//! configuration, checked against the file signature of their declared type,
//! and written under the media root with UUID file names.
//! Stored paths are relative to the media root and always use `/`.

use base64::Engine;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::config::MediaConfig;

/// Where an image belongs inside the media root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Recipe,
    Avatar,
}

impl ImageKind {
    fn dir(self) -> &'static str {
        match self {
            ImageKind::Recipe => "recipes/images",
            ImageKind::Avatar => "users/avatars",
        }
    }
}

/// Error types for image handling
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Upload a valid image. Expected a base64 data URI.")]
    InvalidFormat,

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Upload a valid image. The file is not a {0} image or is corrupted.")]
    ContentMismatch(String),

    #[error("Image too large. Maximum size: {0} bytes")]
    TooLarge(u64),

    #[error("Failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageError {
    /// Whether the client sent a bad image (as opposed to a storage failure)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ImageError::Io(_))
    }
}

/// Split a data URI into its MIME type and decoded bytes
pub fn decode_data_uri(input: &str) -> Result<(String, Vec<u8>), ImageError> {
    let rest = input
        .trim()
        .strip_prefix("data:")
        .ok_or(ImageError::InvalidFormat)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or(ImageError::InvalidFormat)?;
    if mime.is_empty() {
        return Err(ImageError::InvalidFormat);
    }

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| ImageError::InvalidFormat)?;
    if bytes.is_empty() {
        return Err(ImageError::InvalidFormat);
    }

    Ok((mime.to_ascii_lowercase(), bytes))
}

/// Whether `bytes` open with the file signature of `mime`.
///
/// Returns `None` for types without a known signature.
pub fn matches_signature(mime: &str, bytes: &[u8]) -> Option<bool> {
    let matches = match mime {
        "image/png" => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
        "image/jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/gif" => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        "image/webp" => bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP",
        "image/bmp" => bytes.starts_with(b"BM"),
        _ => return None,
    };
    Some(matches)
}

/// Writes, removes and links images under the media root
#[derive(Debug, Clone)]
pub struct ImageStore {
    config: MediaConfig,
    base_url: String,
}

impl ImageStore {
    /// Create a store for `config`, building URLs from `base_url`
    pub fn new(config: MediaConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Media root directory
    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Validate and store a data URI, returning its relative path
    pub async fn save(&self, kind: ImageKind, data_uri: &str) -> Result<String, ImageError> {
        let (mime, bytes) = decode_data_uri(data_uri)?;

        if !self.config.is_type_allowed(&mime) {
            return Err(ImageError::UnsupportedType(mime));
        }
        if bytes.len() as u64 > self.config.max_image_size {
            return Err(ImageError::TooLarge(self.config.max_image_size));
        }
        match matches_signature(&mime, &bytes) {
            Some(true) => {}
            Some(false) => return Err(ImageError::ContentMismatch(mime)),
            None => tracing::debug!("No signature check for {}", mime),
        }

        let dir = self.config.path.join(kind.dir());
        fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4(), self.config.get_extension(&mime));
        fs::write(dir.join(&file_name), &bytes).await?;

        let relative = format!("{}/{}", kind.dir(), file_name);
        tracing::debug!("Stored image {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    /// Delete a stored image. Missing files are ignored; other failures are logged.
    pub async fn remove(&self, relative: &str) {
        let Some(path) = self.resolve(relative) else {
            tracing::warn!("Refusing to remove image outside media root: {}", relative);
            return;
        };

        match fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed image {}", relative),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove image {}: {}", relative, e),
        }
    }

    /// Absolute URL of a stored image
    pub fn url(&self, relative: &str) -> String {
        format!("{}/media/{}", self.base_url, relative)
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        let safe = !relative.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.config.path.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    fn store(root: &Path) -> ImageStore {
        let config = MediaConfig {
            path: root.to_path_buf(),
            ..MediaConfig::default()
        };
        ImageStore::new(config, "http://food.test/")
    }

    #[test]
    fn test_decode_data_uri() {
        let (mime, bytes) =
            decode_data_uri(&format!("data:image/PNG;base64,{}", PNG)).expect("decode");
        assert_eq!(mime, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(matches!(decode_data_uri("hello"), Err(ImageError::InvalidFormat)));
        assert!(matches!(
            decode_data_uri("data:image/png,abcd"),
            Err(ImageError::InvalidFormat)
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(ImageError::InvalidFormat)
        ));
        assert!(matches!(
            decode_data_uri("data:;base64,AAAA"),
            Err(ImageError::InvalidFormat)
        ));
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = store(dir.path());

        let rel = store
            .save(ImageKind::Recipe, &format!("data:image/png;base64,{}", PNG))
            .await
            .expect("Failed to save image");
        assert!(rel.starts_with("recipes/images/"));
        assert!(rel.ends_with(".png"));
        assert!(dir.path().join(&rel).exists());
        assert_eq!(store.url(&rel), format!("http://food.test/media/{}", rel));

        store.remove(&rel).await;
        assert!(!dir.path().join(&rel).exists());
        store.remove(&rel).await;
    }

    #[tokio::test]
    async fn test_save_rejects_disallowed_type() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = store(dir.path())
            .save(ImageKind::Avatar, "data:text/plain;base64,aGVsbG8=")
            .await
            .expect_err("text is not an image");
        assert!(matches!(err, ImageError::UnsupportedType(ref t) if t == "text/plain"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_matches_signature() {
        assert_eq!(matches_signature("image/jpeg", &[0xFF, 0xD8, 0xFF, 0xE0]), Some(true));
        assert_eq!(matches_signature("image/gif", b"GIF89a...."), Some(true));
        assert_eq!(matches_signature("image/webp", b"RIFF\0\0\0\0WEBPVP8 "), Some(true));
        assert_eq!(matches_signature("image/webp", b"RIFF\0\0\0\0WAVE"), Some(false));
        assert_eq!(matches_signature("image/png", b"GIF89a"), Some(false));
        assert_eq!(matches_signature("image/svg+xml", b"<svg/>"), None);
    }

    #[tokio::test]
    async fn test_save_rejects_bytes_that_are_not_the_declared_image() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = store(dir.path())
            .save(ImageKind::Recipe, "data:image/png;base64,aGVsbG8gd29ybGQ=")
            .await
            .expect_err("text labelled as png");
        assert!(matches!(err, ImageError::ContentMismatch(ref t) if t == "image/png"));
        assert!(err.is_client_error());
        assert!(!dir.path().join("recipes/images").exists());
    }

    #[tokio::test]
    async fn test_save_rejects_oversized_image() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = MediaConfig {
            path: dir.path().to_path_buf(),
            max_image_size: 10,
            ..MediaConfig::default()
        };
        let err = ImageStore::new(config, "http://food.test")
            .save(ImageKind::Avatar, &format!("data:image/png;base64,{}", PNG))
            .await
            .expect_err("image exceeds limit");
        assert!(matches!(err, ImageError::TooLarge(10)));
    }

    #[tokio::test]
    async fn test_remove_ignores_escaping_paths() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, "x").unwrap();

        let media = dir.path().join("media");
        store(&media).remove("../keep.txt").await;
        assert!(outside.exists());
    }
}
