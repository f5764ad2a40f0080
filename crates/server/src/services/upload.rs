//! Image uploads written to the local upload directory.

use std::path::Path;

use tracing::{info, instrument};

use crate::error::AppError;

/// Largest accepted upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Public path prefix the upload directory is served under.
pub const UPLOADS_PATH: &str = "/uploads";

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageKind {
    /// Parse a declared MIME type.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Detect the format from the file's leading bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP") {
            Some(Self::Webp)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }
}

/// Check an upload's declared type, contents and size.
///
/// # Errors
///
/// `BadRequest` for empty, oversized, unsupported or mislabelled files.
pub fn validate_image(content_type: Option<&str>, bytes: &[u8]) -> Result<ImageKind, AppError> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("File is empty".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest(format!(
            "File exceeds the {} MiB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }

    let declared = content_type
        .and_then(ImageKind::from_content_type)
        .ok_or_else(|| {
            AppError::BadRequest("Only JPEG, PNG, WebP and GIF images are accepted".to_string())
        })?;
    if ImageKind::sniff(bytes) != Some(declared) {
        return Err(AppError::BadRequest(
            "File contents do not match its content type".to_string(),
        ));
    }
    Ok(declared)
}

/// Write an image under a fresh UUID name and return its public URL path.
///
/// # Errors
///
/// `Internal` if the directory or file cannot be written.
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub async fn store_image(dir: &Path, kind: ImageKind, bytes: &[u8]) -> Result<String, AppError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(format!("create upload dir: {e}")))?;

    let file_name = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());
    tokio::fs::write(dir.join(&file_name), bytes)
        .await
        .map_err(|e| AppError::Internal(format!("write upload: {e}")))?;

    info!(file = %file_name, "Image stored");
    Ok(format!("{UPLOADS_PATH}/{file_name}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const WEBP: &[u8] = b"RIFF\x24\0\0\0WEBPVP8 ";

    #[test]
    fn test_content_type_parsing() {
        assert_eq!(ImageKind::from_content_type("image/png"), Some(ImageKind::Png));
        assert_eq!(
            ImageKind::from_content_type("IMAGE/JPEG; charset=binary"),
            Some(ImageKind::Jpeg)
        );
        assert_eq!(ImageKind::from_content_type("image/svg+xml"), None);
        assert_eq!(ImageKind::from_content_type("text/html"), None);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(JPEG), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(WEBP), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"GIF89a\x01\0"), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"<svg></svg>"), None);
        assert_eq!(ImageKind::sniff(b"RIFF"), None);
    }

    #[test]
    fn test_validate_image() {
        assert_eq!(validate_image(Some("image/png"), PNG).unwrap(), ImageKind::Png);
        assert!(validate_image(Some("image/png"), &[]).is_err());
        assert!(validate_image(None, PNG).is_err());
        assert!(validate_image(Some("image/jpeg"), PNG).is_err());

        let oversized = [PNG, &vec![0u8; MAX_IMAGE_BYTES]].concat();
        assert!(validate_image(Some("image/png"), &oversized).is_err());
    }

    #[tokio::test]
    async fn test_store_image_writes_file() {
        let dir = std::env::temp_dir().join(format!("mercado-upload-{}", uuid::Uuid::new_v4()));
        let url = store_image(&dir, ImageKind::Png, PNG).await.unwrap();

        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".png"));
        let name = url.trim_start_matches("/uploads/");
        assert_eq!(std::fs::read(dir.join(name)).unwrap(), PNG);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
