use super::error::ImageError;
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequirements {
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for ImageRequirements {
    fn default() -> Self {
        Self {
            min_width: 16,
            min_height: 16,
        }
    }
}

/// Checks that `bytes` is a non-empty image whose header decodes to at least the required size.
/// Returns the image dimensions.
pub fn validate_image_bytes(
    bytes: &[u8],
    requirements: &ImageRequirements,
) -> Result<(u32, u32), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    match infer::get(bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => {}
        Some(kind) => return Err(ImageError::NotAnImage(kind.mime_type().to_string())),
        None => return Err(ImageError::NotAnImage("unknown".to_string())),
    }

    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| ImageError::Undecodable(e.to_string()))?;

    if width < requirements.min_width || height < requirements.min_height {
        return Err(ImageError::TooSmall { width, height });
    }
    Ok((width, height))
}

/// Validates a file already on disk.
pub async fn validate_image_file(
    path: &Path,
    requirements: &ImageRequirements,
) -> Result<(u32, u32), ImageError> {
    let bytes = tokio::fs::read(path).await?;
    validate_image_bytes(&bytes, requirements)
}


#[cfg(test)]
mod tests {
    use super::test_images::png;
    use super::*;

    #[test]
    fn test_valid_png() {
        let bytes = png(32, 20);
        assert_eq!(
            validate_image_bytes(&bytes, &ImageRequirements::default()).unwrap(),
            (32, 20)
        );
    }

    #[test]
    fn test_empty_bytes() {
        assert!(matches!(
            validate_image_bytes(&[], &ImageRequirements::default()),
            Err(ImageError::Empty)
        ));
    }

    #[test]
    fn test_non_image_bytes() {
        let html = b"<!DOCTYPE html><html><body>Too many requests</body></html>";
        assert!(matches!(
            validate_image_bytes(html, &ImageRequirements::default()),
            Err(ImageError::NotAnImage(_))
        ));
    }

    #[test]
    fn test_truncated_image() {
        let bytes = png(32, 32);
        assert!(matches!(
            validate_image_bytes(&bytes[..12], &ImageRequirements::default()),
            Err(ImageError::Undecodable(_))
        ));
    }

    #[test]
    fn test_too_small() {
        let bytes = png(8, 64);
        assert!(matches!(
            validate_image_bytes(&bytes, &ImageRequirements::default()),
            Err(ImageError::TooSmall {
                width: 8,
                height: 64
            })
        ));
    }

    #[tokio::test]
    async fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, png(16, 16)).unwrap();

        assert!(validate_image_file(&path, &ImageRequirements::default())
            .await
            .is_ok());
        assert!(matches!(
            validate_image_file(&dir.path().join("missing.png"), &ImageRequirements::default())
                .await,
            Err(ImageError::Storage(_))
        ));
    }
}
