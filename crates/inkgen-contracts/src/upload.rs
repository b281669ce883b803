use std::fmt;
use std::path::Path;

use image::ImageFormat;

pub const UNSUPPORTED_UPLOAD_MESSAGE: &str = "Please upload a JPG or PNG file.";
pub const UNREADABLE_UPLOAD_MESSAGE: &str = "Could not process the image. Please try another one.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(MediaType::Jpeg),
            ImageFormat::Png => Some(MediaType::Png),
            _ => None,
        }
    }

    fn format(&self) -> ImageFormat {
        match self {
            MediaType::Jpeg => ImageFormat::Jpeg,
            MediaType::Png => ImageFormat::Png,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// A validated photo held in memory for the current session.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
    pub preview: ImagePreview,
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("bytes", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("preview", &self.preview)
            .finish()
    }
}

impl UploadedImage {
    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let media_type = image::guess_format(&bytes)
            .ok()
            .and_then(MediaType::from_format)
            .ok_or(UploadError::Unsupported)?;
        let decoded = image::load_from_memory_with_format(&bytes, media_type.format())
            .map_err(|err| UploadError::Unreadable(err.to_string()))?;
        Ok(Self {
            preview: ImagePreview {
                file_name: file_name.to_string(),
                width: decoded.width(),
                height: decoded.height(),
            },
            bytes,
            media_type,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = std::fs::read(path)
            .map_err(|err| UploadError::Unreadable(format!("{}: {err}", path.display())))?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string();
        Self::from_bytes(&file_name, bytes)
    }
}

/// Selection failures reported inline, independent of any generate action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    Unsupported,
    Unreadable(String),
}

impl UploadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::Unsupported => UNSUPPORTED_UPLOAD_MESSAGE,
            UploadError::Unreadable(_) => UNREADABLE_UPLOAD_MESSAGE,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

impl std::error::Error for UploadError {}

/// Holds at most one upload. A new valid selection replaces the old one; a
/// rejected selection leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct UploadSlot {
    current: Option<UploadedImage>,
}

impl UploadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_path(&mut self, path: &Path) -> Result<&UploadedImage, UploadError> {
        let image = UploadedImage::from_path(path)?;
        Ok(self.current.insert(image))
    }

    pub fn select_bytes(
        &mut self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<&UploadedImage, UploadError> {
        let image = UploadedImage::from_bytes(file_name, bytes)?;
        Ok(self.current.insert(image))
    }

    pub fn current(&self) -> Option<&UploadedImage> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
