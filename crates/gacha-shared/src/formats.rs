//! Image formats accepted for upload and rotation.
//!
//! Extensions are matched case-insensitively. Content is identified from
//! its leading bytes via `image::guess_format`; JPEG XL has no signature
//! in that table, so [`ImageFormat::has_signature`] is `false` for it and
//! callers exempt it from the content check.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Jxl,
    Webp,
}

impl ImageFormat {
    /// Every format the system knows about.
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Jxl,
        ImageFormat::Webp,
    ];

    /// Map a bare extension (`"PNG"`, `".jpg"`, `"jpeg"`) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "jxl" => Some(ImageFormat::Jxl),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Format implied by the extension of a file name or path.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Jxl => "image/jxl",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// All extensions that map to this format, lowercase.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ImageFormat::Png => &["png"],
            ImageFormat::Jpeg => &["jpg", "jpeg"],
            ImageFormat::Jxl => &["jxl"],
            ImageFormat::Webp => &["webp"],
        }
    }

    /// Whether [`sniff`] can recognise this format from its leading bytes.
    pub fn has_signature(self) -> bool {
        !matches!(self, ImageFormat::Jxl)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Lowercase extension of a user-supplied file name, without the dot.
///
/// Only the final path component is considered, so `"../x.PNG"` yields
/// `Some("png")` and `"noext"` yields `None`.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Identify an image from its leading bytes.
///
/// Returns `None` for content that is not one of the known formats with a
/// signature (including everything that is not an image at all).
pub fn sniff(head: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(head).ok()? {
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        image::ImageFormat::WebP => Some(ImageFormat::Webp),
        _ => None,
    }
}
