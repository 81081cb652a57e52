//! File checks applied before anything is written to storage.

use gacha_shared::formats::{extension_of, sniff, ImageFormat};

use crate::config::ServerConfig;
use crate::error::AdmissionError;

/// Extension allow-list and size ceiling for uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed_extensions: Vec<String>,
    max_file_size: u64,
}

impl UploadPolicy {
    pub fn new<I, S>(allowed_extensions: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            allowed_extensions,
            max_file_size,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.allowed_extensions, config.max_file_size)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn check_declared_size(&self, declared: Option<u64>) -> Result<(), AdmissionError> {
        match declared {
            Some(size) if size > self.max_file_size => Err(AdmissionError::PayloadTooLarge {
                max: self.max_file_size,
            }),
            _ => Ok(()),
        }
    }

    /// Returns the lowercase extension and its format when the declared
    /// name is on the allow-list.
    pub fn check_extension(&self, file_name: &str) -> Result<(String, ImageFormat), AdmissionError> {
        let ext = extension_of(file_name).ok_or_else(|| {
            AdmissionError::InvalidType("file has no extension".to_string())
        })?;

        let format = ImageFormat::from_extension(&ext)
            .filter(|_| self.allowed_extensions.iter().any(|allowed| *allowed == ext))
            .ok_or_else(|| AdmissionError::InvalidType(format!(".{ext} is not an accepted image type")))?;

        Ok((ext, format))
    }

    /// Check the leading bytes of the file.
    ///
    /// Any allowed signature is accepted. A declared format without a
    /// detectable signature (JPEG XL) skips the check.
    pub fn check_content(&self, declared: ImageFormat, head: &[u8]) -> Result<(), AdmissionError> {
        if head.is_empty() {
            return Err(AdmissionError::InvalidType("file is empty".to_string()));
        }

        if !declared.has_signature() {
            tracing::debug!(format = %declared, "Content check skipped for format without signature");
            return Ok(());
        }

        match sniff(head) {
            Some(found) if self.allows_format(found) => Ok(()),
            Some(found) => Err(AdmissionError::InvalidType(format!(
                "{found} is not an accepted image type"
            ))),
            None => Err(AdmissionError::InvalidType(
                "file content is not a recognized image".to_string(),
            )),
        }
    }

    pub fn allows_format(&self, format: ImageFormat) -> bool {
        format
            .extensions()
            .iter()
            .any(|ext| self.allowed_extensions.iter().any(|allowed| allowed == ext))
    }
}
