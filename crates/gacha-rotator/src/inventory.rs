use std::collections::BTreeSet;
use std::path::Path;

use gacha_shared::ImageFormat;

use crate::error::RotatorError;

/// Names of the image files directly inside `dir`.
///
/// Subdirectories and files with other extensions (the history database,
/// the log) are skipped. A directory that does not exist yet is empty.
pub fn scan(dir: &Path) -> Result<BTreeSet<String>, RotatorError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };

    let mut images = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if ImageFormat::from_path(&name).is_some() {
            images.insert(name);
        }
    }
    Ok(images)
}
