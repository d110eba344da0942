// Directory scanner: lists candidate image files for a batch run

use crate::core::errors::{ScanError, ScanResult};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Extensions accepted as batch candidates, matched case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "tiff"];

/// True when the path carries one of the accepted image extensions.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

/// List the image files directly inside `dir` (non-recursive).
///
/// Returned paths are resolved relative to `dir`, in whatever order the
/// directory listing yields. Non-files and entries without an accepted
/// extension are skipped.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn scan_directory(dir: &Path) -> ScanResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ScanError::InvalidPath(dir.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(dir).await.map_err(|source| {
        ScanError::NotAccessible {
            path: dir.to_path_buf(),
            source,
        }
    })?;

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| {
        ScanError::NotAccessible {
            path: dir.to_path_buf(),
            source,
        }
    })? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && is_image_path(&path) {
            images.push(path);
        }
    }

    debug!("found {} image(s)", images.len());
    Ok(images)
}
