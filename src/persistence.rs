//! Screenshot persistence: writes the current capture as a PNG.
//!
//! Captures are stored in the platform pictures directory:
//!   macOS:   ~/Pictures/overlay-capture/
//!   Linux:   ~/Pictures/overlay-capture/ (XDG_PICTURES_DIR)
//!   Windows: %USERPROFILE%\Pictures\overlay-capture\
//! Every save overwrites the same file.

use crate::capture::{FrameError, PixelImage};
use std::path::{Path, PathBuf};

pub const CAPTURE_FILE_NAME: &str = "capture_result.png";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Encode(#[from] FrameError),
}

/// Where captures end up. Implementations do blocking I/O; call them off
/// the control thread.
pub trait ScreenshotStore: Send + Sync {
    fn save(&self, image: &PixelImage) -> Result<PathBuf, PersistenceError>;
}

/// Base directory for saved captures.
pub fn captures_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("overlay-capture")
}

pub struct PngFileStore {
    dir: PathBuf,
}

impl PngFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn in_pictures_dir() -> Self {
        Self::new(captures_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ScreenshotStore for PngFileStore {
    fn save(&self, image: &PixelImage) -> Result<PathBuf, PersistenceError> {
        let start = std::time::Instant::now();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersistenceError::Io { path, source }
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let png = image.to_png_bytes()?;
        let path = self.dir.join(CAPTURE_FILE_NAME);
        std::fs::write(&path, &png).map_err(io_err(&path))?;

        log::info!(
            "[CAPTURE] Saved {} ({} bytes) in {}ms",
            path.display(),
            png.len(),
            start.elapsed().as_millis()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn save_writes_a_decodable_png_and_overwrites() {
        let dir = std::env::temp_dir().join(format!("overlay-capture-save-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = PngFileStore::new(&dir);

        let first = PixelImage::new(RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255])));
        let path = store.save(&first).unwrap();
        assert_eq!(path, dir.join(CAPTURE_FILE_NAME));

        let second = PixelImage::new(RgbaImage::from_pixel(5, 4, Rgba([9, 9, 9, 255])));
        store.save(&second).unwrap();

        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded.dimensions(), (5, 4));
        assert_eq!(reloaded.get_pixel(0, 0).0, [9, 9, 9, 255]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_target_is_an_io_error() {
        let file = std::env::temp_dir().join(format!("overlay-capture-block-{}", std::process::id()));
        std::fs::write(&file, b"not a dir").unwrap();
        let store = PngFileStore::new(file.join("nested"));
        let image = PixelImage::new(RgbaImage::new(1, 1));
        assert!(matches!(store.save(&image), Err(PersistenceError::Io { .. })));
        let _ = std::fs::remove_file(&file);
    }
}
