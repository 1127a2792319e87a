//! Capture sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use card_vision::decode_image;
use image::RgbImage;
use tracing::{debug, info};

use crate::error::ScanError;

/// A source of raw frames (camera, replayed files, network stream).
///
/// The scanner owns the source for the lifetime of a scan: it calls
/// `open` once, `next_frame` once per tick, and `release` exactly once on
/// every exit path.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Human-readable source name for logs.
    fn name(&self) -> String;

    /// Acquire the underlying resource.
    ///
    /// Failures are reported as [`ScanError::ResourceAcquisition`] and the
    /// scan does not start.
    async fn open(&mut self) -> Result<(), ScanError>;

    /// The current frame at its native resolution, or `None` once the
    /// source has nothing more to give.
    ///
    /// A frame may be 0x0 while a device is still warming up.
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, ScanError>;

    /// Release the underlying resource.
    async fn release(&mut self);
}

/// Replays image files from a directory as if they were camera frames.
pub struct DirectoryFrameSource {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    position: usize,
    repeat: bool,
    open: bool,
}

impl DirectoryFrameSource {
    /// Replay `dir` once (or forever if `repeat`), in file name order.
    pub fn new(dir: impl Into<PathBuf>, repeat: bool) -> Self {
        Self {
            dir: dir.into(),
            frames: Vec::new(),
            position: 0,
            repeat,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if path.is_file() && is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    fn name(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    async fn open(&mut self) -> Result<(), ScanError> {
        let frames = list_frames(&self.dir).map_err(|e| {
            ScanError::ResourceAcquisition(format!("{}: {e}", self.dir.display()))
        })?;
        if frames.is_empty() {
            return Err(ScanError::ResourceAcquisition(format!(
                "{} contains no frames",
                self.dir.display()
            )));
        }

        info!(dir = %self.dir.display(), frames = frames.len(), "Opened frame directory");
        self.frames = frames;
        self.position = 0;
        self.open = true;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<RgbImage>, ScanError> {
        if !self.open {
            return Err(ScanError::Frame("source is not open".to_string()));
        }
        if self.position >= self.frames.len() {
            if !self.repeat {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = self.frames[self.position].clone();
        self.position += 1;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ScanError::Frame(format!("{}: {e}", path.display())))?;
        let frame = decode_image(&bytes)
            .map_err(|e| ScanError::Frame(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), width = frame.width(), height = frame.height(), "Frame read");
        Ok(Some(frame))
    }

    async fn release(&mut self) {
        if self.open {
            debug!(dir = %self.dir.display(), "Released frame directory");
        }
        self.open = false;
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            RgbImage::from_pixel(4, 4, Rgb([i as u8 * 50, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_then_ends() {
        let temp = TempDir::new().unwrap();
        write_frames(temp.path(), &["b.png", "a.png"]);

        let mut source = DirectoryFrameSource::new(temp.path(), false);
        source.open().await.unwrap();
        assert_eq!(source.frame_count(), 2);

        // a.png was written second (red = 50)
        let first = source.next_frame().await.unwrap().unwrap();
        assert_eq!(first.get_pixel(0, 0), &Rgb([50, 0, 0]));
        let second = source.next_frame().await.unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert!(source.next_frame().await.unwrap().is_none());

        source.release().await;
        assert!(!source.is_open());
    }

    #[tokio::test]
    async fn test_repeat_wraps_around() {
        let temp = TempDir::new().unwrap();
        write_frames(temp.path(), &["only.png"]);

        let mut source = DirectoryFrameSource::new(temp.path(), true);
        source.open().await.unwrap();
        for _ in 0..5 {
            assert!(source.next_frame().await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_missing_dir_is_resource_failure() {
        let mut source = DirectoryFrameSource::new("/nonexistent/frames", false);
        assert!(matches!(
            source.open().await,
            Err(ScanError::ResourceAcquisition(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_dir_is_resource_failure() {
        let temp = TempDir::new().unwrap();
        let mut source = DirectoryFrameSource::new(temp.path(), false);
        assert!(matches!(
            source.open().await,
            Err(ScanError::ResourceAcquisition(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_frame_is_frame_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bad.png"), b"garbage").unwrap();

        let mut source = DirectoryFrameSource::new(temp.path(), false);
        source.open().await.unwrap();
        assert!(matches!(
            source.next_frame().await,
            Err(ScanError::Frame(_))
        ));
    }

    #[tokio::test]
    async fn test_read_before_open() {
        let temp = TempDir::new().unwrap();
        let mut source = DirectoryFrameSource::new(temp.path(), false);
        assert!(matches!(source.next_frame().await, Err(ScanError::Frame(_))));
    }
}
