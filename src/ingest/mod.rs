//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Still images (feature: ingest-image)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//! - Synthetic `stub://` source (always available, used by tests and the demo)
//!
//! Every source follows the same lifecycle: `open`, then `next_frame` until it
//! returns `Ok(None)` (end of stream) or an error, then `release`. Sources are
//! constructed closed; `build_source` never touches the device or file.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod image;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::frame::Frame;

pub use file::VideoFileSource;
pub use self::image::ImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// A producer of frames on demand.
pub trait FrameSource {
    /// Human-readable location (path, device or stub URL).
    fn describe(&self) -> String;

    /// Acquire the underlying handle. Must be called before `next_frame`.
    fn open(&mut self) -> Result<()>;

    /// Read the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying handle. Safe to call more than once.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// What the caller asked to process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Image(PathBuf),
    Video(PathBuf),
    Camera(String),
}

impl SourceSpec {
    pub fn location(&self) -> String {
        match self {
            SourceSpec::Image(path) | SourceSpec::Video(path) => path.display().to_string(),
            SourceSpec::Camera(device) => device.clone(),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            SourceSpec::Image(_) => "image",
            SourceSpec::Video(_) => "video",
            SourceSpec::Camera(_) => "camera",
        }
    }
}

/// Build (but do not open) the source for `spec`.
///
/// Any location starting with `stub://` yields a `SyntheticSource`. Other URL
/// schemes are rejected: only local files and devices are supported.
pub fn build_source(spec: &SourceSpec) -> Result<Box<dyn FrameSource>> {
    let location = spec.location();
    if location.trim().is_empty() {
        return Err(anyhow!("{} source location is empty", spec.mode()));
    }
    if location.starts_with("stub://") {
        let mut config = SyntheticConfig::from_location(&location)?;
        if matches!(spec, SourceSpec::Image(_)) {
            config.max_frames = Some(1);
        }
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if location.contains("://") {
        return Err(anyhow!(
            "only local paths and devices are supported (got '{}')",
            location
        ));
    }

    match spec {
        SourceSpec::Image(path) => Ok(Box::new(ImageSource::new(path.clone())?)),
        SourceSpec::Video(path) => Ok(Box::new(VideoFileSource::new(path.clone())?)),
        SourceSpec::Camera(device) => build_camera(&camera_device_path(device)),
    }
}

/// Expand a bare camera index (`0`) to its device node (`/dev/video0`).
pub fn camera_device_path(device: &str) -> String {
    let device = device.trim();
    if !device.is_empty() && device.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{}", device)
    } else {
        device.to_string()
    }
}

#[cfg(feature = "ingest-v4l2")]
fn build_camera(device: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(V4l2Config {
        device: device.to_string(),
        ..V4l2Config::default()
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn build_camera(device: &str) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera {} requires the ingest-v4l2 feature",
        device
    ))
}
