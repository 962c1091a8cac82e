//! Still image frame source.
//!
//! Decodes one local image file (feature `ingest-image`) into a single RGB
//! frame. The decoded pixels are held in memory only until handed out.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use super::FrameSource;
use crate::frame::Frame;

pub struct ImageSource {
    path: PathBuf,
    pending: Option<Frame>,
    delivered: bool,
}

impl ImageSource {
    pub fn new(path: PathBuf) -> Result<Self> {
        if !cfg!(feature = "ingest-image") {
            return Err(anyhow!(
                "image {} requires the ingest-image feature",
                path.display()
            ));
        }
        Ok(Self {
            path,
            pending: None,
            delivered: false,
        })
    }
}

impl FrameSource for ImageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&mut self) -> Result<()> {
        let frame = decode(&self.path)?;
        log::info!(
            "ImageSource: decoded {} ({}x{})",
            self.path.display(),
            frame.width,
            frame.height
        );
        self.pending = Some(frame);
        self.delivered = false;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.delivered {
            return Ok(None);
        }
        let frame = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("{} is not open", self.path.display()))?;
        self.delivered = true;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.pending = None;
    }
}

#[cfg(feature = "ingest-image")]
fn decode(path: &std::path::Path) -> Result<Frame> {
    use anyhow::Context;

    let rgb = ::image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height, 1))
}

#[cfg(not(feature = "ingest-image"))]
fn decode(path: &std::path::Path) -> Result<Frame> {
    Err(anyhow!(
        "image {} requires the ingest-image feature",
        path.display()
    ))
}

#[cfg(all(test, feature = "ingest-image"))]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_into_one_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("road.png");
        ::image::RgbImage::from_pixel(6, 4, ::image::Rgb([10, 20, 30])).save(&path)?;

        let mut source = ImageSource::new(path)?;
        source.open()?;
        let frame = source.next_frame()?.ok_or_else(|| anyhow!("no frame"))?;
        assert_eq!((frame.width, frame.height, frame.index), (6, 4, 1));
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
        assert!(source.next_frame()?.is_none());
        source.release();
        Ok(())
    }

    #[test]
    fn missing_file_fails_on_open() -> Result<()> {
        let mut source = ImageSource::new(PathBuf::from("/nonexistent/road.png"))?;
        assert!(source.open().is_err());
        Ok(())
    }
}
