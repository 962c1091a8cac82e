//! Local video file frame source.
//!
//! `VideoFileSource` decodes a local video file frame by frame. Decoding is
//! done by FFmpeg (feature `ingest-file-ffmpeg`); the file is opened lazily in
//! `open` and dropped in `release`.
//!
//! The file source MUST NOT fetch remote URLs or write decoded frames to disk.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegDecoder;
use super::FrameSource;
use crate::frame::Frame;

pub struct VideoFileSource {
    path: PathBuf,
    #[cfg(feature = "ingest-file-ffmpeg")]
    decoder: Option<FfmpegDecoder>,
    frame_count: u64,
}

impl VideoFileSource {
    pub fn new(path: PathBuf) -> Result<Self> {
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                path,
                decoder: None,
                frame_count: 0,
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "video {} requires the ingest-file-ffmpeg feature",
                path.display()
            ))
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn open(&mut self) -> Result<()> {
        let decoder = FfmpegDecoder::open(&self.path)?;
        log::info!(
            "VideoFileSource: opened {} ({}x{}, ffmpeg)",
            self.path.display(),
            decoder.width(),
            decoder.height()
        );
        self.decoder = Some(decoder);
        self.frame_count = 0;
        Ok(())
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn open(&mut self) -> Result<()> {
        Err(anyhow!(
            "video {} requires the ingest-file-ffmpeg feature",
            self.path.display()
        ))
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| anyhow!("{} is not open", self.path.display()))?;
        let Some((pixels, width, height)) = decoder.next_rgb()? else {
            return Ok(None);
        };
        self.frame_count += 1;
        Ok(Some(Frame::new(pixels, width, height, self.frame_count)))
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("{} is not open", self.path.display()))
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn release(&mut self) {
        if self.decoder.take().is_some() {
            log::info!(
                "VideoFileSource: released {} after {} frames",
                self.path.display(),
                self.frame_count
            );
        }
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn release(&mut self) {}
}

#[cfg(all(test, not(feature = "ingest-file-ffmpeg")))]
mod tests {
    use super::*;

    #[test]
    fn video_without_feature_fails_at_build_time() {
        let err = VideoFileSource::new(PathBuf::from("traffic.mp4"))
            .err()
            .expect("feature disabled");
        assert!(err.to_string().contains("ingest-file-ffmpeg"));
    }
}
