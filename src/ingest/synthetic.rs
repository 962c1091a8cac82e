//! Synthetic frame source for `stub://` locations.
//!
//! Produces patterned RGB frames without touching any device or file. Query
//! parameters shape the stream:
//!
//! - `frames=N`: end of stream after N frames (unbounded when absent)
//! - `width=W`, `height=H`: frame size (default 640x480)
//! - `fail_after=N`: the read after frame N fails
//! - `fail_open=1`: `open` fails

use anyhow::{anyhow, bail, Context, Result};

use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub location: String,
    pub width: u32,
    pub height: u32,
    pub max_frames: Option<u64>,
    pub fail_after: Option<u64>,
    pub fail_open: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            location: "stub://synthetic".to_string(),
            width: 640,
            height: 480,
            max_frames: None,
            fail_after: None,
            fail_open: false,
        }
    }
}

impl SyntheticConfig {
    /// Parse a `stub://name?key=value&...` location.
    pub fn from_location(location: &str) -> Result<Self> {
        let rest = location
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic sources need a stub:// location (got '{}')", location))?;
        let mut config = Self {
            location: location.to_string(),
            ..Self::default()
        };

        let Some((_, query)) = rest.split_once('?') else {
            return Ok(config);
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "frames" => config.max_frames = Some(parse_number(key, value)?),
                "width" => config.width = parse_dimension(key, value)?,
                "height" => config.height = parse_dimension(key, value)?,
                "fail_after" => config.fail_after = Some(parse_number(key, value)?),
                "fail_open" => config.fail_open = matches!(value, "" | "1" | "true"),
                other => bail!("unknown stub parameter '{}' in {}", other, location),
            }
        }
        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("stub parameter {}='{}' is not a number", key, value))
}

fn parse_dimension(key: &str, value: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("stub parameter {}='{}' is not a number", key, value))?;
    if parsed == 0 {
        bail!("stub parameter {} must be positive", key);
    }
    Ok(parsed)
}

/// Patterned frames with scripted end-of-stream and failure points.
pub struct SyntheticSource {
    config: SyntheticConfig,
    is_open: bool,
    frame_count: u64,
    scene_state: u8,
    releases: u32,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            is_open: false,
            frame_count: 0,
            scene_state: 0,
            releases: 0,
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    /// Number of `release` calls that closed an open source.
    pub fn release_count(&self) -> u32 {
        self.releases
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let offset = self.frame_count + self.scene_state as u64;
        (0..pixel_count)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.location.clone()
    }

    fn open(&mut self) -> Result<()> {
        if self.config.fail_open {
            bail!("cannot open {}: scripted open failure", self.config.location);
        }
        self.is_open = true;
        log::info!(
            "SyntheticSource: opened {} ({}x{})",
            self.config.location,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.is_open {
            bail!("{} is not open", self.config.location);
        }
        if let Some(limit) = self.config.fail_after {
            if self.frame_count >= limit {
                bail!(
                    "read failed on {} after {} frames",
                    self.config.location,
                    self.frame_count
                );
            }
        }
        if let Some(limit) = self.config.max_frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }

        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )))
    }

    fn release(&mut self) {
        if self.is_open {
            self.is_open = false;
            self.releases += 1;
            log::info!(
                "SyntheticSource: released {} after {} frames",
                self.config.location,
                self.frame_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() -> Result<()> {
        let config =
            SyntheticConfig::from_location("stub://lane?frames=12&width=64&height=48&fail_after=5")?;
        assert_eq!(config.max_frames, Some(12));
        assert_eq!((config.width, config.height), (64, 48));
        assert_eq!(config.fail_after, Some(5));
        assert!(!config.fail_open);

        let bare = SyntheticConfig::from_location("stub://lane")?;
        assert_eq!((bare.width, bare.height), (640, 480));
        assert_eq!(bare.max_frames, None);
        Ok(())
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SyntheticConfig::from_location("stub://x?frames=many").is_err());
        assert!(SyntheticConfig::from_location("stub://x?width=0").is_err());
        assert!(SyntheticConfig::from_location("stub://x?colour=red").is_err());
        assert!(SyntheticConfig::from_location("/tmp/x.mp4").is_err());
    }

    #[test]
    fn frames_are_numbered_from_one_and_sized() -> Result<()> {
        let mut source =
            SyntheticSource::new(SyntheticConfig::from_location("stub://x?frames=3&width=8&height=4")?);
        source.open()?;
        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.pixels().len(), frame.expected_len());
            assert_eq!((frame.width, frame.height), (8, 4));
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn read_fails_after_configured_frame() -> Result<()> {
        let mut source =
            SyntheticSource::new(SyntheticConfig::from_location("stub://x?fail_after=2&width=4&height=4")?);
        source.open()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn open_failure_and_release_bookkeeping() -> Result<()> {
        let mut failing =
            SyntheticSource::new(SyntheticConfig::from_location("stub://x?fail_open=1")?);
        assert!(failing.open().is_err());
        assert!(!failing.is_open());
        assert!(failing.next_frame().is_err());

        let mut source = SyntheticSource::new(SyntheticConfig::default());
        source.open()?;
        source.release();
        source.release();
        assert_eq!(source.release_count(), 1);
        assert!(!source.is_open());
        Ok(())
    }
}
