//! Stream sessions: the frame loop that owns a `FrameAggregator`.
//!
//! A session reads frames from a `FrameSource`, hands every `frame_skip`-th
//! frame to an `ObjectTracker` and ingests the tracked events. The loop is
//! single-threaded and stops cooperatively when the `CancelFlag` is set, the
//! source runs dry, or a read or detection fails. The source is released on
//! every exit path.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregate::{tally, ClassCounts, FrameAggregator, ReportRow};
use crate::detect::{DetectorBackend, ObjectTracker};
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// Default frame skip for video files.
pub const DEFAULT_FRAME_SKIP: u32 = 3;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Shared stop request. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-session tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionSettings {
    pub confidence: f32,
    /// Process only frames whose 1-based read count is a multiple of this.
    pub frame_skip: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            frame_skip: DEFAULT_FRAME_SKIP,
        }
    }
}

impl SessionSettings {
    pub fn video(confidence: f32, frame_skip: u32) -> Self {
        Self {
            confidence,
            frame_skip,
        }
    }

    /// Live cameras process every frame.
    pub fn camera(confidence: f32) -> Self {
        Self {
            confidence,
            frame_skip: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            bail!("confidence must be within [0, 1] (got {})", self.confidence);
        }
        if self.frame_skip == 0 {
            bail!("frame_skip must be >= 1");
        }
        Ok(())
    }
}

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    Exhausted,
    Cancelled,
    ReadFailed(String),
    DetectorFailed(String),
}

impl StreamEnd {
    pub fn label(&self) -> &'static str {
        match self {
            StreamEnd::Exhausted => "exhausted",
            StreamEnd::Cancelled => "cancelled",
            StreamEnd::ReadFailed(_) => "read_failed",
            StreamEnd::DetectorFailed(_) => "detector_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StreamEnd::ReadFailed(_) | StreamEnd::DetectorFailed(_))
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Exhausted => f.write_str("end of stream"),
            StreamEnd::Cancelled => f.write_str("stopped by user"),
            StreamEnd::ReadFailed(msg) => write!(f, "frame read failed: {}", msg),
            StreamEnd::DetectorFailed(msg) => write!(f, "detection failed: {}", msg),
        }
    }
}

impl Serialize for StreamEnd {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Progress handed to the observer after every processed frame.
pub struct SessionProgress<'a> {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub aggregator: &'a FrameAggregator,
}

impl SessionProgress<'_> {
    pub fn counts(&self) -> ClassCounts {
        self.aggregator.snapshot()
    }
}

/// Result of a finished session.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub end: StreamEnd,
    pub frames_read: u64,
    pub frames_processed: u64,
    pub counts: ClassCounts,
}

impl SessionOutcome {
    pub fn report_rows(&self) -> Vec<ReportRow> {
        self.counts.clone().into_rows()
    }
}

/// Opens a source on construction and releases it on drop.
struct SourceGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> SourceGuard<'a, S> {
    fn open(source: &'a mut S) -> Result<Self> {
        source.open()?;
        Ok(Self { source })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.source.next_frame()
    }
}

impl<S: FrameSource + ?Sized> Drop for SourceGuard<'_, S> {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// One video or camera run.
pub struct StreamSession {
    settings: SessionSettings,
    aggregator: FrameAggregator,
    frames_read: u64,
    frames_processed: u64,
}

impl StreamSession {
    pub fn new(settings: SessionSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            aggregator: FrameAggregator::new(),
            frames_read: 0,
            frames_processed: 0,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn aggregator(&self) -> &FrameAggregator {
        &self.aggregator
    }

    /// Counts so far.
    pub fn counts(&self) -> ClassCounts {
        self.aggregator.snapshot()
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run the frame loop until the stream ends, fails or is cancelled.
    ///
    /// Returns `Err` only when the source cannot be opened; in that case no
    /// frame is read and the tracker is never called. Failures after the
    /// source is open end the loop and are reported in `SessionOutcome::end`,
    /// with the counts gathered up to that point.
    pub fn run<S, T, F>(
        &mut self,
        source: &mut S,
        tracker: &mut T,
        cancel: &CancelFlag,
        mut observer: F,
    ) -> Result<SessionOutcome>
    where
        S: FrameSource + ?Sized,
        T: ObjectTracker + ?Sized,
        F: FnMut(&SessionProgress<'_>),
    {
        self.aggregator.reset();
        self.frames_read = 0;
        self.frames_processed = 0;
        tracker.reset();

        let location = source.describe();
        let mut guard = SourceGuard::open(source)
            .map_err(|err| err.context(format!("failed to open {}", location)))?;
        log::info!(
            "session started on {} (tracker={}, confidence={}, frame_skip={})",
            location,
            tracker.name(),
            self.settings.confidence,
            self.settings.frame_skip
        );

        let skip = u64::from(self.settings.frame_skip);
        let end = loop {
            if cancel.is_cancelled() {
                break StreamEnd::Cancelled;
            }

            let frame = match guard.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StreamEnd::Exhausted,
                Err(err) => {
                    log::warn!("failed to read frame from {}: {:#}", location, err);
                    break StreamEnd::ReadFailed(format!("{:#}", err));
                }
            };
            self.frames_read += 1;
            if self.frames_read % skip != 0 {
                continue;
            }

            let tracked = match tracker.track(&frame, self.settings.confidence) {
                Ok(tracked) => tracked,
                Err(err) => {
                    log::warn!("detection failed on frame {}: {:#}", frame.index, err);
                    break StreamEnd::DetectorFailed(format!("{:#}", err));
                }
            };
            let events = tracked.events().unwrap_or_default();
            self.aggregator.ingest(&events);
            self.frames_processed += 1;
            log::debug!(
                "frame {}: {} detections, {} tracked",
                frame.index,
                tracked.len(),
                events.len()
            );

            observer(&SessionProgress {
                frames_read: self.frames_read,
                frames_processed: self.frames_processed,
                aggregator: &self.aggregator,
            });
        };
        drop(guard);

        let counts = self.aggregator.snapshot();
        log::info!(
            "session on {} ended ({}): {} frames read, {} processed, {} vehicles",
            location,
            end,
            self.frames_read,
            self.frames_processed,
            counts.total()
        );
        Ok(SessionOutcome {
            end,
            frames_read: self.frames_read,
            frames_processed: self.frames_processed,
            counts,
        })
    }
}

/// Counts for a single still image.
#[derive(Clone, Debug)]
pub struct StillImageCount {
    pub frame_index: u64,
    pub detections: usize,
    pub counts: ClassCounts,
}

/// Run the untracked detector once and count every box by class.
pub fn count_still_frame<B>(frame: &Frame, backend: &mut B, confidence: f32) -> Result<StillImageCount>
where
    B: DetectorBackend + ?Sized,
{
    let detections = backend.predict(frame, confidence)?;
    let counts = tally(detections.iter().map(|det| det.class_label.as_str()));
    log::debug!(
        "frame {}: {} detections across {} classes",
        frame.index,
        detections.len(),
        counts.len()
    );
    Ok(StillImageCount {
        frame_index: frame.index,
        detections: detections.len(),
        counts,
    })
}

/// Open `source`, count its first frame and release it.
pub fn count_still_image<S, B>(source: &mut S, backend: &mut B, confidence: f32) -> Result<StillImageCount>
where
    S: FrameSource + ?Sized,
    B: DetectorBackend + ?Sized,
{
    let location = source.describe();
    let mut guard = SourceGuard::open(source)
        .map_err(|err| err.context(format!("failed to open {}", location)))?;
    let frame = guard
        .next_frame()?
        .ok_or_else(|| anyhow!("{} contained no image", location))?;
    drop(guard);
    count_still_frame(&frame, backend, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let handler_side = flag.clone();
        assert!(!flag.is_cancelled());
        handler_side.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn settings_are_validated() {
        assert!(SessionSettings::default().validate().is_ok());
        assert_eq!(SessionSettings::camera(0.5).frame_skip, 1);
        assert!(SessionSettings::video(0.25, 0).validate().is_err());
        assert!(SessionSettings::video(1.5, 3).validate().is_err());
        assert!(SessionSettings::video(f32::NAN, 3).validate().is_err());
        assert!(StreamSession::new(SessionSettings::video(-0.1, 1)).is_err());
    }

    #[test]
    fn stream_end_labels() {
        assert_eq!(StreamEnd::Exhausted.label(), "exhausted");
        assert!(StreamEnd::ReadFailed("eof".into()).is_failure());
        assert!(!StreamEnd::Cancelled.is_failure());
        assert_eq!(
            StreamEnd::DetectorFailed("oom".into()).to_string(),
            "detection failed: oom"
        );
    }
}
