use anyhow::Result;

use crate::detect::result::{Detection, TrackedFrame};
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one frame into class-labelled boxes. It has no notion of
/// identity across frames; see `ObjectTracker` for that.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, keeping only boxes scoring at least `confidence`.
    ///
    /// Implementations must treat the pixel slice as read-only.
    fn predict(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn predict(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        (**self).predict(frame, confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

/// Detection plus identity: every call sees the next frame of the same stream.
pub trait ObjectTracker {
    fn name(&self) -> &'static str;

    /// Detect and associate boxes with the tracks of earlier frames.
    fn track(&mut self, frame: &Frame, confidence: f32) -> Result<TrackedFrame>;

    /// Drop all track state. Called when a new stream session starts.
    fn reset(&mut self);
}
