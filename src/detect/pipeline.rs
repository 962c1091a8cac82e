//! Detection + tracking pipeline.

use anyhow::Result;

use crate::detect::backend::{DetectorBackend, ObjectTracker};
use crate::detect::result::{Detection, TrackedFrame};
use crate::detect::tracker::{IouTracker, IouTrackerConfig};
use crate::frame::Frame;

/// Bundles any `DetectorBackend` with an `IouTracker`.
///
/// `predict` stays untracked; `track` runs the backend and then assigns ids.
pub struct TrackingDetector<B: DetectorBackend> {
    backend: B,
    tracker: IouTracker,
}

impl<B: DetectorBackend> TrackingDetector<B> {
    pub fn new(backend: B, config: IouTrackerConfig) -> Self {
        Self {
            backend,
            tracker: IouTracker::new(config),
        }
    }

    pub fn with_default_config(backend: B) -> Self {
        Self::new(backend, IouTrackerConfig::default())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tracker(&self) -> &IouTracker {
        &self.tracker
    }
}

impl<B: DetectorBackend> DetectorBackend for TrackingDetector<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn predict(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        self.backend.predict(frame, confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }
}

impl<B: DetectorBackend> ObjectTracker for TrackingDetector<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn track(&mut self, frame: &Frame, confidence: f32) -> Result<TrackedFrame> {
        let detections = self.backend.predict(frame, confidence)?;
        Ok(TrackedFrame::new(self.tracker.update(detections)))
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}
