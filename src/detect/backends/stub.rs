use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectorBackend, ObjectTracker};
use crate::detect::result::{Detection, TrackedFrame};
use crate::frame::Frame;

/// Stub backend for testing. Replays a fixed script of per-frame detections.
///
/// Call `n` (0-based) returns `script[n]`, filtered by the confidence threshold;
/// calls past the end of the script return nothing. As an `ObjectTracker` the
/// scripted detections are returned as-is, so scripted track ids reach the caller
/// untouched.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    seen_frames: Vec<u64>,
    fail_on_call: Option<usize>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            cursor: 0,
            seen_frames: Vec::new(),
            fail_on_call: None,
        }
    }

    /// Make call number `call` (0-based) fail with an inference error.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Indices of the frames handed to this backend, in call order.
    pub fn seen_frames(&self) -> &[u64] {
        &self.seen_frames
    }

    fn next(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let call = self.cursor;
        self.cursor += 1;
        self.seen_frames.push(frame.index);

        if self.fail_on_call == Some(call) {
            return Err(anyhow!("scripted inference failure on frame {}", frame.index));
        }

        Ok(self
            .script
            .get(call)
            .map(|dets| {
                dets.iter()
                    .filter(|det| det.confidence >= confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn predict(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        self.next(frame, confidence)
    }
}

impl ObjectTracker for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn track(&mut self, frame: &Frame, confidence: f32) -> Result<TrackedFrame> {
        Ok(TrackedFrame::new(self.next(frame, confidence)?))
    }

    /// Rewind to the start of the script.
    fn reset(&mut self) {
        self.cursor = 0;
        self.seen_frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(0, label, confidence, BoundingBox::new(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn scripted_backend_replays_and_filters() -> Result<()> {
        let mut backend =
            ScriptedBackend::new(vec![vec![det("Car", 0.9), det("Bus", 0.1)], vec![]]);
        let frame = Frame::new(vec![0; 3], 1, 1, 7);

        let first = backend.predict(&frame, 0.25)?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].class_label, "Car");
        assert!(backend.predict(&frame, 0.25)?.is_empty());
        assert!(backend.predict(&frame, 0.25)?.is_empty());
        assert_eq!(backend.seen_frames(), &[7, 7, 7]);
        Ok(())
    }

    #[test]
    fn scripted_backend_fails_on_request() {
        let mut backend = ScriptedBackend::new(vec![]).fail_on_call(1);
        let frame = Frame::new(vec![0; 3], 1, 1, 1);
        assert!(backend.predict(&frame, 0.0).is_ok());
        assert!(backend.predict(&frame, 0.0).is_err());
    }
}
