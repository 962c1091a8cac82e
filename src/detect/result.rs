use crate::aggregate::{DetectionEvent, TrackId};
use crate::frame::BoundingBox;

/// One detected object in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Index into the backend's label table.
    pub class_id: usize,
    pub class_label: String,
    pub confidence: f32,
    /// Pixel coordinates in the source frame.
    pub bbox: BoundingBox,
    /// Present only when the detection went through a tracker.
    pub track_id: Option<TrackId>,
}

impl Detection {
    pub fn new(
        class_id: usize,
        class_label: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            class_id,
            class_label: class_label.into(),
            confidence,
            bbox,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: impl Into<TrackId>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }
}

/// Output of a tracked prediction for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackedFrame {
    pub detections: Vec<Detection>,
}

impl TrackedFrame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Tracked events for the aggregator.
    ///
    /// Returns `None` when any detection lacks a track id, i.e. the tracker had no
    /// identity to offer for this frame.
    pub fn events(&self) -> Option<Vec<DetectionEvent>> {
        self.detections
            .iter()
            .map(|det| {
                det.track_id.map(|id| DetectionEvent {
                    track_id: id,
                    class_label: det.class_label.clone(),
                })
            })
            .collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.detections.iter().map(|det| det.class_label.as_str())
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str) -> Detection {
        Detection::new(0, label, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn events_require_every_track_id() {
        let tracked = TrackedFrame::new(vec![det("Car").with_track_id(1), det("Bus")]);
        assert!(tracked.events().is_none());

        let tracked = TrackedFrame::new(vec![
            det("Car").with_track_id(1),
            det("Bus").with_track_id(2),
        ]);
        assert_eq!(
            tracked.events().unwrap(),
            vec![DetectionEvent::new(1, "Car"), DetectionEvent::new(2, "Bus")]
        );
    }

    #[test]
    fn empty_frame_yields_empty_events() {
        let tracked = TrackedFrame::default();
        assert_eq!(tracked.events(), Some(vec![]));
        assert!(tracked.is_empty());
    }
}
