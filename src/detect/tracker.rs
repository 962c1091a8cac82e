//! Greedy IoU tracker.
//!
//! Associates each frame's boxes with the boxes of the previous processed frame by
//! overlap alone. Matching is class-agnostic: a box keeps the label its detector
//! gave it this frame, even when the track it extends was labelled differently.

use crate::aggregate::TrackId;
use crate::detect::result::Detection;
use crate::frame::BoundingBox;

#[derive(Clone, Debug)]
pub struct IouTrackerConfig {
    /// Minimum IoU to extend an existing track.
    pub iou_threshold: f32,
    /// Processed frames a track survives without a matching box.
    pub max_missing: u32,
}

impl Default for IouTrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_missing: 30,
        }
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: TrackId,
    bbox: BoundingBox,
    missing: u32,
}

pub struct IouTracker {
    config: IouTrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl IouTracker {
    pub fn new(config: IouTrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Assign a track id to every detection, in input order.
    pub fn update(&mut self, mut detections: Vec<Detection>) -> Vec<Detection> {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (track_idx, track) in self.tracks.iter().enumerate() {
            for (det_idx, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.config.iou_threshold {
                    pairs.push((iou, track_idx, det_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];
        for (_, track_idx, det_idx) in pairs {
            if track_matched[track_idx] || det_matched[det_idx] {
                continue;
            }
            track_matched[track_idx] = true;
            det_matched[det_idx] = true;

            let track = &mut self.tracks[track_idx];
            track.bbox = detections[det_idx].bbox;
            track.missing = 0;
            detections[det_idx].track_id = Some(track.id);
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.missing += 1;
            }
        }
        let max_missing = self.config.max_missing;
        self.tracks.retain(|track| track.missing <= max_missing);

        for (det, matched) in detections.iter_mut().zip(&det_matched) {
            if *matched {
                continue;
            }
            let id = TrackId(self.next_id);
            self.next_id += 1;
            self.tracks.push(Track {
                id,
                bbox: det.bbox,
                missing: 0,
            });
            det.track_id = Some(id);
        }

        detections
    }

    /// Forget all tracks and restart ids at 1.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    /// Tracks currently alive, including ones coasting through missed frames.
    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(IouTrackerConfig::default())
    }
}
