//! Per-class unique object counting across a frame stream.
//!
//! Two counting modes live here and they do not share state:
//!
//! - Tracked mode (`FrameAggregator`): every processed frame contributes a list of
//!   `DetectionEvent`s carrying tracker-assigned ids. A class counts the distinct ids
//!   seen under that class since the last `reset`, so an object that stays in view
//!   for many frames is counted once.
//! - Untracked mode (`tally`): a single frame without temporal identity. Every box
//!   counts, nothing is de-duplicated and nothing is remembered.
//!
//! Class labels are remembered in first-seen order so repeated exports of the same
//! session produce identical report rows.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Tracker-assigned identity of one physical object within one stream session.
///
/// Opaque to this crate: ids are only compared, never computed or validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackId(pub u64);

impl From<u64> for TrackId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One tracked observation within one processed frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionEvent {
    pub track_id: TrackId,
    pub class_label: String,
}

impl DetectionEvent {
    pub fn new(track_id: impl Into<TrackId>, class_label: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            class_label: class_label.into(),
        }
    }
}

/// One line of an exported report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub class_label: String,
    pub count: usize,
}

impl ReportRow {
    pub fn new(class_label: impl Into<String>, count: usize) -> Self {
        Self {
            class_label: class_label.into(),
            count,
        }
    }
}

// ----------------------------------------------------------------------------
// ClassCounts: ordered label -> count mapping
// ----------------------------------------------------------------------------

/// Counts per class label, in the order labels were first encountered.
///
/// Equality ignores order: two values are equal when they hold the same labels
/// with the same counts.
#[derive(Clone, Debug, Default)]
pub struct ClassCounts {
    entries: Vec<(String, usize)>,
}

impl ClassCounts {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, label: &str, count: usize) {
        match self.entries.iter_mut().find(|(name, _)| name == label) {
            Some((_, existing)) => *existing += count,
            None => self.entries.push((label.to_string(), count)),
        }
    }

    /// Count for one label, `None` when the label was never seen.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, count)| *count)
    }

    /// Sum over all classes.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels and counts in encounter order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.entries
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
    }

    pub fn to_map(&self) -> HashMap<String, usize> {
        self.entries.iter().cloned().collect()
    }

    pub fn into_rows(self) -> Vec<ReportRow> {
        self.entries
            .into_iter()
            .map(|(class_label, count)| ReportRow { class_label, count })
            .collect()
    }
}

impl PartialEq for ClassCounts {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(label, count)| other.get(label) == Some(count))
    }
}

impl Eq for ClassCounts {}

impl<S: AsRef<str>> FromIterator<(S, usize)> for ClassCounts {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        let mut counts = ClassCounts::new();
        for (label, count) in iter {
            counts.add(label.as_ref(), count);
        }
        counts
    }
}

// ----------------------------------------------------------------------------
// FrameAggregator: tracked mode
// ----------------------------------------------------------------------------

struct ClassBucket {
    label: String,
    track_ids: HashSet<TrackId>,
}

/// Running per-class unique-object counts for one stream session.
///
/// Each class keeps its own id set. The sets are not cross-checked: if a tracker
/// reports the same id under two classes, that id is counted once in each.
#[derive(Default)]
pub struct FrameAggregator {
    buckets: Vec<ClassBucket>,
    by_label: HashMap<String, usize>,
    frames_ingested: u64,
}

impl FrameAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every class, id and frame seen so far.
    pub fn reset(&mut self) {
        self.buckets.clear();
        self.by_label.clear();
        self.frames_ingested = 0;
    }

    /// Fold one processed frame into the running counts.
    ///
    /// The frame counter advances even when `frame_events` is empty. Re-observing an
    /// id already recorded under the same class has no effect.
    pub fn ingest(&mut self, frame_events: &[DetectionEvent]) {
        for event in frame_events {
            let slot = match self.by_label.get(&event.class_label) {
                Some(&slot) => slot,
                None => {
                    self.buckets.push(ClassBucket {
                        label: event.class_label.clone(),
                        track_ids: HashSet::new(),
                    });
                    let slot = self.buckets.len() - 1;
                    self.by_label.insert(event.class_label.clone(), slot);
                    slot
                }
            };
            self.buckets[slot].track_ids.insert(event.track_id);
        }
        self.frames_ingested += 1;
    }

    /// Counts so far. Safe to call at any point of the stream.
    pub fn snapshot(&self) -> ClassCounts {
        ClassCounts {
            entries: self
                .buckets
                .iter()
                .map(|bucket| (bucket.label.clone(), bucket.track_ids.len()))
                .collect(),
        }
    }

    /// Report rows in first-encounter order of class labels.
    pub fn to_report_rows(&self) -> Vec<ReportRow> {
        self.snapshot().into_rows()
    }

    /// Number of `ingest` calls since the last reset.
    pub fn frames_ingested(&self) -> u64 {
        self.frames_ingested
    }

    /// Number of distinct (class_label, track_id) pairs recorded.
    pub fn distinct_observations(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.track_ids.len()).sum()
    }
}

// ----------------------------------------------------------------------------
// tally: untracked mode
// ----------------------------------------------------------------------------

/// Count the boxes of a single frame by class label, without identity.
pub fn tally<I, S>(labels: I) -> ClassCounts
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = ClassCounts::new();
    for label in labels {
        counts.add(label.as_ref(), 1);
    }
    counts
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    const LABELS: [&str; 4] = ["Car", "Bike", "Bus", "Truck"];

    fn ev(id: u64, label: &str) -> DetectionEvent {
        DetectionEvent::new(id, label)
    }

    fn random_frame(rng: &mut StdRng) -> Vec<DetectionEvent> {
        let len = rng.gen_range(0..6);
        (0..len)
            .map(|_| {
                let label = LABELS[rng.gen_range(0..LABELS.len())];
                ev(rng.gen_range(1..20), label)
            })
            .collect()
    }

    fn scenario() -> FrameAggregator {
        let mut agg = FrameAggregator::new();
        agg.ingest(&[ev(1, "Car")]);
        agg.ingest(&[ev(1, "Car")]);
        agg.ingest(&[ev(2, "Car")]);
        agg.ingest(&[ev(3, "Bike")]);
        agg
    }

    #[test]
    fn repeated_ids_count_once_per_class() {
        let agg = scenario();
        let expected: ClassCounts = [("Car", 2), ("Bike", 1)].into_iter().collect();
        assert_eq!(agg.snapshot(), expected);
        assert_eq!(agg.snapshot().total(), 3);
        assert_eq!(agg.frames_ingested(), 4);
    }

    #[test]
    fn report_rows_follow_encounter_order() {
        let agg = scenario();
        assert_eq!(
            agg.to_report_rows(),
            vec![ReportRow::new("Car", 2), ReportRow::new("Bike", 1)]
        );
        // Repeated exports of the same session are identical.
        assert_eq!(agg.to_report_rows(), agg.to_report_rows());
    }

    #[test]
    fn tally_counts_every_box() {
        let counts = tally(["Car", "Car", "Bus"]);
        let expected: ClassCounts = [("Car", 2), ("Bus", 1)].into_iter().collect();
        assert_eq!(counts, expected);
        assert_eq!(counts.into_rows()[0], ReportRow::new("Car", 2));
    }

    #[test]
    fn tally_of_empty_frame_is_empty() {
        assert!(tally(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn reset_clears_counts_and_frames() {
        let mut agg = scenario();
        agg.reset();
        assert!(agg.snapshot().is_empty());
        assert_eq!(agg.frames_ingested(), 0);
        assert!(agg.to_report_rows().is_empty());
    }

    #[test]
    fn empty_frames_only_advance_the_frame_counter() {
        let mut agg = scenario();
        let before = agg.snapshot();
        for _ in 0..5 {
            agg.ingest(&[]);
        }
        assert_eq!(agg.snapshot(), before);
        assert_eq!(agg.frames_ingested(), 9);
    }

    #[test]
    fn same_id_under_two_classes_counts_in_both() {
        // A tracker that relabels an id produces one entry per class.
        let mut agg = FrameAggregator::new();
        agg.ingest(&[ev(7, "Car")]);
        agg.ingest(&[ev(7, "Truck")]);
        agg.ingest(&[ev(7, "Car")]);

        assert_eq!(agg.snapshot().get("Car"), Some(1));
        assert_eq!(agg.snapshot().get("Truck"), Some(1));
        assert_eq!(agg.snapshot().total(), 2);
    }

    #[test]
    fn total_equals_distinct_pairs() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut agg = FrameAggregator::new();
            let mut pairs = HashSet::new();
            for _ in 0..rng.gen_range(0..30) {
                let frame = random_frame(&mut rng);
                for event in &frame {
                    pairs.insert((event.class_label.clone(), event.track_id));
                }
                agg.ingest(&frame);
            }
            assert_eq!(agg.snapshot().total(), pairs.len());
            assert_eq!(agg.distinct_observations(), pairs.len());
        }
    }

    #[test]
    fn ingesting_a_frame_twice_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..50 {
            let mut agg = FrameAggregator::new();
            for _ in 0..rng.gen_range(0..10) {
                agg.ingest(&random_frame(&mut rng));
            }
            let frame = random_frame(&mut rng);
            agg.ingest(&frame);
            let once = agg.snapshot();
            agg.ingest(&frame);
            assert_eq!(agg.snapshot(), once);
        }
    }

    #[test]
    fn order_within_a_frame_does_not_matter() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let history: Vec<Vec<DetectionEvent>> =
                (0..rng.gen_range(1..8)).map(|_| random_frame(&mut rng)).collect();

            let mut straight = FrameAggregator::new();
            let mut shuffled = FrameAggregator::new();
            for frame in &history {
                straight.ingest(frame);
                let mut permuted = frame.clone();
                permuted.shuffle(&mut rng);
                shuffled.ingest(&permuted);
            }
            assert_eq!(straight.snapshot(), shuffled.snapshot());
        }
    }

    #[test]
    fn class_counts_equality_ignores_order() {
        let a: ClassCounts = [("Car", 2), ("Bus", 1)].into_iter().collect();
        let b: ClassCounts = [("Bus", 1), ("Car", 2)].into_iter().collect();
        let c: ClassCounts = [("Bus", 1), ("Car", 3)].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_map(), b.to_map());
    }
}
