//! Traffic Counter
//!
//! Vehicle detection and counting for still images, video files and live
//! cameras, layered over a pretrained detector and tracker.
//!
//! # Architecture
//!
//! The one stateful piece is the `FrameAggregator`: it consumes per-frame
//! tracked detections and keeps, per class label, the set of track ids seen so
//! far. A vehicle visible across many frames therefore counts once.
//!
//! # Module Structure
//!
//! - `aggregate`: Frame aggregator, untracked tally, count snapshots
//! - `frame`: Owned RGB frames and box geometry
//! - `ingest`: Frame sources (synthetic, image, video file, V4L2 camera)
//! - `detect`: Detector and tracker traits, IoU tracker, model selection, backends
//! - `session`: The frame loop with frame skip and cooperative cancellation
//! - `report`: CSV export and summaries
//! - `config`: Layered configuration (defaults, TOML file, env)

pub mod aggregate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod report;
pub mod session;

pub use aggregate::{tally, ClassCounts, DetectionEvent, FrameAggregator, ReportRow, TrackId};
pub use config::CounterConfig;
pub use detect::{
    load_detector, BackendKind, Detection, DetectorBackend, LoadedModel, ModelVariant,
    ObjectTracker, TrackedFrame, TrackingDetector,
};
pub use frame::{BoundingBox, Frame};
pub use ingest::{build_source, FrameSource, SourceSpec};
pub use report::{summary_text, to_csv, write_csv, RunSummary, REPORT_FILE_NAME};
pub use session::{
    count_still_frame, count_still_image, CancelFlag, SessionOutcome, SessionProgress,
    SessionSettings, StillImageCount, StreamEnd, StreamSession,
};
