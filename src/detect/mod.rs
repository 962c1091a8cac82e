mod backend;
pub mod backends;
mod model;
mod pipeline;
pub mod postprocess;
mod result;
mod tracker;

pub use backend::{DetectorBackend, ObjectTracker};
pub use backends::{ScriptedBackend, SimulatedTraffic};
pub use model::{
    load_detector, load_with_fallback, BackendKind, LoadedModel, ModelFallback, ModelVariant,
};
pub use pipeline::TrackingDetector;
pub use result::{Detection, TrackedFrame};
pub use tracker::{IouTracker, IouTrackerConfig};
