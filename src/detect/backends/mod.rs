pub mod simulated;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use simulated::{SimulatedTraffic, SIMULATED_CLASSES};
pub use stub::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
