//! Pretrained model selection and loading with fallback.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::SimulatedTraffic;

/// Pretrained weight variants, smallest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ModelVariant {
    #[default]
    YoloV8n,
    YoloV8m,
    YoloV8l,
    YoloV8x,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 4] = [
        ModelVariant::YoloV8n,
        ModelVariant::YoloV8m,
        ModelVariant::YoloV8l,
        ModelVariant::YoloV8x,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::YoloV8n => "yolov8n",
            ModelVariant::YoloV8m => "yolov8m",
            ModelVariant::YoloV8l => "yolov8l",
            ModelVariant::YoloV8x => "yolov8x",
        }
    }

    /// Upstream weight identifier, e.g. `yolov8n.pt`.
    pub fn weights_id(&self) -> String {
        format!("{}.pt", self.name())
    }

    /// File name of the exported ONNX graph, e.g. `yolov8n.onnx`.
    pub fn onnx_file(&self) -> String {
        format!("{}.onnx", self.name())
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = anyhow::Error;

    /// Accepts `yolov8n`, `yolov8n.pt` or `yolov8n.onnx` (any case).
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let stem = normalized
            .strip_suffix(".pt")
            .or_else(|| normalized.strip_suffix(".onnx"))
            .unwrap_or(&normalized);
        ModelVariant::ALL
            .into_iter()
            .find(|variant| variant.name() == stem)
            .ok_or_else(|| {
                anyhow!(
                    "unknown model '{}' (expected one of: yolov8n, yolov8m, yolov8l, yolov8x)",
                    s
                )
            })
    }
}

impl TryFrom<String> for ModelVariant {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Which detector implementation backs the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    /// Deterministic synthetic traffic, no model file needed.
    Simulated,
    /// YOLOv8 ONNX graph run by tract (feature `backend-tract`).
    Onnx,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "backend-tract") {
            BackendKind::Onnx
        } else {
            BackendKind::Simulated
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(BackendKind::Simulated),
            "onnx" | "tract" => Ok(BackendKind::Onnx),
            other => Err(anyhow!("unknown backend '{}' (expected simulated|onnx)", other)),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simulated => f.write_str("simulated"),
            BackendKind::Onnx => f.write_str("onnx"),
        }
    }
}

/// Why the requested variant was not used.
#[derive(Clone, Debug)]
pub struct ModelFallback {
    pub requested: ModelVariant,
    pub reason: String,
}

/// A loaded backend and the variant it actually runs.
pub struct LoadedModel<B> {
    pub backend: B,
    pub variant: ModelVariant,
    pub fallback: Option<ModelFallback>,
}

/// Load `requested`; if that fails, warn and load the default variant instead.
///
/// Fails only when the default variant cannot be loaded either.
pub fn load_with_fallback<B, F>(requested: ModelVariant, mut load: F) -> Result<LoadedModel<B>>
where
    F: FnMut(ModelVariant) -> Result<B>,
{
    let err = match load(requested) {
        Ok(backend) => {
            return Ok(LoadedModel {
                backend,
                variant: requested,
                fallback: None,
            })
        }
        Err(err) => err,
    };

    let default = ModelVariant::default();
    if requested == default {
        return Err(err.context(format!("failed to load model {}", requested)));
    }

    log::warn!(
        "error loading model {}: {:#}. using '{}' as fallback",
        requested,
        err,
        default.weights_id()
    );
    let backend = load(default)
        .map_err(|e| e.context(format!("fallback model {} failed to load", default)))?;
    Ok(LoadedModel {
        backend,
        variant: default,
        fallback: Some(ModelFallback {
            requested,
            reason: format!("{:#}", err),
        }),
    })
}

/// Load the configured detector backend.
///
/// `seed` only affects the simulated backend.
pub fn load_detector(
    kind: BackendKind,
    requested: ModelVariant,
    models_dir: &Path,
    seed: u64,
) -> Result<LoadedModel<Box<dyn DetectorBackend>>> {
    match kind {
        BackendKind::Simulated => Ok(LoadedModel {
            backend: Box::new(SimulatedTraffic::new(seed)),
            variant: requested,
            fallback: None,
        }),
        BackendKind::Onnx => load_with_fallback(requested, |variant| open_onnx(models_dir, variant)),
    }
}

#[cfg(feature = "backend-tract")]
fn open_onnx(models_dir: &Path, variant: ModelVariant) -> Result<Box<dyn DetectorBackend>> {
    let path = models_dir.join(variant.onnx_file());
    let backend = crate::detect::backends::TractBackend::new(&path)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_onnx(models_dir: &Path, variant: ModelVariant) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "cannot load {}: ONNX inference requires the backend-tract feature",
        models_dir.join(variant.onnx_file()).display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weight_identifiers() -> Result<()> {
        assert_eq!("yolov8n".parse::<ModelVariant>()?, ModelVariant::YoloV8n);
        assert_eq!("yolov8m.pt".parse::<ModelVariant>()?, ModelVariant::YoloV8m);
        assert_eq!(" YOLOv8x.onnx ".parse::<ModelVariant>()?, ModelVariant::YoloV8x);
        assert!("yolov5s".parse::<ModelVariant>().is_err());
        assert_eq!(ModelVariant::YoloV8l.weights_id(), "yolov8l.pt");
        assert_eq!(ModelVariant::YoloV8l.onnx_file(), "yolov8l.onnx");
        Ok(())
    }

    #[test]
    fn requested_model_loads_without_fallback() -> Result<()> {
        let loaded = load_with_fallback(ModelVariant::YoloV8l, |variant| Ok(variant.name()))?;
        assert_eq!(loaded.variant, ModelVariant::YoloV8l);
        assert_eq!(loaded.backend, "yolov8l");
        assert!(loaded.fallback.is_none());
        Ok(())
    }

    #[test]
    fn failed_model_falls_back_to_default() -> Result<()> {
        let mut attempts = Vec::new();
        let loaded = load_with_fallback(ModelVariant::YoloV8x, |variant| {
            attempts.push(variant);
            if variant == ModelVariant::YoloV8x {
                Err(anyhow!("weights missing"))
            } else {
                Ok(variant.name())
            }
        })?;
        assert_eq!(attempts, vec![ModelVariant::YoloV8x, ModelVariant::YoloV8n]);
        assert_eq!(loaded.variant, ModelVariant::YoloV8n);
        let fallback = loaded.fallback.expect("fallback recorded");
        assert_eq!(fallback.requested, ModelVariant::YoloV8x);
        assert!(fallback.reason.contains("weights missing"));
        Ok(())
    }

    #[test]
    fn default_failure_is_an_error() {
        let result: Result<LoadedModel<()>> =
            load_with_fallback(ModelVariant::YoloV8m, |_| Err(anyhow!("no weights")));
        assert!(result.is_err());

        let mut calls = 0;
        let result: Result<LoadedModel<()>> = load_with_fallback(ModelVariant::YoloV8n, |_| {
            calls += 1;
            Err(anyhow!("no weights"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn simulated_backend_needs_no_model_file() -> Result<()> {
        let loaded = load_detector(
            BackendKind::Simulated,
            ModelVariant::YoloV8m,
            Path::new("/nonexistent"),
            1,
        )?;
        assert_eq!(loaded.backend.name(), "simulated");
        assert_eq!(loaded.variant, ModelVariant::YoloV8m);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn onnx_without_feature_fails_after_fallback() {
        let result = load_detector(
            BackendKind::Onnx,
            ModelVariant::YoloV8x,
            Path::new("models"),
            0,
        );
        let err = result.err().expect("onnx unavailable");
        assert!(format!("{:#}", err).contains("backend-tract"));
    }
}
