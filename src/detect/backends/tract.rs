#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{label_for, non_max_suppression, COCO_LABELS};
use crate::detect::result::Detection;
use crate::frame::{BoundingBox, Frame};

/// Square input edge used by the exported YOLOv8 graphs.
const INPUT_SIZE: u32 = 640;

/// Tract-based backend for YOLOv8 ONNX inference.
///
/// Frames are stretched to the model input, the `[1, 4 + classes, anchors]` output is
/// decoded into boxes in source-frame pixels, and per-class NMS is applied. It does
/// not perform any network I/O or write to disk beyond model loading.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    labels: Vec<String>,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!("TractBackend: loaded {}", model_path.display());
        Ok(Self {
            model,
            labels: COCO_LABELS.iter().map(|label| label.to_string()).collect(),
            iou_threshold: 0.45,
        })
    }

    /// Override the NMS overlap threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Replace the label table (custom-trained checkpoints).
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!("frame {} has no pixels", frame.index));
        }
        let pixels = frame.pixels();
        if pixels.len() != frame.expected_len() {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                frame.expected_len(),
                pixels.len()
            ));
        }

        let size = INPUT_SIZE as usize;
        let (fw, fh) = (frame.width as usize, frame.height as usize);
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            let sx = x * fw / size;
            let sy = y * fh / size;
            pixels[(sy * fw + sx) * 3 + channel] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("expected a [1, 4 + classes, anchors] output")?;

        let (_, rows, anchors) = view.dim();
        if rows <= 4 {
            return Err(anyhow!("model output has no class scores ({} rows)", rows));
        }

        let scale_x = frame.width as f32 / INPUT_SIZE as f32;
        let scale_y = frame.height as f32 / INPUT_SIZE as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, view[[0, row, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < confidence {
                continue;
            }
            let bbox = BoundingBox::from_center(
                view[[0, 0, anchor]] * scale_x,
                view[[0, 1, anchor]] * scale_y,
                view[[0, 2, anchor]] * scale_x,
                view[[0, 3, anchor]] * scale_y,
            )
            .clamp_to(frame.width, frame.height);
            candidates.push(Detection::new(
                class_id,
                label_for(&self.labels, class_id),
                score,
                bbox,
            ));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = INPUT_SIZE;
        let blank = Frame::new(vec![0; (size * size * 3) as usize], size, size, 0);
        self.predict(&blank, 1.0).map(|_| ())
    }
}
