#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::InferenceAdapter;
use crate::detect::classes::CocoClasses;
use crate::detect::result::Detection;

use super::yolo::decode_rows;

/// Tract-based adapter for YOLOv5 ONNX models.
///
/// Loads a local model file once; inference runs on packed RGB canvases and
/// returns boxes in canvas pixels.
pub struct TractAdapter {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    max_detections: usize,
}

impl TractAdapter {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            max_detections: super::MAX_DETECTIONS,
        })
    }

    fn build_input(&self, pixels: &[u8]) -> Result<Tensor> {
        let expected_len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("input dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let row_len = *shape
            .last()
            .ok_or_else(|| anyhow!("model output has no dimensions"))?;
        if row_len < 5 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let num_classes = (row_len - 5).min(CocoClasses::COUNT);
        let flat = view
            .as_slice()
            .ok_or_else(|| anyhow!("model output is not contiguous"))?;
        Ok(decode_rows(
            flat.chunks_exact(row_len),
            num_classes,
            self.max_detections,
        ))
    }
}

impl InferenceAdapter for TractAdapter {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_detections(&self) -> usize {
        self.max_detections
    }

    fn infer(&mut self, input: &[u8]) -> Result<Vec<Detection>> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}
