use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceAdapter;
use crate::detect::result::{CoordinateSpace, Detection};

/// Stub adapter for testing and dry runs.
///
/// Returns the same scripted detections for every frame, after checking the
/// input has the expected shape.
pub struct StubAdapter {
    input_width: u32,
    input_height: u32,
    max_detections: usize,
    space: CoordinateSpace,
    scripted: Vec<Detection>,
    calls: u64,
}

impl StubAdapter {
    pub fn new(input_width: u32, input_height: u32) -> Self {
        Self {
            input_width,
            input_height,
            max_detections: super::MAX_DETECTIONS,
            space: CoordinateSpace::ModelInput,
            scripted: Vec::new(),
            calls: 0,
        }
    }

    /// Detections returned by every call.
    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.scripted = detections;
        self
    }

    pub fn with_output_space(mut self, space: CoordinateSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    fn max_detections(&self) -> usize {
        self.max_detections
    }

    fn output_space(&self) -> CoordinateSpace {
        self.space
    }

    fn infer(&mut self, input: &[u8]) -> Result<Vec<Detection>> {
        let expected = self.input_width as usize * self.input_height as usize * 3;
        if input.len() != expected {
            return Err(anyhow!(
                "expected {} input bytes, received {}",
                expected,
                input.len()
            ));
        }
        self.calls += 1;
        Ok(self
            .scripted
            .iter()
            .take(self.max_detections)
            .map(|det| Detection {
                space: self.space,
                ..det.clone()
            })
            .collect())
    }
}
