use anyhow::Result;

use crate::detect::result::{CoordinateSpace, Detection};
use crate::frame::PixelOrder;

/// Inference adapter trait.
///
/// An adapter owns its model context for its whole lifetime: construction
/// loads the model, `Drop` releases it. Calls are synchronous and never
/// reentered; the result of one `infer` is read back before the input
/// buffer is refilled for the next frame.
pub trait InferenceAdapter: Send {
    /// Adapter identifier.
    fn name(&self) -> &'static str;

    /// Fixed input canvas size `(width, height)`.
    fn input_size(&self) -> (u32, u32);

    /// Upper bound on detections returned per call.
    fn max_detections(&self) -> usize;

    /// Channel order the model expects in its input canvas.
    fn input_order(&self) -> PixelOrder {
        PixelOrder::Rgb
    }

    /// Space the returned boxes are expressed in.
    fn output_space(&self) -> CoordinateSpace {
        CoordinateSpace::ModelInput
    }

    /// Run inference on one packed canvas of exactly `w * h * 3` bytes, in
    /// `input_order()`.
    ///
    /// Returns detections ordered by the adapter, at most `max_detections()`.
    fn infer(&mut self, input: &[u8]) -> Result<Vec<Detection>>;
}

