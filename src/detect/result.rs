use serde::Deserialize;

/// Coordinate space a bounding box is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Pixels of the letterboxed inference canvas (padding and scale applied).
    ModelInput,
    /// Pixels of the frame that is published and annotated.
    Display,
}

/// Axis-aligned box in integer pixels, inclusive corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    /// Confidence in 0..=1.
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub space: CoordinateSpace,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox, space: CoordinateSpace) -> Self {
        Self {
            class_id,
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            space,
        }
    }
}
