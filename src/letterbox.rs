//! Letterbox transform.
//!
//! Fits a frame into a fixed inference canvas without changing its aspect
//! ratio: scale by the smaller axis ratio, center, pad with black. The
//! geometry is kept so boxes found on the canvas can be mapped back onto the
//! frame they were computed from.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::detect::BoundingBox;
use crate::frame::Frame;

/// Scale and padding that place a source image inside a target canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LetterboxGeometry {
    pub source_width: u32,
    pub source_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_left: u32,
    pub pad_top: u32,
}

impl LetterboxGeometry {
    pub fn compute(
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Self> {
        if source_width == 0 || source_height == 0 {
            return Err(anyhow!(
                "cannot letterbox an empty source ({}x{})",
                source_width,
                source_height
            ));
        }
        if target_width == 0 || target_height == 0 {
            return Err(anyhow!(
                "cannot letterbox into an empty canvas ({}x{})",
                target_width,
                target_height
            ));
        }

        let scale_x = target_width as f32 / source_width as f32;
        let scale_y = target_height as f32 / source_height as f32;
        let scale = scale_x.min(scale_y);

        // Multiply-then-truncate, so results match a plain integer cast.
        let scaled_width = ((source_width as f32 * scale) as u32).clamp(1, target_width);
        let scaled_height = ((source_height as f32 * scale) as u32).clamp(1, target_height);

        Ok(Self {
            source_width,
            source_height,
            target_width,
            target_height,
            scale,
            scaled_width,
            scaled_height,
            pad_left: (target_width - scaled_width) / 2,
            pad_top: (target_height - scaled_height) / 2,
        })
    }

    /// Map a box from canvas coordinates back to source coordinates.
    ///
    /// The result is clamped to the source frame.
    pub fn to_source(&self, bbox: BoundingBox) -> BoundingBox {
        let max_x = self.source_width.saturating_sub(1) as f32;
        let max_y = self.source_height.saturating_sub(1) as f32;
        let unscale_x = |x: i32| -> i32 {
            ((x as f32 - self.pad_left as f32) / self.scale)
                .round()
                .clamp(0.0, max_x) as i32
        };
        let unscale_y = |y: i32| -> i32 {
            ((y as f32 - self.pad_top as f32) / self.scale)
                .round()
                .clamp(0.0, max_y) as i32
        };
        BoundingBox {
            left: unscale_x(bbox.left),
            top: unscale_y(bbox.top),
            right: unscale_x(bbox.right),
            bottom: unscale_y(bbox.bottom),
        }
    }
}

/// Padded canvas plus the geometry used to build it.
#[derive(Clone, Debug)]
pub struct Letterboxed {
    pub canvas: Frame,
    pub geometry: LetterboxGeometry,
}

/// Letterbox `frame` into a `target_width` x `target_height` canvas.
///
/// The canvas keeps the frame's channel order. Identical inputs give
/// bit-identical output.
pub fn letterbox(frame: &Frame, target_width: u32, target_height: u32) -> Result<Letterboxed> {
    let geometry =
        LetterboxGeometry::compute(frame.width(), frame.height(), target_width, target_height)?;

    let source = frame.to_image_raw()?;
    let scaled = if geometry.scaled_width == frame.width()
        && geometry.scaled_height == frame.height()
    {
        source
    } else {
        imageops::resize(
            &source,
            geometry.scaled_width,
            geometry.scaled_height,
            FilterType::Triangle,
        )
    };

    let mut canvas = RgbImage::new(target_width, target_height);
    imageops::replace(
        &mut canvas,
        &scaled,
        geometry.pad_left as i64,
        geometry.pad_top as i64,
    );

    Ok(Letterboxed {
        canvas: Frame::from_image_raw(canvas, frame.order()),
        geometry,
    })
}
