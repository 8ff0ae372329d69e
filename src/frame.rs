//! Frame containers.
//!
//! - `Frame`: packed 3-channel pixels in RGB or BGR order. This is what the
//!   capture loop works on, what the letterbox consumes and what readers of
//!   the shared state receive (always as their own copy).
//! - `SensorFrame`: the video source's handle for one captured buffer, in the
//!   sensor's native layout. It must be handed back to the source that
//!   produced it.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Deserialize;

/// Channel order of a packed 3-byte pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Packed 3-channel frame.
///
/// The buffer always holds exactly `width * height * 3` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    order: PixelOrder,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, order: PixelOrder, data: Vec<u8>) -> Result<Self> {
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    /// Zero-filled (black) frame.
    pub fn black(width: u32, height: u32, order: PixelOrder) -> Result<Self> {
        let len = packed_len(width, height)?;
        Self::new(width, height, order, vec![0u8; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> PixelOrder {
        self.order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// View the pixels as an `image` buffer without reordering channels.
    ///
    /// For BGR frames the buffer's "red" channel holds blue; geometric
    /// operations (resize, paste) do not care.
    pub(crate) fn to_image_raw(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }

    pub(crate) fn from_image_raw(image: RgbImage, order: PixelOrder) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            order,
            data: image.into_raw(),
        }
    }

    /// Reorder channels in place when `order` differs from the frame's.
    pub fn into_order(mut self, order: PixelOrder) -> Self {
        if self.order != order {
            for pixel in self.data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
            self.order = order;
        }
        self
    }

    /// Copy into an RGB-ordered image, swapping channels for BGR frames.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let mut image = self.to_image_raw()?;
        if self.order == PixelOrder::Bgr {
            for pixel in image.pixels_mut() {
                pixel.0.swap(0, 2);
            }
        }
        Ok(image)
    }
}

/// Native layout of a sensor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorFormat {
    /// YUV 4:2:0 semi-planar: full-res Y plane followed by interleaved UV.
    Nv12,
    /// Packed RGB, 3 bytes per pixel.
    Rgb24,
}

/// One captured buffer, owned by the loop between `get_frame` and
/// `release_frame`.
#[derive(Debug)]
pub struct SensorFrame {
    pub width: u32,
    pub height: u32,
    pub format: SensorFormat,
    pub sequence: u64,
    pub(crate) data: Vec<u8>,
}

impl SensorFrame {
    pub fn new(width: u32, height: u32, format: SensorFormat, sequence: u64, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            sequence,
            data,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

pub(crate) fn packed_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
