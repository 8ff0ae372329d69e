use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};

use crate::frame::{packed_len, Frame, PixelOrder, SensorFormat, SensorFrame};

/// Convert a sensor buffer into a packed frame in the requested channel order.
pub fn normalize_sensor_frame(frame: &SensorFrame, order: PixelOrder) -> Result<Frame> {
    let packed = match frame.format {
        SensorFormat::Rgb24 => {
            let expected = packed_len(frame.width, frame.height)?;
            if frame.data.len() != expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    frame.data.len()
                ));
            }
            let mut pixels = frame.data.clone();
            if order == PixelOrder::Bgr {
                swap_red_blue(&mut pixels);
            }
            pixels
        }
        SensorFormat::Nv12 => nv12_to_packed(&frame.data, frame.width, frame.height, order)?,
    };
    Frame::new(frame.width, frame.height, order, packed)
}

/// Resize to the working resolution with linear interpolation.
///
/// Returns the frame unchanged when it already has the requested size.
pub fn resize_to(frame: Frame, width: u32, height: u32) -> Result<Frame> {
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot resize to {}x{}", width, height));
    }
    if frame.width() == width && frame.height() == height {
        return Ok(frame);
    }
    let order = frame.order();
    let image = frame.to_image_raw()?;
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    Ok(Frame::from_image_raw(resized, order))
}

fn nv12_to_packed(pixels: &[u8], width: u32, height: u32, order: PixelOrder) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 || h % 2 != 0 {
        return Err(anyhow!("NV12 frame dimensions must be even, got {}x{}", w, h));
    }
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let (r_idx, b_idx) = match order {
        PixelOrder::Rgb => (0, 2),
        PixelOrder::Bgr => (2, 0),
    };

    let mut out = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            out[offset + r_idx] = clamp_to_u8(r);
            out[offset + 1] = clamp_to_u8(g);
            out[offset + b_idx] = clamp_to_u8(b);
        }
    }

    Ok(out)
}

fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv12(width: u32, height: u32, y: u8, u: u8, v: u8) -> SensorFrame {
        let y_len = (width * height) as usize;
        let mut data = vec![y; y_len];
        for _ in 0..y_len / 4 {
            data.push(u);
            data.push(v);
        }
        SensorFrame::new(width, height, SensorFormat::Nv12, 0, data)
    }

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let frame = normalize_sensor_frame(&nv12(2, 2, 128, 128, 128), PixelOrder::Rgb)?;
        assert_eq!(frame.data(), &[128u8; 12][..]);
        Ok(())
    }

    #[test]
    fn nv12_red_lands_in_requested_channel() -> Result<()> {
        // Strong V pushes red up and leaves blue near luma.
        let sensor = nv12(2, 2, 100, 128, 200);
        let rgb = normalize_sensor_frame(&sensor, PixelOrder::Rgb)?;
        let bgr = normalize_sensor_frame(&sensor, PixelOrder::Bgr)?;
        assert!(rgb.data()[0] > rgb.data()[2]);
        assert_eq!(rgb.data()[0], bgr.data()[2]);
        assert_eq!(rgb.data()[2], bgr.data()[0]);
        Ok(())
    }

    #[test]
    fn nv12_rejects_truncated_buffer() {
        let mut sensor = nv12(4, 4, 0, 128, 128);
        sensor.data.pop();
        assert!(normalize_sensor_frame(&sensor, PixelOrder::Rgb).is_err());
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let sensor = SensorFrame::new(1, 3, SensorFormat::Rgb24, 0, pixels.clone());
        let frame = normalize_sensor_frame(&sensor, PixelOrder::Rgb)?;
        assert_eq!(frame.data(), &pixels[..]);

        let short = SensorFrame::new(2, 3, SensorFormat::Rgb24, 0, pixels);
        assert!(normalize_sensor_frame(&short, PixelOrder::Rgb).is_err());
        Ok(())
    }

    #[test]
    fn resize_changes_dimensions_only_when_needed() -> Result<()> {
        let frame = Frame::black(8, 6, PixelOrder::Bgr)?;
        let same = resize_to(frame.clone(), 8, 6)?;
        assert_eq!(same, frame);

        let bigger = resize_to(frame, 16, 12)?;
        assert_eq!((bigger.width(), bigger.height()), (16, 12));
        assert_eq!(bigger.order(), PixelOrder::Bgr);
        Ok(())
    }
}
