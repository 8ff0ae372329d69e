//! Detection overlay and JPEG encoding for snapshot responses.
//!
//! Runs on a reader's private copy of a snapshot, never under the shared
//! state lock.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, ClassNames, CoordinateSpace, Detection};
use crate::frame::Frame;
use crate::shared::Snapshot;

pub const JPEG_QUALITY: u8 = 80;
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: i32 = 2;

/// Gap between the label baseline and the box top.
const LABEL_GAP: i32 = 10;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = (GLYPH_WIDTH + 1) * GLYPH_SCALE;

/// `"<class-name> <confidence>%"`, confidence with one decimal.
pub fn detection_label(det: &Detection, classes: &dyn ClassNames) -> String {
    format!(
        "{} {:.1}%",
        classes.name(det.class_id),
        det.confidence * 100.0
    )
}

/// Copy the frame to RGB and draw every display-space detection onto it.
pub fn annotate(
    frame: &Frame,
    detections: &[Detection],
    classes: &dyn ClassNames,
) -> Result<RgbImage> {
    let mut image = frame.to_rgb_image()?;
    for det in detections {
        if det.space != CoordinateSpace::Display {
            log::debug!(
                "skipping class {} box still in {:?} space",
                det.class_id,
                det.space
            );
            continue;
        }
        let Some(bbox) = clamp_box(det.bbox, image.width(), image.height()) else {
            continue;
        };
        draw_box(&mut image, bbox);
        let label = detection_label(det, classes);
        let label_top = if bbox.top - LABEL_GAP - GLYPH_HEIGHT * GLYPH_SCALE >= 0 {
            bbox.top - LABEL_GAP - GLYPH_HEIGHT * GLYPH_SCALE
        } else {
            bbox.top + BOX_THICKNESS + 1
        };
        draw_label(&mut image, &label, bbox.left, label_top);
    }
    Ok(image)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .context("encode snapshot JPEG")?;
    Ok(buf)
}

/// Annotate and encode a snapshot.
pub fn render_snapshot(
    snapshot: &Snapshot,
    classes: &dyn ClassNames,
    quality: u8,
) -> Result<Vec<u8>> {
    let image = annotate(&snapshot.frame, &snapshot.detections, classes)?;
    encode_jpeg(&image, quality)
}

fn clamp_box(bbox: BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    let clamped = BoundingBox {
        left: bbox.left.max(0),
        top: bbox.top.max(0),
        right: bbox.right.min(max_x),
        bottom: bbox.bottom.min(max_y),
    };
    (clamped.left <= clamped.right && clamped.top <= clamped.bottom).then_some(clamped)
}

fn draw_box(image: &mut RgbImage, bbox: BoundingBox) {
    for inset in 0..BOX_THICKNESS {
        let width = bbox.width() + 1 - 2 * inset;
        let height = bbox.height() + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(bbox.left + inset, bbox.top + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

fn draw_label(image: &mut RgbImage, text: &str, left: i32, top: i32) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let mut x = left;
    for ch in text.chars() {
        if x >= w {
            break;
        }
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..GLYPH_SCALE {
                        for dx in 0..GLYPH_SCALE {
                            let px = x + col * GLYPH_SCALE + dx;
                            let py = top + row as i32 * GLYPH_SCALE + dy;
                            if px >= 0 && py >= 0 && px < w && py < h {
                                image.put_pixel(px as u32, py as u32, BOX_COLOR);
                            }
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmap glyphs, most significant of the low five bits is the left column.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch.to_ascii_lowercase() {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'b' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x1E],
        'c' => [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E],
        'd' => [0x01, 0x01, 0x0D, 0x13, 0x11, 0x11, 0x0F],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'f' => [0x06, 0x09, 0x08, 0x1C, 0x08, 0x08, 0x08],
        'g' => [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'h' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x11],
        'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
        'j' => [0x02, 0x00, 0x06, 0x02, 0x02, 0x12, 0x0C],
        'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
        'l' => [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'p' => [0x00, 0x00, 0x1E, 0x11, 0x1E, 0x10, 0x10],
        'q' => [0x00, 0x00, 0x0D, 0x13, 0x0F, 0x01, 0x01],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        'u' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D],
        'v' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'w' => [0x00, 0x00, 0x11, 0x11, 0x15, 0x15, 0x0A],
        'x' => [0x00, 0x00, 0x11, 0x0A, 0x04, 0x0A, 0x11],
        'y' => [0x00, 0x00, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'z' => [0x00, 0x00, 0x1F, 0x02, 0x04, 0x08, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => return None,
    };
    Some(rows)
}
