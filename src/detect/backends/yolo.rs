//! YOLOv5 output decoding.
//!
//! Rows are `[cx, cy, w, h, objectness, class scores...]` in canvas pixels.

use std::cmp::Ordering;

use crate::detect::result::{BoundingBox, CoordinateSpace, Detection};

pub const BOX_THRESHOLD: f32 = 0.25;
pub const NMS_THRESHOLD: f32 = 0.45;

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: u32,
    score: f32,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

/// Decode raw rows into detections: threshold, per-class NMS, cap at `max`.
///
/// Output is sorted by descending confidence.
#[cfg_attr(not(feature = "backend-tract"), allow(dead_code))]
pub fn decode_rows<'a, I>(rows: I, num_classes: usize, max: usize) -> Vec<Detection>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut candidates = Vec::new();
    for row in rows {
        if row.len() < 5 + num_classes {
            continue;
        }
        let objectness = row[4];
        if objectness < BOX_THRESHOLD {
            continue;
        }
        let Some((class_id, class_score)) = row[5..5 + num_classes]
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        else {
            continue;
        };
        let score = objectness * class_score;
        if score < BOX_THRESHOLD {
            continue;
        }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        candidates.push(Candidate {
            class_id: class_id as u32,
            score,
            x0: cx - w / 2.0,
            y0: cy - h / 2.0,
            x1: cx + w / 2.0,
            y1: cy + h / 2.0,
        });
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::new();
    'outer: for cand in candidates {
        for k in &kept {
            if k.class_id == cand.class_id && iou(k, &cand) > NMS_THRESHOLD {
                continue 'outer;
            }
        }
        kept.push(cand);
        if kept.len() >= max {
            break;
        }
    }

    kept.into_iter()
        .map(|c| {
            Detection::new(
                c.class_id,
                c.score,
                BoundingBox::new(
                    c.x0.round() as i32,
                    c.y0.round() as i32,
                    c.x1.round() as i32,
                    c.y1.round() as i32,
                ),
                CoordinateSpace::ModelInput,
            )
        })
        .collect()
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix0 = a.x0.max(b.x0);
    let iy0 = a.y0.max(b.y0);
    let ix1 = a.x1.min(b.x1);
    let iy1 = a.y1.min(b.y1);
    if ix1 <= ix0 || iy1 <= iy0 {
        return 0.0;
    }
    let inter = (ix1 - ix0) * (iy1 - iy0);
    let area_a = (a.x1 - a.x0) * (a.y1 - a.y0);
    let area_b = (b.x1 - b.x0) * (b.y1 - b.y0);
    let union = area_a + area_b - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
