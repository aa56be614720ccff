//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) the network emits, over a
//! `input/stride` square grid, a class score, an objectness score, a box
//! regression `(dx, dy, log w, log h)` and five landmark offsets. Output
//! tensors arrive grouped by kind:
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, .., kps_8, ..`.
//!
//! Decoding for grid cell `(row, col)` at stride `s`:
//! cx = (col + dx) * s, cy = (row + dy) * s, w = exp(log w) * s, h = exp(log h) * s

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Detection in detector-canvas pixel coordinates.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Decoded outputs for a single stride.
#[derive(Debug, Clone)]
pub struct StrideHead {
    pub stride: usize,
    pub grid: usize,
    /// Fused score per cell, `sqrt(cls * obj)`.
    pub scores: Vec<f32>,
    pub bbox: Array2<f32>,
    pub kps: Array2<f32>,
}

impl StrideHead {
    /// A head with every score zero; mostly useful for building fixtures.
    pub fn empty(stride: usize, input_size: usize) -> Self {
        let grid = input_size / stride;
        let cells = grid * grid;
        Self {
            stride,
            grid,
            scores: vec![0.0; cells],
            bbox: Array2::zeros((cells, 4)),
            kps: Array2::zeros((cells, 10)),
        }
    }
}

fn tensor(
    outputs: &[(&[i64], &[f32])],
    idx: usize,
    rows: usize,
    cols: usize,
    kind: &str,
) -> Result<Array2<f32>> {
    let (shape, data) = outputs
        .get(idx)
        .ok_or_else(|| anyhow::anyhow!("Missing {} output at index {}", kind, idx))?;
    let matches = shape.len() == 3
        && shape[0] == 1
        && usize::try_from(shape[1]).ok() == Some(rows)
        && usize::try_from(shape[2]).ok() == Some(cols);
    if !matches {
        anyhow::bail!(
            "Unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
            kind,
            idx,
            shape,
            rows,
            cols
        );
    }
    Ok(Array2::from_shape_vec((rows, cols), data.to_vec())?)
}

/// Split the twelve raw YuNet tensors into one head per stride.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<StrideHead>> {
    let n = STRIDES.len();
    let mut heads = Vec::with_capacity(n);
    for (k, &stride) in STRIDES.iter().enumerate() {
        let grid = input_size / stride;
        let cells = grid * grid;

        let cls = tensor(outputs, k, cells, 1, "cls")?;
        let obj = tensor(outputs, k + n, cells, 1, "obj")?;
        let bbox = tensor(outputs, k + 2 * n, cells, 4, "bbox")?;
        let kps = tensor(outputs, k + 3 * n, cells, 10, "kps")?;

        let scores = cls
            .iter()
            .zip(obj.iter())
            .map(|(c, o)| (c.clamp(0.0, 1.0) * o.clamp(0.0, 1.0)).sqrt())
            .collect();

        heads.push(StrideHead {
            stride,
            grid,
            scores,
            bbox,
            kps,
        });
    }
    Ok(heads)
}

/// Decode every cell scoring at least `score_threshold`.
pub fn decode(heads: &[StrideHead], score_threshold: f32) -> Vec<RawDetection> {
    let mut detections = Vec::new();

    for head in heads {
        let s = head.stride as f32;
        for (idx, &score) in head.scores.iter().enumerate() {
            if score < score_threshold {
                continue;
            }
            let row = (idx / head.grid) as f32;
            let col = (idx % head.grid) as f32;

            let cx = (col + head.bbox[[idx, 0]]) * s;
            let cy = (row + head.bbox[[idx, 1]]) * s;
            let w = head.bbox[[idx, 2]].exp() * s;
            let h = head.bbox[[idx, 3]].exp() * s;

            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = (col + head.kps[[idx, k * 2]]) * s;
                landmarks[k * 2 + 1] = (row + head.kps[[idx, k * 2 + 1]]) * s;
            }

            detections.push(RawDetection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_outputs(input_size: usize) -> Vec<(Vec<i64>, Vec<f32>)> {
        let mut outputs = Vec::new();
        for cols in [1usize, 1, 4, 10] {
            for &stride in STRIDES.iter() {
                let grid = input_size / stride;
                let cells = grid * grid;
                outputs.push((
                    vec![1, cells as i64, cols as i64],
                    vec![0.25; cells * cols],
                ));
            }
        }
        outputs
    }

    #[test]
    fn decode_single_cell() {
        let mut heads: Vec<StrideHead> =
            STRIDES.iter().map(|&s| StrideHead::empty(s, 640)).collect();

        let head = &mut heads[2];
        assert_eq!(head.grid, 20);
        let idx = 10 * head.grid + 10;
        head.scores[idx] = 0.9;
        head.bbox[[idx, 0]] = 0.5;
        head.bbox[[idx, 1]] = 0.3;
        head.bbox[[idx, 2]] = 4.0f32.ln();
        head.bbox[[idx, 3]] = 4.0f32.ln();

        let detections = decode(&heads, 0.5);
        assert_eq!(detections.len(), 1);
        let det = &detections[0];

        // cx = 10.5 * 32 = 336, cy = 10.3 * 32 = 329.6, w = h = 4 * 32 = 128
        assert!((det.bbox[0] - 272.0).abs() < 1e-3);
        assert!((det.bbox[1] - 265.6).abs() < 1e-3);
        assert!((det.bbox[2] - 128.0).abs() < 1e-3);
        assert!((det.bbox[3] - 128.0).abs() < 1e-3);
        assert!((det.score - 0.9).abs() < 1e-6);

        // zero landmark offset lands on the cell corner
        assert!((det.landmarks[0] - 320.0).abs() < 1e-3);
        assert!((det.landmarks[1] - 320.0).abs() < 1e-3);
    }

    #[test]
    fn below_threshold_is_dropped() {
        let heads: Vec<StrideHead> = STRIDES.iter().map(|&s| StrideHead::empty(s, 64)).collect();
        assert!(decode(&heads, 0.1).is_empty());
    }

    #[test]
    fn parse_fuses_cls_and_obj() {
        let owned = synthetic_outputs(64);
        let refs: Vec<(&[i64], &[f32])> = owned
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let heads = parse_outputs(&refs, 64).unwrap();
        assert_eq!(heads.len(), 3);
        assert_eq!(heads[0].grid, 8);
        assert_eq!(heads[2].grid, 2);
        // sqrt(0.25 * 0.25)
        assert!(heads[1].scores.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        let mut owned = synthetic_outputs(64);
        owned[7].0 = vec![1, 16, 5];
        let refs: Vec<(&[i64], &[f32])> = owned
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let err = parse_outputs(&refs, 64).unwrap_err();
        assert!(err.to_string().contains("bbox"));
    }

    #[test]
    fn parse_rejects_missing_outputs() {
        let owned = synthetic_outputs(64);
        let refs: Vec<(&[i64], &[f32])> = owned
            .iter()
            .take(5)
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();
        assert!(parse_outputs(&refs, 64).is_err());
    }
}
