use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array2, Array4};
use ort::{session::Session, value::Value};

/// YuNet runs on a fixed square canvas.
pub const DETECTOR_INPUT: u32 = 640;
/// SFace input side.
pub const ALIGNED_SIZE: u32 = 112;

/// Reference eye centres in the 112x112 SFace crop, image-left eye first.
const REF_EYES: [(f32, f32); 2] = [(38.2946, 51.6963), (73.5318, 51.5014)];

/// Detection result from YuNet, in source image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    /// right eye, left eye, nose tip, right mouth corner, left mouth corner
    /// (subject's sides), as x,y pairs.
    pub landmarks: [f32; 10],
}

impl Detection {
    /// Subject's right eye (appears on the image left).
    pub fn right_eye(&self) -> (f32, f32) {
        (self.landmarks[0], self.landmarks[1])
    }

    /// Subject's left eye (appears on the image right).
    pub fn left_eye(&self) -> (f32, f32) {
        (self.landmarks[2], self.landmarks[3])
    }
}

/// Face embedding (SFace output), L2-normalised.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Array2<f32>,
}

impl Embedding {
    pub fn from_vec(values: Vec<f32>) -> Self {
        let len = values.len();
        let vector = Array2::from_shape_vec((1, len), values)
            .unwrap_or_else(|_| Array2::zeros((1, len)));
        Self { vector }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.iter().copied().collect()
    }
}

/// Aspect-preserving fit of the source image into the detector canvas.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> (Self, u32, u32) {
        let max_dim = width.max(height).max(1);
        let scale = target as f32 / max_dim as f32;
        let new_w = ((width as f32 * scale) as u32).clamp(1, target);
        let new_h = ((height as f32 * scale) as u32).clamp(1, target);
        let lb = Letterbox {
            scale,
            offset_x: ((target - new_w) / 2) as f32,
            offset_y: ((target - new_h) / 2) as f32,
        };
        (lb, new_w, new_h)
    }

    fn unmap_x(&self, x: f32) -> f32 {
        (x - self.offset_x) / self.scale
    }

    fn unmap_y(&self, y: f32) -> f32 {
        (y - self.offset_y) / self.scale
    }

    fn unmap(&self, raw: yunet::RawDetection) -> Detection {
        let mut landmarks = [0.0f32; 10];
        for k in 0..5 {
            landmarks[k * 2] = self.unmap_x(raw.landmarks[k * 2]);
            landmarks[k * 2 + 1] = self.unmap_y(raw.landmarks[k * 2 + 1]);
        }
        Detection {
            bbox: [
                self.unmap_x(raw.bbox[0]),
                self.unmap_y(raw.bbox[1]),
                raw.bbox[2] / self.scale,
                raw.bbox[3] / self.scale,
            ],
            score: raw.score,
            landmarks,
        }
    }
}

/// Planar BGR float tensor `[1, 3, H, W]` with values in [0, 255].
fn bgr_tensor(rgb: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = rgb.dimensions();
    let pixel_count = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];
    let (b_plane, rest) = data.split_at_mut(pixel_count);
    let (g_plane, r_plane) = rest.split_at_mut(pixel_count);

    for (i, px) in rgb.as_raw().chunks_exact(3).enumerate() {
        r_plane[i] = px[0] as f32;
        g_plane[i] = px[1] as f32;
        b_plane[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Detect faces in an image using YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (width, height) = img.dimensions();
    let (letterbox, new_w, new_h) = Letterbox::fit(width, height, DETECTOR_INPUT);

    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    image::imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.offset_x as i64,
        letterbox.offset_y as i64,
    );

    let input_tensor = Value::from_array(bgr_tensor(&canvas.to_rgb8())?)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        owned.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = owned
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let heads = yunet::parse_outputs(&refs, DETECTOR_INPUT as usize)?;
    let mut detections: Vec<Detection> = yunet::decode(&heads, score_threshold)
        .into_iter()
        .map(|raw| letterbox.unmap(raw))
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }
    log::debug!(
        "detected {} face(s) in {}x{} image",
        detections.len(),
        width,
        height
    );

    Ok(detections)
}

/// Highest-scoring detection, if any.
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Similarity transform `out = [a b; c d] * in + t` taking the detected eyes
/// onto the reference eye positions of a `size` crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl EyeTransform {
    pub fn from_detection(detection: &Detection, size: u32) -> Option<Self> {
        let unit = size as f32 / ALIGNED_SIZE as f32;
        let src_l = detection.right_eye();
        let src_r = detection.left_eye();
        let dst_l = (REF_EYES[0].0 * unit, REF_EYES[0].1 * unit);
        let dst_r = (REF_EYES[1].0 * unit, REF_EYES[1].1 * unit);

        let (sdx, sdy) = (src_r.0 - src_l.0, src_r.1 - src_l.1);
        let (ddx, ddy) = (dst_r.0 - dst_l.0, dst_r.1 - dst_l.1);
        let src_dist = (sdx * sdx + sdy * sdy).sqrt();
        if !src_dist.is_finite() || src_dist < f32::EPSILON {
            return None;
        }
        let dst_dist = (ddx * ddx + ddy * ddy).sqrt();
        let scale = dst_dist / src_dist;
        let angle = ddy.atan2(ddx) - sdy.atan2(sdx);
        let (sin, cos) = angle.sin_cos();

        let (a, b) = (scale * cos, -scale * sin);
        let (c, d) = (scale * sin, scale * cos);

        let src_mid = ((src_l.0 + src_r.0) / 2.0, (src_l.1 + src_r.1) / 2.0);
        let dst_mid = ((dst_l.0 + dst_r.0) / 2.0, (dst_l.1 + dst_r.1) / 2.0);
        Some(Self {
            a,
            b,
            c,
            d,
            tx: dst_mid.0 - (a * src_mid.0 + b * src_mid.1),
            ty: dst_mid.1 - (c * src_mid.0 + d * src_mid.1),
        })
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    pub fn invert(&self, x: f32, y: f32) -> (f32, f32) {
        let det = self.a * self.d - self.b * self.c;
        let (px, py) = (x - self.tx, y - self.ty);
        (
            (self.d * px - self.b * py) / det,
            (-self.c * px + self.a * py) / det,
        )
    }
}

fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Option<[u8; 3]> {
    let (w, h) = src.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for ch in 0..3 {
        let top = p00[ch] as f32 * (1.0 - fx) + p10[ch] as f32 * fx;
        let bottom = p01[ch] as f32 * (1.0 - fx) + p11[ch] as f32 * fx;
        out[ch] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

/// Align and crop face using the eye landmarks. Pixels mapping outside the
/// source stay black.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    let transform = EyeTransform::from_detection(detection, size)
        .ok_or_else(|| anyhow::anyhow!("degenerate eye landmarks"))?;
    let src = img.to_rgb8();
    let mut output = RgbImage::new(size, size);

    for (out_x, out_y, px) in output.enumerate_pixels_mut() {
        let (in_x, in_y) = transform.invert(out_x as f32, out_y as f32);
        if let Some(rgb) = sample_bilinear(&src, in_x, in_y) {
            *px = image::Rgb(rgb);
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Encode face image to embedding using SFace
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<Embedding> {
    let face_rgb = face_img
        .resize_exact(
            ALIGNED_SIZE,
            ALIGNED_SIZE,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();

    let input_tensor = Value::from_array(bgr_tensor(&face_rgb)?)?;
    let outputs = session.run(ort::inputs![input_tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting shape [1, 128]
    let embedding_size = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    if embedding_size == 0 || embedding_size > data.len() {
        anyhow::bail!(
            "unexpected embedding size {} for {} output values",
            embedding_size,
            data.len()
        );
    }

    let mut values: Vec<f32> = data[..embedding_size].to_vec();
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }

    Ok(Embedding::from_vec(values))
}

/// Cosine similarity between two embeddings, in [-1, 1]. Zero-norm inputs
/// compare as 0.
pub fn match_embedding(a: &Embedding, b: &Embedding) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.vector.iter().zip(b.vector.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
