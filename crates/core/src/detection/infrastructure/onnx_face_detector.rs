/// Face detection and embedding extraction using ONNX Runtime via `ort`.
///
/// Two-stage: a BlazeFace short-range model proposes face boxes, then an
/// ArcFace recognition model turns each cropped face into an L2-normalized
/// embedding. One detector instance owns both sessions.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_observation::FaceObservation;
use crate::detection::infrastructure::execution_provider::platform_execution_providers;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const DETECTOR_INPUT_SIZE: u32 = 128;

/// ArcFace model input resolution.
const EMBEDDER_INPUT_SIZE: usize = 112;

const EMBEDDER_NORM_MEAN: f32 = 127.5;
const EMBEDDER_NORM_STD: f32 = 127.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

pub struct OnnxFaceDetector {
    detector: ort::session::Session,
    embedder: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxFaceDetector {
    /// Load the BlazeFace and ArcFace ONNX models.
    pub fn new(
        detector_path: &Path,
        embedder_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let detector = ort::session::Session::builder()?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(detector_path)?;
        let embedder = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_inter_threads(1)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(embedder_path)?;
        let anchors = generate_anchors();
        Ok(Self {
            detector,
            embedder,
            confidence,
            anchors,
        })
    }

    fn detect_boxes(&mut self, frame: &Frame) -> Result<Vec<RawDet>, Box<dyn std::error::Error>> {
        let fw = frame.width();
        let fh = frame.height();

        let input_tensor = preprocess_detector(frame, DETECTOR_INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.detector.run(ort::inputs![input_value])?;

        // BlazeFace outputs two tensors:
        // - regressors: [1, 896, 16] (box deltas + keypoints)
        // - classificators: [1, 896, 1] (confidence scores)
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = Vec::new();
        let num_anchors = self.anchors.len().min(NUM_ANCHORS);

        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if score < self.confidence as f32 {
                continue;
            }

            let anchor = &self.anchors[i];
            let reg_offset = i * 16;
            if reg_offset + 4 > reg_data.len() {
                break;
            }

            // Decode box center + size relative to anchor
            let cx = anchor[0] + reg_data[reg_offset] / DETECTOR_INPUT_SIZE as f32;
            let cy = anchor[1] + reg_data[reg_offset + 1] / DETECTOR_INPUT_SIZE as f32;
            let w = reg_data[reg_offset + 2] / DETECTOR_INPUT_SIZE as f32;
            let h = reg_data[reg_offset + 3] / DETECTOR_INPUT_SIZE as f32;

            // Convert to original frame coordinates
            let x1 = ((cx - w / 2.0) * fw as f32).max(0.0);
            let y1 = ((cy - h / 2.0) * fh as f32).max(0.0);
            let x2 = ((cx + w / 2.0) * fw as f32).min(fw as f32);
            let y2 = ((cy + h / 2.0) * fh as f32).min(fh as f32);

            raw_dets.push(RawDet {
                x1: x1 as f64,
                y1: y1 as f64,
                x2: x2 as f64,
                y2: y2 as f64,
                score: score as f64,
            });
        }

        Ok(nms(&mut raw_dets, NMS_IOU_THRESH))
    }

    fn embed(&mut self, crop: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess_embedder(crop.data(), crop.width(), crop.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.embedder.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>> {
        let dets = self.detect_boxes(frame)?;

        let mut observations = Vec::with_capacity(dets.len());
        for det in dets {
            let bounding_box = BoundingBox::new(
                det.x1,
                det.y1,
                det.x2 - det.x1,
                det.y2 - det.y1,
            )
            .clamp_to(frame.width(), frame.height());

            if bounding_box.area() <= 0.0 {
                continue;
            }

            let crop = frame.crop(
                bounding_box.x as u32,
                bounding_box.y as u32,
                bounding_box.width.ceil() as u32,
                bounding_box.height.ceil() as u32,
            );
            if crop.data().is_empty() {
                continue;
            }

            let embedding = self.embed(&crop)?;
            observations.push(FaceObservation {
                bounding_box,
                embedding,
            });
        }

        Ok(observations)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess_detector(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Resize crop to 112x112, normalize to [-1,1], NCHW layout.
fn preprocess_embedder(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE));

    for y in 0..EMBEDDER_INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / EMBEDDER_INPUT_SIZE as f64) as usize)
            .min(src_h - 1);
        for x in 0..EMBEDDER_INPUT_SIZE {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / EMBEDDER_INPUT_SIZE as f64) as usize)
                .min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] =
                        (rgb_data[offset + c] as f32 - EMBEDDER_NORM_MEAN) / EMBEDDER_NORM_STD;
                }
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// Generate BlazeFace anchors for the short-range model.
///
/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = DETECTOR_INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            let iou = bbox_iou(&dets[i], &dets[j]);
            if iou > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_detector_shape() {
        let data = vec![128u8; 200 * 100 * 3];
        let frame = Frame::new(data, 200, 100, 3);
        let tensor = preprocess_detector(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
    }

    #[test]
    fn test_preprocess_detector_normalized() {
        let data = vec![255u8; 50 * 50 * 3];
        let frame = Frame::new(data, 50, 50, 3);
        let tensor = preprocess_detector(&frame, 128);
        // All source pixels are 255, so resized pixels should be ~1.0
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_embedder_shape() {
        let data = vec![128u8; 50 * 50 * 3];
        let tensor = preprocess_embedder(&data, 50, 50);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_embedder_normalization() {
        let data = vec![127u8; 10 * 10 * 3];
        let tensor = preprocess_embedder(&data, 10, 10);
        let val = tensor[[0, 0, 0, 0]];
        let expected = (127.0 - 127.5) / 127.5;
        assert!((val - expected).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_embedder_normalization_extremes() {
        let bright = vec![255u8; 10 * 10 * 3];
        let dark = vec![0u8; 10 * 10 * 3];
        assert!((preprocess_embedder(&bright, 10, 10)[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
        assert!((preprocess_embedder(&dark, 10, 10)[[0, 0, 0, 0]] - (-1.0)).abs() < 0.01);
    }

    #[test]
    fn test_generate_anchors_count() {
        let anchors = generate_anchors();
        // 16×16 grid × 2 anchors + 8×8 grid × 6 anchors = 512 + 384 = 896
        assert_eq!(anchors.len(), NUM_ANCHORS);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        let anchors = generate_anchors();
        for a in &anchors {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_sigmoid_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            RawDet {
                x1: 0.0,
                y1: 0.0,
                x2: 100.0,
                y2: 100.0,
                score: 0.9,
            },
            RawDet {
                x1: 5.0,
                y1: 5.0,
                x2: 105.0,
                y2: 105.0,
                score: 0.7,
            },
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_separate() {
        let mut dets = vec![
            RawDet {
                x1: 0.0,
                y1: 0.0,
                x2: 50.0,
                y2: 50.0,
                score: 0.9,
            },
            RawDet {
                x1: 200.0,
                y1: 200.0,
                x2: 250.0,
                y2: 250.0,
                score: 0.8,
            },
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
