pub const DETECTOR_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const DETECTOR_MODEL_URL: &str =
    "https://github.com/faceindex/faceindex/releases/download/v0.1.0/blazeface_short_range.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/faceindex/faceindex/releases/download/v0.1.0/w600k_r50.onnx";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Default face detection confidence threshold.
pub const DEFAULT_DETECTOR_CONFIDENCE: f64 = 0.5;
