use crate::detection::domain::face_observation::FaceObservation;
use crate::shared::frame::Frame;

/// Domain interface for face detection plus embedding extraction.
///
/// Produces zero or more observations per frame; order is not
/// semantically significant. Implementations may be stateful
/// (e.g. lazily loaded model sessions), hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>>;
}
