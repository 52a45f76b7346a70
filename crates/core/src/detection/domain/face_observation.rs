use crate::shared::bounding_box::BoundingBox;

/// One detected face: where it is in the image and its embedding.
///
/// Embeddings are fixed-length for a given model; distance between two
/// embeddings approximates identity similarity.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceObservation {
    pub bounding_box: BoundingBox,
    pub embedding: Vec<f32>,
}
