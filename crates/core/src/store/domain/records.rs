use serde::Serialize;

use crate::shared::bounding_box::BoundingBox;

/// Row ids are SQLite rowids: stable, monotonically assigned.
pub type PersonId = i64;
pub type ImageId = i64;
pub type DetectionId = i64;

/// A known person as persisted: id plus reference descriptors.
///
/// The baseline policy stores exactly one descriptor per person (the one
/// from the detection that created them), but the record carries a list so
/// the matcher's multi-descriptor semantics have a single source of truth.
#[derive(Clone, Debug, PartialEq)]
pub struct PersonRecord {
    pub id: PersonId,
    pub descriptors: Vec<Vec<f32>>,
}

/// One recorded appearance of a person: the image it was found in and
/// where in that image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Appearance {
    pub image_path: String,
    pub bounding_box: BoundingBox,
}

/// Row counts, used for CLI reporting and test assertions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub persons: u64,
    pub images: u64,
    pub detections: u64,
}
