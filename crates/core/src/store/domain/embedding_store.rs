use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::store::domain::records::{
    Appearance, DetectionId, ImageId, PersonId, PersonRecord, StoreStats,
};

#[derive(Error, Debug)]
pub enum StoreError {
    /// Disk/IO failure on the persistence layer. Fatal to the current
    /// operation; nothing is partially committed.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
    /// A detection referenced a person or image id that does not exist.
    /// Callers only pass ids they just obtained, so this indicates a
    /// pipeline ordering bug rather than a recoverable condition.
    #[error("detection references unknown person {person} or image {image}")]
    Referential { person: PersonId, image: ImageId },
    /// A persisted descriptor could not be encoded or decoded.
    #[error("descriptor serialization failed: {0}")]
    Descriptor(#[from] serde_json::Error),
}

/// Durable persistence for persons, images, and detections.
///
/// Append-only from the core's point of view: rows are never mutated and
/// only `reset_schema` deletes anything. The matcher holds a disposable
/// in-memory projection of the person table; this trait is the source of
/// truth it is rebuilt from.
pub trait EmbeddingStore {
    /// Record an image path, returning the existing id if the path is
    /// already known. Duplicate paths are a no-op, not an error.
    fn record_image(&mut self, path: &str) -> Result<ImageId, StoreError>;

    /// Insert a new person with a single reference descriptor.
    fn create_person(&mut self, descriptor: &[f32]) -> Result<PersonId, StoreError>;

    /// Insert one detection row linking a person to an image.
    fn record_detection(
        &mut self,
        person: PersonId,
        image: ImageId,
        bounds: &BoundingBox,
    ) -> Result<DetectionId, StoreError>;

    /// Whether this path has been examined before (used to skip reprocessing).
    fn is_image_indexed(&self, path: &str) -> Result<bool, StoreError>;

    /// All persons in ascending id order; seeds the matcher.
    fn list_persons(&self) -> Result<Vec<PersonRecord>, StoreError>;

    /// Every recorded appearance of one person.
    fn detections_for_person(&self, person: PersonId) -> Result<Vec<Appearance>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Destructive: drops and recreates all tables. Never called during
    /// startup or mid-run; only an explicit reset operation may invoke it.
    fn reset_schema(&mut self) -> Result<(), StoreError>;

    /// Run `f` atomically: either every write inside it lands or none do.
    /// One indexed image (image row, any new persons, all detections) is
    /// committed as a single batch so a crash never leaves a partially
    /// recorded image.
    fn in_transaction(
        &mut self,
        f: &mut dyn FnMut(&mut dyn EmbeddingStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}
