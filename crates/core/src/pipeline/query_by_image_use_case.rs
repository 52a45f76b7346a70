use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::detection::domain::face_detector::FaceDetector;
use crate::imaging::domain::image_reader::ImageReader;
use crate::matching::identity_matcher::Decision;
use crate::pipeline::identity_context::IdentityContext;
use crate::store::domain::embedding_store::StoreError;
use crate::store::domain::records::{Appearance, PersonId};

/// A recognized person together with every indexed image they appear in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonMatch {
    pub person_id: PersonId,
    /// Distance of this query's closest face to the person. Lower is more
    /// confident.
    pub distance: f64,
    pub appearances: Vec<Appearance>,
}

/// Result of querying an image against the indexed identities.
///
/// The empty-ish cases are distinct on purpose: "the database is empty",
/// "the query image has no face", and "it has faces but none we know"
/// call for different user guidance.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    NothingIndexed,
    NoFaceFound,
    NoConfidentMatch,
    Matches { matches: Vec<PersonMatch> },
}

/// Resolves the faces in one image against the known persons and gathers
/// where else each matched person appears.
///
/// Read-only: a query never creates persons, never records the query
/// image, and leaves the matcher untouched.
pub struct QueryByImageUseCase {
    reader: Box<dyn ImageReader>,
    detector: Box<dyn FaceDetector>,
}

impl QueryByImageUseCase {
    pub fn new(reader: Box<dyn ImageReader>, detector: Box<dyn FaceDetector>) -> Self {
        Self { reader, detector }
    }

    pub fn execute(
        &mut self,
        context: &IdentityContext,
        image: &Path,
    ) -> Result<QueryOutcome, Box<dyn std::error::Error>> {
        if context.matcher().is_empty() {
            return Ok(QueryOutcome::NothingIndexed);
        }

        let frame = self.reader.read(image)?;
        let observations = self.detector.detect(&frame)?;
        if observations.is_empty() {
            return Ok(QueryOutcome::NoFaceFound);
        }

        let embeddings: Vec<Vec<f32>> = observations.into_iter().map(|o| o.embedding).collect();
        let matches = resolve_embeddings(context, &embeddings)?;
        if matches.is_empty() {
            return Ok(QueryOutcome::NoConfidentMatch);
        }
        Ok(QueryOutcome::Matches { matches })
    }
}

/// Match each embedding against the known persons and collect confident
/// hits, one entry per person.
///
/// Several query faces can resolve to the same person (group photos of
/// twins, re-detections); only the closest face's distance is kept.
/// Results are ordered most confident first.
pub fn resolve_embeddings(
    context: &IdentityContext,
    embeddings: &[Vec<f32>],
) -> Result<Vec<PersonMatch>, StoreError> {
    let mut best_by_person: HashMap<PersonId, f64> = HashMap::new();
    for embedding in embeddings {
        if let Decision::Known(m) = context.matcher().classify(embedding) {
            best_by_person
                .entry(m.person_id)
                .and_modify(|d| *d = d.min(m.distance))
                .or_insert(m.distance);
        }
    }

    let mut matches = Vec::with_capacity(best_by_person.len());
    for (person_id, distance) in best_by_person {
        let appearances = context.store().detections_for_person(person_id)?;
        matches.push(PersonMatch {
            person_id,
            distance,
            appearances,
        });
    }
    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::detection::domain::face_observation::FaceObservation;
    use crate::matching::identity_matcher::DEFAULT_MATCH_THRESHOLD;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::frame::Frame;
    use crate::store::domain::embedding_store::EmbeddingStore;
    use crate::store::infrastructure::sqlite_store::SqliteStore;

    // --- Stubs ---

    struct StubReader;

    impl ImageReader for StubReader {
        fn read(&self, _path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
            Ok(Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3))
        }
    }

    struct StubDetector {
        results: VecDeque<Vec<FaceObservation>>,
    }

    impl StubDetector {
        fn returning(observations: Vec<FaceObservation>) -> Self {
            Self {
                results: VecDeque::from(vec![observations]),
            }
        }
    }

    impl FaceDetector for StubDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
        ) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>> {
            Ok(self.results.pop_front().unwrap_or_default())
        }
    }

    fn face(embedding: Vec<f32>) -> FaceObservation {
        FaceObservation {
            bounding_box: BoundingBox::new(0.0, 0.0, 5.0, 5.0),
            embedding,
        }
    }

    /// Context with one person per descriptor, each appearing once in
    /// an image named after their id.
    fn indexed_context(descriptors: &[Vec<f32>]) -> IdentityContext {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for d in descriptors {
            let person = store.create_person(d).unwrap();
            let image = store
                .record_image(&format!("/photos/person{person}.jpg"))
                .unwrap();
            store
                .record_detection(person, image, &BoundingBox::new(0.0, 0.0, 5.0, 5.0))
                .unwrap();
        }
        IdentityContext::load(Box::new(store), DEFAULT_MATCH_THRESHOLD).unwrap()
    }

    fn query(ctx: &IdentityContext, observations: Vec<FaceObservation>) -> QueryOutcome {
        let mut use_case = QueryByImageUseCase::new(
            Box::new(StubReader),
            Box::new(StubDetector::returning(observations)),
        );
        use_case.execute(ctx, Path::new("/query.jpg")).unwrap()
    }

    // --- Tests ---

    #[test]
    fn test_empty_database_reports_nothing_indexed() {
        let ctx = indexed_context(&[]);
        let outcome = query(&ctx, vec![face(vec![0.0, 0.0])]);
        assert_eq!(outcome, QueryOutcome::NothingIndexed);
    }

    #[test]
    fn test_faceless_image_reports_no_face_found() {
        let ctx = indexed_context(&[vec![0.0, 0.0]]);
        let outcome = query(&ctx, vec![]);
        assert_eq!(outcome, QueryOutcome::NoFaceFound);
    }

    #[test]
    fn test_distant_face_reports_no_confident_match() {
        let ctx = indexed_context(&[vec![0.0, 0.0]]);
        let outcome = query(&ctx, vec![face(vec![0.9, 0.0])]);
        assert_eq!(outcome, QueryOutcome::NoConfidentMatch);
    }

    #[test]
    fn test_match_includes_appearances() {
        let ctx = indexed_context(&[vec![0.0, 0.0]]);
        let outcome = query(&ctx, vec![face(vec![0.05, 0.0])]);

        match outcome {
            QueryOutcome::Matches { matches } => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0].person_id, 1);
                assert!((matches[0].distance - 0.05).abs() < 1e-6);
                assert_eq!(matches[0].appearances.len(), 1);
                assert_eq!(matches[0].appearances[0].image_path, "/photos/person1.jpg");
            }
            other => panic!("expected Matches, got {other:?}"),
        }
    }

    #[test]
    fn test_two_faces_of_same_person_are_deduplicated() {
        let ctx = indexed_context(&[vec![0.0, 0.0]]);
        let outcome = query(
            &ctx,
            vec![face(vec![0.2, 0.0]), face(vec![0.05, 0.0])],
        );

        match outcome {
            QueryOutcome::Matches { matches } => {
                assert_eq!(matches.len(), 1);
                // Closest face wins
                assert!((matches[0].distance - 0.05).abs() < 1e-6);
            }
            other => panic!("expected Matches, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_persons_sorted_by_confidence() {
        let ctx = indexed_context(&[vec![0.0, 0.0], vec![10.0, 0.0]]);
        let outcome = query(
            &ctx,
            vec![face(vec![0.3, 0.0]), face(vec![10.05, 0.0])],
        );

        match outcome {
            QueryOutcome::Matches { matches } => {
                assert_eq!(matches.len(), 2);
                assert_eq!(matches[0].person_id, 2);
                assert_eq!(matches[1].person_id, 1);
                assert!(matches[0].distance < matches[1].distance);
            }
            other => panic!("expected Matches, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_known_and_unknown_faces_reports_only_known() {
        let ctx = indexed_context(&[vec![0.0, 0.0]]);
        let outcome = query(
            &ctx,
            vec![face(vec![0.05, 0.0]), face(vec![5.0, 5.0])],
        );

        match outcome {
            QueryOutcome::Matches { matches } => assert_eq!(matches.len(), 1),
            other => panic!("expected Matches, got {other:?}"),
        }
    }

    #[test]
    fn test_query_does_not_mutate_the_database() {
        let ctx = indexed_context(&[vec![0.0, 0.0]]);
        let before = ctx.stats().unwrap();
        let _ = query(&ctx, vec![face(vec![0.9, 0.0])]);
        assert_eq!(ctx.stats().unwrap(), before);
        assert_eq!(ctx.matcher().len(), 1);
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_string(&QueryOutcome::NoConfidentMatch).unwrap();
        assert!(json.contains("no_confident_match"));
    }
}
