use std::path::{Path, PathBuf};

use crate::detection::domain::face_detector::FaceDetector;
use crate::imaging::domain::image_reader::ImageReader;
use crate::matching::identity_matcher::Decision;
use crate::pipeline::identity_context::IdentityContext;
use crate::pipeline::index_reporter::{IndexEvent, IndexReporter};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::store::domain::records::PersonId;

/// Counters for one indexing run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub images_seen: usize,
    pub images_indexed: usize,
    pub images_skipped: usize,
    pub images_failed: usize,
    pub faces_found: usize,
    pub persons_created: usize,
}

/// Walks a folder of images, resolving every detected face to a known or
/// newly created person and persisting the results.
///
/// Each image commits atomically: its row, any persons it introduced, and
/// all its detections land together or not at all. Images that fail to
/// decode or detect are reported and skipped; the run continues. Storage
/// failures abort the run since nothing further can be persisted.
pub struct IndexFolderUseCase {
    reader: Box<dyn ImageReader>,
    detector: Box<dyn FaceDetector>,
}

impl IndexFolderUseCase {
    pub fn new(reader: Box<dyn ImageReader>, detector: Box<dyn FaceDetector>) -> Self {
        Self { reader, detector }
    }

    pub fn execute(
        &mut self,
        context: &mut IdentityContext,
        folder: &Path,
        reporter: &mut dyn IndexReporter,
    ) -> Result<IndexSummary, Box<dyn std::error::Error>> {
        let paths = list_images(folder)?;
        reporter.report(IndexEvent::Started { total: paths.len() });

        let mut summary = IndexSummary {
            images_seen: paths.len(),
            ..IndexSummary::default()
        };

        for path in paths {
            let path_str = path.to_string_lossy().to_string();

            if context.store().is_image_indexed(&path_str)? {
                summary.images_skipped += 1;
                reporter.report(IndexEvent::Skipped { path: path_str });
                continue;
            }

            let frame = match self.reader.read(&path) {
                Ok(frame) => frame,
                Err(e) => {
                    summary.images_failed += 1;
                    reporter.report(IndexEvent::Failed {
                        path: path_str,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let observations = match self.detector.detect(&frame) {
                Ok(observations) => observations,
                Err(e) => {
                    summary.images_failed += 1;
                    reporter.report(IndexEvent::Failed {
                        path: path_str,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            // New persons become matchable for the rest of this image and
            // all later ones; on rollback they are withdrawn again so the
            // matcher never references a person the store does not have.
            let (store, matcher) = context.parts_mut();
            let mut created: Vec<PersonId> = Vec::new();

            let committed = store.in_transaction(&mut |store| {
                let image_id = store.record_image(&path_str)?;
                for obs in &observations {
                    let person_id = match matcher.classify(&obs.embedding) {
                        Decision::Known(m) => {
                            log::debug!(
                                "Matched face to person {} (distance {:.3})",
                                m.person_id,
                                m.distance
                            );
                            m.person_id
                        }
                        Decision::Unknown { distance } => {
                            let id = store.create_person(&obs.embedding)?;
                            matcher.add_person(id, obs.embedding.clone());
                            created.push(id);
                            log::debug!(
                                "New person {id} (nearest known at distance {distance:.3})"
                            );
                            id
                        }
                    };
                    store.record_detection(person_id, image_id, &obs.bounding_box)?;
                }
                Ok(())
            });

            if let Err(e) = committed {
                for id in created {
                    matcher.remove_person(id);
                }
                return Err(e.into());
            }

            summary.images_indexed += 1;
            summary.faces_found += observations.len();
            summary.persons_created += created.len();
            reporter.report(IndexEvent::Indexed {
                path: path_str,
                faces: observations.len(),
                new_persons: created.len(),
            });
        }

        Ok(summary)
    }
}

/// Image files directly inside `folder`, sorted by path for a stable
/// processing order. Subdirectories and non-image files are ignored.
fn list_images(folder: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
