/// Per-image progress events emitted while indexing a folder.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexEvent {
    /// Folder scan finished; `total` images will be considered.
    Started { total: usize },
    /// Image was already indexed and is not reprocessed.
    Skipped { path: String },
    /// Image examined and committed.
    Indexed {
        path: String,
        faces: usize,
        new_persons: usize,
    },
    /// Image could not be decoded or run through detection. The run
    /// continues with the next image.
    Failed { path: String, message: String },
}

/// Cross-cutting observer for indexing progress.
///
/// Decouples the use case from specific output mechanisms (stdout, log
/// crate, GUI) so each caller can watch a run without changing the
/// orchestration code.
pub trait IndexReporter: Send {
    fn report(&mut self, event: IndexEvent);
}

/// Silent reporter that discards all events. Used by tests where
/// progress output is irrelevant.
pub struct NullIndexReporter;

impl IndexReporter for NullIndexReporter {
    fn report(&mut self, _event: IndexEvent) {}
}

/// Reporter backed by the `log` crate. This is what the CLI installs.
pub struct LogIndexReporter;

impl IndexReporter for LogIndexReporter {
    fn report(&mut self, event: IndexEvent) {
        match event {
            IndexEvent::Started { total } => {
                log::info!("Indexing {total} images");
            }
            IndexEvent::Skipped { path } => {
                log::debug!("Skipping already indexed image: {path}");
            }
            IndexEvent::Indexed {
                path,
                faces,
                new_persons,
            } => {
                log::info!("Indexed {path}: {faces} faces, {new_persons} new persons");
            }
            IndexEvent::Failed { path, message } => {
                log::warn!("Failed to index {path}: {message}");
            }
        }
    }
}

/// Recording reporter for test assertions.
#[cfg(test)]
pub struct RecordingReporter {
    pub events: Vec<IndexEvent>,
}

#[cfg(test)]
impl RecordingReporter {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }
}

#[cfg(test)]
impl IndexReporter for RecordingReporter {
    fn report(&mut self, event: IndexEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_reporter_discards() {
        let mut reporter = NullIndexReporter;
        reporter.report(IndexEvent::Started { total: 3 });
        reporter.report(IndexEvent::Skipped {
            path: "a.jpg".into(),
        });
        // No panics = success
    }

    #[test]
    fn test_log_reporter_handles_all_events() {
        let mut reporter = LogIndexReporter;
        reporter.report(IndexEvent::Started { total: 1 });
        reporter.report(IndexEvent::Indexed {
            path: "a.jpg".into(),
            faces: 2,
            new_persons: 1,
        });
        reporter.report(IndexEvent::Failed {
            path: "b.jpg".into(),
            message: "decode error".into(),
        });
    }

    #[test]
    fn test_recording_reporter_keeps_order() {
        let mut reporter = RecordingReporter::new();
        reporter.report(IndexEvent::Started { total: 2 });
        reporter.report(IndexEvent::Skipped {
            path: "a.jpg".into(),
        });
        assert_eq!(reporter.events.len(), 2);
        assert_eq!(reporter.events[0], IndexEvent::Started { total: 2 });
    }
}
