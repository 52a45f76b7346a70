use crate::store::domain::records::{PersonId, PersonRecord};

/// Maximum embedding distance accepted as "same person", in the embedding
/// space's native units. Tunable per run; this is only the default.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.55;

/// Distance reported when no persons are known. Matches the threshold's
/// unit scale so an empty matcher behaves like a maximally-distant match.
pub const UNKNOWN_DISTANCE: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub person_id: PersonId,
    pub distance: f64,
}

/// Result of applying the confidence threshold to a nearest-neighbor lookup.
///
/// `Unknown` covers both "no persons known" and "best match too far": the
/// caller treats them identically and registers a new identity.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Known(Match),
    Unknown { distance: f64 },
}

/// In-memory nearest-neighbor classifier over known persons' descriptors.
///
/// A derived, disposable projection of the store's person table: rebuilt
/// from [`PersonRecord`]s at startup and extended incrementally as new
/// persons are learned. Additions are visible to the very next `classify`
/// call; there is no staleness window.
///
/// Lookup is a linear scan, O(persons x descriptors-per-person) per query.
/// Fine at the intended scale (hundreds to low thousands of persons); an
/// indexed structure would be the first thing to revisit beyond that.
pub struct IdentityMatcher {
    entries: Vec<Entry>,
    threshold: f64,
}

struct Entry {
    person_id: PersonId,
    descriptors: Vec<Vec<f32>>,
}

impl IdentityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
        }
    }

    /// Rebuild from the store's person table.
    pub fn seed(persons: &[PersonRecord], threshold: f64) -> Self {
        let entries = persons
            .iter()
            .map(|p| Entry {
                person_id: p.id,
                descriptors: p.descriptors.clone(),
            })
            .collect();
        Self { entries, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a newly created person. Takes effect immediately.
    ///
    /// If the person is already present the descriptor is appended as an
    /// additional reference vector instead.
    pub fn add_person(&mut self, person_id: PersonId, descriptor: Vec<f32>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.person_id == person_id) {
            entry.descriptors.push(descriptor);
        } else {
            self.entries.push(Entry {
                person_id,
                descriptors: vec![descriptor],
            });
        }
    }

    /// Drop a person from the projection. Used to undo matcher additions
    /// when the store transaction that created them rolls back.
    pub fn remove_person(&mut self, person_id: PersonId) {
        self.entries.retain(|e| e.person_id != person_id);
    }

    /// Nearest known person by minimum Euclidean distance over any of their
    /// reference descriptors. `None` when no persons are known.
    pub fn best_match(&self, query: &[f32]) -> Option<Match> {
        let mut best: Option<Match> = None;
        for entry in &self.entries {
            for descriptor in &entry.descriptors {
                let distance = euclidean_distance(query, descriptor);
                if best.as_ref().map_or(true, |b| distance < b.distance) {
                    best = Some(Match {
                        person_id: entry.person_id,
                        distance,
                    });
                }
            }
        }
        best
    }

    /// Apply the confidence policy: a match is accepted only when its
    /// distance is strictly below the threshold.
    pub fn classify(&self, query: &[f32]) -> Decision {
        match self.best_match(query) {
            Some(m) if m.distance < self.threshold => Decision::Known(m),
            Some(m) => Decision::Unknown {
                distance: m.distance,
            },
            None => Decision::Unknown {
                distance: UNKNOWN_DISTANCE,
            },
        }
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "descriptor dimensions must agree");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
