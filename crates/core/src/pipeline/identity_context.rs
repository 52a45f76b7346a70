use crate::matching::identity_matcher::IdentityMatcher;
use crate::store::domain::embedding_store::{EmbeddingStore, StoreError};
use crate::store::domain::records::StoreStats;

/// Owns the store and its in-memory matcher projection, and keeps the two
/// consistent: every person in the store is in the matcher and vice versa.
///
/// There is exactly one of these per open database. Use cases borrow it;
/// nothing is shared globally.
pub struct IdentityContext {
    store: Box<dyn EmbeddingStore>,
    matcher: IdentityMatcher,
}

impl IdentityContext {
    /// Open a context over an existing store, seeding the matcher from
    /// the persisted person table.
    pub fn load(store: Box<dyn EmbeddingStore>, threshold: f64) -> Result<Self, StoreError> {
        let persons = store.list_persons()?;
        let matcher = IdentityMatcher::seed(&persons, threshold);
        log::debug!("Loaded {} known persons into matcher", matcher.len());
        Ok(Self { store, matcher })
    }

    pub fn store(&self) -> &dyn EmbeddingStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn EmbeddingStore {
        self.store.as_mut()
    }

    pub fn matcher(&self) -> &IdentityMatcher {
        &self.matcher
    }

    /// Borrow store and matcher together. Needed when a transaction has to
    /// update both sides at once.
    pub fn parts_mut(&mut self) -> (&mut dyn EmbeddingStore, &mut IdentityMatcher) {
        (self.store.as_mut(), &mut self.matcher)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats()
    }

    /// Destructive: wipe all persisted data and the matcher projection.
    /// Only ever invoked by an explicit reset operation.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.store.reset_schema()?;
        let threshold = self.matcher.threshold();
        self.matcher = IdentityMatcher::new(threshold);
        log::warn!("Identity database reset: all persons, images, and detections dropped");
        Ok(())
    }
}
