//! Persistence seams for letters and sequence counters.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::numbering::CounterKey;
use super::StoreError;
use crate::letter::models::LetterDraft;

/// Transactional read-increment-write of one integer per key.
///
/// A single call is one attempt: implementations either commit `previous + 1`
/// and return it, or fail with `StoreError::Conflict` having written nothing.
/// Retrying is the caller's job.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn try_increment(&self, key: &CounterKey) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait LetterRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<LetterDraft>, StoreError>;
    async fn save(&self, letter: &LetterDraft) -> Result<(), StoreError>;
}

/// Counter store kept in process memory.
///
/// Each attempt reads a versioned value, yields to the scheduler, then commits
/// only if the version is unchanged, so concurrent callers observe
/// `Conflict` the same way they would against a serializable database.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<String, (u64, u64)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, key: &CounterKey) -> u64 {
        self.counters
            .read()
            .get(&key.id())
            .map(|(value, _)| *value)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn try_increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let id = key.id();
        let (value, version) = self.counters.read().get(&id).copied().unwrap_or((0, 0));

        tokio::task::yield_now().await;

        let mut counters = self.counters.write();
        let current_version = counters.get(&id).map(|(_, v)| *v).unwrap_or(0);
        if current_version != version {
            return Err(StoreError::Conflict);
        }
        let next = value + 1;
        counters.insert(id, (next, version + 1));
        Ok(next)
    }
}

#[derive(Default)]
pub struct InMemoryLetterRepository {
    letters: RwLock<HashMap<String, LetterDraft>>,
}

impl InMemoryLetterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.letters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.read().is_empty()
    }
}

#[async_trait]
impl LetterRepository for InMemoryLetterRepository {
    async fn get(&self, id: &str) -> Result<Option<LetterDraft>, StoreError> {
        Ok(self.letters.read().get(id).cloned())
    }

    async fn save(&self, letter: &LetterDraft) -> Result<(), StoreError> {
        self.letters
            .write()
            .insert(letter.id.clone(), letter.clone());
        Ok(())
    }
}
