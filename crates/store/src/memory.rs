use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use newswire_core::Submission;

use crate::error::StoreError;
use crate::PostStore;

/// In-process table with the same upsert rules as [`crate::PgStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<String, Submission>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &str) -> Option<Submission> {
        self.rows().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn save_post(&self, post: &Submission) -> Result<(), StoreError> {
        let mut rows = self.rows();
        match rows.get_mut(&post.id) {
            Some(existing) => {
                existing.score = post.score;
                existing.sentiment = post.sentiment;
            }
            None => {
                let mut row = post.clone();
                row.topics.clear();
                rows.insert(post.id.clone(), row);
            }
        }
        Ok(())
    }

    async fn get_post(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(self.get(id))
    }
}
