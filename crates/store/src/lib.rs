//! Idempotent persistence of enriched submissions.

pub mod error;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use newswire_core::Submission;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Upsert-by-id storage for submissions.
///
/// Saving the same id again only refreshes `score` and `sentiment`; the other
/// columns keep their first-written values.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn save_post(&self, post: &Submission) -> Result<(), StoreError>;

    /// Stored row for `id`. Topics are not persisted and come back empty.
    async fn get_post(&self, id: &str) -> Result<Option<Submission>, StoreError>;
}

#[async_trait]
impl<T: PostStore + ?Sized> PostStore for Arc<T> {
    async fn save_post(&self, post: &Submission) -> Result<(), StoreError> {
        (**self).save_post(post).await
    }

    async fn get_post(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        (**self).get_post(id).await
    }
}
