//! The persistence seam used by the crawler.

use async_trait::async_trait;

use crate::data::models::{CourseWrite, NewSubject, Period, StoredCourse, Term};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Point lookups, atomic get-or-create upserts and a transactional course write.
///
/// Implementations are expected to surface every failure as a [`StoreError`]
/// and to roll back whatever the failing call had started; nothing outside
/// the call's own transaction is undone.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find_term(&self, year: i32, period: Period) -> Result<Option<Term>, StoreError>;

    /// Insert the term, returning the existing row if another run created it first.
    async fn create_term(&self, year: i32, period: Period) -> Result<Term, StoreError>;

    async fn find_subject_id(&self, code: &str) -> Result<Option<i32>, StoreError>;

    async fn upsert_subject(&self, subject: &NewSubject) -> Result<i32, StoreError>;

    async fn get_or_create_campus(&self, name: &str) -> Result<i32, StoreError>;

    async fn get_or_create_teacher(&self, name: &str) -> Result<i32, StoreError>;

    async fn find_course(
        &self,
        term_id: i32,
        subject_code: &str,
        section: i32,
    ) -> Result<Option<StoredCourse>, StoreError>;

    /// Upsert the course row, apply teacher changes and (optionally) replace
    /// its schedule slots, all in one transaction. Returns the course id.
    async fn save_course(&self, write: &CourseWrite) -> Result<i32, StoreError>;
}
