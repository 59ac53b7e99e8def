//! User and letter-type records stored as JSONB, normalised on read.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use super::map_store_error;
use crate::workflow::{
    IdentityDirectory, LetterType, LetterTypeDirectory, PersonProfile, StoreError,
};

pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn record(&self, sql: &str, id: &str) -> Result<Option<Value>, StoreError> {
        sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl IdentityDirectory for PgDirectory {
    async fn find_person(&self, id: &str) -> Result<Option<PersonProfile>, StoreError> {
        let record = self.record("SELECT data FROM users WHERE id = $1", id).await?;
        Ok(record.map(|r| PersonProfile::from_record(id, &r)))
    }
}

#[async_trait]
impl LetterTypeDirectory for PgDirectory {
    async fn find_letter_type(&self, code: &str) -> Result<Option<LetterType>, StoreError> {
        let record = self
            .record("SELECT data FROM letter_types WHERE id = $1", code)
            .await?;
        Ok(record.map(|r| LetterType::from_record(code, &r)))
    }
}
