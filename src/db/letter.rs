//! Letters stored as JSONB documents.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use super::map_store_error;
use crate::letter::models::LetterDraft;
use crate::workflow::{LetterRepository, StoreError};

pub struct PgLetterRepository {
    pool: PgPool,
}

impl PgLetterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LetterRepository for PgLetterRepository {
    async fn get(&self, id: &str) -> Result<Option<LetterDraft>, StoreError> {
        let row: Option<Value> = sqlx::query_scalar("SELECT data FROM letters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_store_error)?;

        row.map(|data| {
            serde_json::from_value(data)
                .map_err(|e| StoreError::Corrupt(format!("letter {id}: {e}")))
        })
        .transpose()
    }

    async fn save(&self, letter: &LetterDraft) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO letters (id, data, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(&letter.id)
        .bind(Json(letter))
        .execute(&self.pool)
        .await
        .map_err(map_store_error)?;
        Ok(())
    }
}
