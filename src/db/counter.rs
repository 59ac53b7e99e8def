//! PostgreSQL sequence counters.

use async_trait::async_trait;
use sqlx::PgPool;

use super::map_store_error;
use crate::workflow::{CounterKey, CounterStore, StoreError};

pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    /// One serializable read-increment-write. Serialization failures surface
    /// as `StoreError::Conflict` so the numbering engine retries the whole
    /// transaction.
    async fn try_increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let id = key.id();
        let mut tx = self.pool.begin().await.map_err(map_store_error)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_store_error)?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT last_number FROM letter_counters WHERE counter_id = $1")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_store_error)?;

        let next = current.unwrap_or(0) + 1;
        sqlx::query(
            r#"
            INSERT INTO letter_counters (counter_id, last_number, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (counter_id)
            DO UPDATE SET last_number = EXCLUDED.last_number, updated_at = NOW()
            "#,
        )
        .bind(&id)
        .bind(next)
        .execute(&mut *tx)
        .await
        .map_err(map_store_error)?;

        tx.commit().await.map_err(map_store_error)?;

        u64::try_from(next).map_err(|_| StoreError::Corrupt(format!("counter {id} is {next}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::NumberingEngine;
    use futures::future::join_all;
    use std::sync::Arc;

    #[tokio::test]
    #[ignore = "requires database connection"]
    async fn test_concurrent_increments_are_gapless() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::ensure_schema(&pool).await.unwrap();

        let key = CounterKey::new("TEST", &uuid::Uuid::new_v4().to_string(), "2025-2026");
        let engine = Arc::new(NumberingEngine::new(Arc::new(PgCounterStore::new(pool)), 64));

        let tasks = (0..10).map(|_| {
            let engine = engine.clone();
            let key = key.clone();
            tokio::spawn(async move { engine.next_sequence(&key).await.unwrap() })
        });
        let mut issued: Vec<u64> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
        issued.sort_unstable();
        assert_eq!(issued, (1..=10).collect::<Vec<_>>());
    }
}
