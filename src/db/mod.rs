//! Database module - AppState and the PostgreSQL adapters
//!
//! - `counter` - serializable read-increment-write of letter sequence counters
//! - `letter` - letters as JSONB documents
//! - `directory` - user and letter-type records

mod counter;
mod directory;
mod letter;

pub use counter::PgCounterStore;
pub use directory::PgDirectory;
pub use letter::PgLetterRepository;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::document::DocumentService;
use crate::workflow::{
    ApprovalEngine, CachedLetterTypes, CachedPeople, CounterStore, IdentityDirectory,
    InMemoryCounterStore, InMemoryDirectory, InMemoryLetterRepository, LetterRepository,
    LetterTypeDirectory, NumberingEngine, StoreError,
};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS letter_counters (
        counter_id TEXT PRIMARY KEY,
        last_number BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS letters (
        id TEXT PRIMARY KEY,
        data JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, data JSONB NOT NULL)",
    "CREATE TABLE IF NOT EXISTS letter_types (id TEXT PRIMARY KEY, data JSONB NOT NULL)",
];

/// Create the tables used by the adapters if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Serialization failures and deadlocks are retryable conflicts; a lost
/// insert race on a fresh counter row is too.
pub(crate) fn map_store_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(db.code().as_deref(), Some("40001" | "40P01" | "23505")) {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(e)
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ApprovalEngine>,
    pub documents: Arc<DocumentService>,
    pub config: AppConfig,
    pub pool: Option<PgPool>,
}

impl AppState {
    /// PostgreSQL-backed state when `DATABASE_URL` is set, in-memory otherwise.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let documents = Arc::new(DocumentService::new(&config.document_settings())?);

        let Some(database_url) = config.database_url.clone() else {
            log::warn!("Running with in-memory stores; directory lookups will be empty");
            return Ok(Self::in_memory(config, Arc::new(InMemoryDirectory::new()), documents));
        };

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(900))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&database_url)
            .await?;
        ensure_schema(&pool).await?;

        let directory = Arc::new(PgDirectory::new(pool.clone()));
        let engine = build_engine(
            &config,
            Arc::new(PgLetterRepository::new(pool.clone())),
            Arc::new(PgCounterStore::new(pool.clone())),
            directory.clone(),
            directory,
        );

        Ok(Self {
            engine: Arc::new(engine),
            documents,
            config,
            pool: Some(pool),
        })
    }

    /// State over in-memory letters and counters with the given directory.
    pub fn in_memory(
        config: AppConfig,
        directory: Arc<InMemoryDirectory>,
        documents: Arc<DocumentService>,
    ) -> Self {
        let engine = build_engine(
            &config,
            Arc::new(InMemoryLetterRepository::new()),
            Arc::new(InMemoryCounterStore::new()),
            directory.clone(),
            directory,
        );
        Self {
            engine: Arc::new(engine),
            documents,
            config,
            pool: None,
        }
    }
}

fn build_engine(
    config: &AppConfig,
    letters: Arc<dyn LetterRepository>,
    counters: Arc<dyn CounterStore>,
    people: Arc<dyn IdentityDirectory>,
    letter_types: Arc<dyn LetterTypeDirectory>,
) -> ApprovalEngine {
    ApprovalEngine::new(
        letters,
        Arc::new(CachedPeople::new(people)),
        Arc::new(CachedLetterTypes::new(letter_types)),
        NumberingEngine::new(counters, config.counter_max_attempts),
        config.root_unit_code.clone(),
        config.utc_offset_hours,
    )
}
