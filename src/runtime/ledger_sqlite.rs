//! SQLite-backed step ledger.
//!
//! One row per completed step, keyed by `(run_id, step_key)`. Records are
//! first-write-wins: `record` performs an `INSERT OR IGNORE` and then
//! reads the row back, so a racing writer observes whatever the winner
//! stored. Reusing a `run_id` resumes that run; a fresh `run_id` starts
//! from a clean ledger in the same database file.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::ledger::{LedgerError, StepKey, StepLedger};

pub struct SqliteLedger {
    pool: SqlitePool,
    run_id: String,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl SqliteLedger {
    /// Connect (or create) the ledger database at `database_url`, e.g.
    /// `sqlite://shortn.db`, and scope all operations to `run_id`.
    ///
    /// Embedded migrations run on connect and are idempotent.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, run_id: &str) -> Result<Self, LedgerError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| LedgerError::Backend {
                message: format!("connect error: {e}"),
            })?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| LedgerError::Backend {
                message: format!("migration failure: {e}"),
            })?;
        Ok(Self {
            pool,
            run_id: run_id.to_string(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[async_trait]
impl StepLedger for SqliteLedger {
    async fn load(&self, key: &StepKey) -> Result<Option<Value>, LedgerError> {
        let row = sqlx::query("SELECT value_json FROM steps WHERE run_id = ? AND step_key = ?")
            .bind(&self.run_id)
            .bind(key.render())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend {
                message: e.to_string(),
            })?;
        match row {
            None => Ok(None),
            Some(row) => {
                let raw: String = row.get("value_json");
                serde_json::from_str(&raw).map(Some).map_err(|e| LedgerError::Backend {
                    message: format!("corrupt value_json for {}: {e}", key.render()),
                })
            }
        }
    }

    async fn record(&self, key: &StepKey, value: Value) -> Result<Value, LedgerError> {
        let encoded = serde_json::to_string(&value).map_err(|e| LedgerError::Backend {
            message: e.to_string(),
        })?;
        sqlx::query("INSERT OR IGNORE INTO steps (run_id, step_key, value_json) VALUES (?, ?, ?)")
            .bind(&self.run_id)
            .bind(key.render())
            .bind(&encoded)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend {
                message: e.to_string(),
            })?;
        // Read back whatever won, which may be an earlier writer's value.
        self.load(key).await?.ok_or_else(|| LedgerError::Backend {
            message: format!("record for {} vanished after insert", key.render()),
        })
    }

    async fn completed_steps(&self) -> Result<Vec<String>, LedgerError> {
        let rows = sqlx::query("SELECT step_key FROM steps WHERE run_id = ? ORDER BY step_key")
            .bind(&self.run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend {
                message: e.to_string(),
            })?;
        Ok(rows.into_iter().map(|row| row.get("step_key")).collect())
    }
}
