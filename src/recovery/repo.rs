use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Error;
use crate::recovery::repo_types::RecoveryToken;

/// Ledger of issued recovery tokens.
#[async_trait]
pub trait RecoveryLedger: Send + Sync {
    async fn insert(&self, user_id: i64, token: &str) -> Result<RecoveryToken, Error>;
    /// Atomically claim an unconsumed token. `None` means the token was
    /// never issued or was already spent; concurrent callers race on one
    /// conditional write, so at most one of them gets the record.
    async fn consume(&self, token: &str) -> Result<Option<RecoveryToken>, Error>;
    /// Compensating rollback when the password update the token authorized
    /// did not happen.
    async fn release(&self, id: i64) -> Result<(), Error>;
}

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct PgRecoveryLedger {
    db: PgPool,
}

impl PgRecoveryLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecoveryLedger for PgRecoveryLedger {
    async fn insert(&self, user_id: i64, token: &str) -> Result<RecoveryToken, Error> {
        let row = sqlx::query_as::<_, RecoveryToken>(
            r#"
            INSERT INTO password_recoveries (user_id, token)
            VALUES ($1, $2)
            RETURNING id, user_id, token, created_at, consumed_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn consume(&self, token: &str) -> Result<Option<RecoveryToken>, Error> {
        let row = sqlx::query_as::<_, RecoveryToken>(
            r#"
            UPDATE password_recoveries
               SET consumed_at = now()
             WHERE token = $1
               AND consumed_at IS NULL
            RETURNING id, user_id, token, created_at, consumed_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn release(&self, id: i64) -> Result<(), Error> {
        sqlx::query(r#"UPDATE password_recoveries SET consumed_at = NULL WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
