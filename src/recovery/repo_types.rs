use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// One password-reset attempt in the ledger.
///
/// `consumed_at` moves from `NULL` to a timestamp exactly once; rows are
/// never deleted and serve as an audit trail. Expiry lives in the token's
/// claims, not here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecoveryToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: OffsetDateTime,
    pub consumed_at: Option<OffsetDateTime>,
}
