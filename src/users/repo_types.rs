use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

/// Profile sub-entity owned by a user record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub name: String,
    pub birth_date: Option<Date>,
    pub phone: Option<String>,
    pub document: Option<String>,
}

/// User record as stored.
///
/// `password_hash` never leaves the repository/credential layers; every
/// service operation returns [`crate::users::dto::PublicUser`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,                     // assigned by storage, immutable
    pub email: String,               // unique, case-sensitive as stored
    #[serde(skip_serializing)]
    pub password_hash: String,       // Argon2 PHC string
    pub photo_key: Option<String>,   // opaque handle into the photo store
    pub created_at: OffsetDateTime,
    #[sqlx(flatten)]
    pub profile: Profile,
}

/// Fields needed to persist a new user with its profile.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub profile: Profile,
}

/// Partial update: `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<Date>,
    pub phone: Option<String>,
    pub document: Option<String>,
    pub photo_key: Option<String>,
}
