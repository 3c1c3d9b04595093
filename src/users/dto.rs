use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::users::repo_types::{Profile, User};

/// Registration input. `birth_date`, `phone` and `document` are optional;
/// `birth_date` is parsed by the service against `YYYY-MM-DD`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
}

/// Partial profile update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<Date>,
    pub phone: Option<String>,
    pub document: Option<String>,
    pub photo_key: Option<String>,
}

/// Public part of a user returned to callers.
///
/// Structurally cannot carry the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub photo_key: Option<String>,
    pub created_at: OffsetDateTime,
    pub profile: Profile,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            photo_key: user.photo_key,
            created_at: user.created_at,
            profile: user.profile,
        }
    }
}
