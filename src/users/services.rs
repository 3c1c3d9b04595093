use std::sync::Arc;

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use time::{format_description::FormatItem, macros::format_description, Date};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::jwt::{JwtKeys, SessionClaims};
use crate::auth::password::{hash_password, verify_password};
use crate::error::Error;
use crate::mailer::Notifier;
use crate::storage::PhotoStore;
use crate::users::dto::{PublicUser, RegisterUser, UpdateUser};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, Profile, User, UserPatch};

const BIRTH_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Orchestrates registration, login, tokens, profile and photo lifecycle.
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserRepository>,
    photos: Arc<dyn PhotoStore>,
    mailer: Arc<dyn Notifier>,
    keys: JwtKeys,
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        photos: Arc<dyn PhotoStore>,
        mailer: Arc<dyn Notifier>,
        keys: JwtKeys,
    ) -> Self {
        Self {
            users,
            photos,
            mailer,
            keys,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn register(&self, input: RegisterUser) -> Result<PublicUser, Error> {
        if input.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        if input.email.trim().is_empty() {
            return Err(Error::validation("email is required"));
        }
        if input.password.is_empty() {
            return Err(Error::validation("password is required"));
        }
        if !is_valid_email(&input.email) {
            warn!(email = %input.email, "invalid email");
            return Err(Error::validation("email is invalid"));
        }
        let birth_date = match input.birth_date.as_deref().filter(|v| !v.is_empty()) {
            Some(raw) => Some(
                Date::parse(raw, BIRTH_DATE_FORMAT)
                    .map_err(|_| Error::validation("birth date is invalid"))?,
            ),
            None => None,
        };

        // Probe first for a friendly error. The unique constraint on
        // users.email closes the race and maps to the same Conflict.
        if self.users.find_by_email(&input.email).await?.is_some() {
            warn!(email = %input.email, "email already registered");
            return Err(Error::Conflict("email already exists".into()));
        }

        let password_hash = hash_password(&input.password)?;
        let user = self
            .users
            .create(NewUser {
                email: input.email,
                password_hash,
                profile: Profile {
                    name: input.name,
                    birth_date,
                    phone: non_empty(input.phone),
                    document: non_empty(input.document),
                },
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user.into())
    }

    /// Existence probe; absence is `false`, never an error.
    pub async fn verify_email_exists(&self, email: &str) -> Result<bool, Error> {
        Ok(self.users.find_by_email(email).await?.is_some())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, Error> {
        let user = self.users.find_by_email(email).await?.ok_or_else(|| {
            warn!(%email, "login unknown email");
            Error::NotFound("user")
        })?;

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(Error::Unauthorized);
        }

        let token = self.keys.session_token(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    /// Sign a long-lived session token over the user's public identity.
    pub async fn issue_session_token(&self, user_id: i64) -> Result<String, Error> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        self.keys.session_token(&user)
    }

    /// Verify a bearer token. Both a bad signature and an expired token
    /// come back as `Unauthorized`; the distinction stays in the logs.
    pub fn authenticate(&self, token: &str) -> Result<SessionClaims, Error> {
        match self.keys.verify::<SessionClaims>(token) {
            Ok(claims) => Ok(claims),
            Err(Error::TokenExpired) => {
                warn!("expired session token");
                Err(Error::Unauthorized)
            }
            Err(Error::TokenInvalid) => {
                warn!("invalid session token");
                Err(Error::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_profile(
        &self,
        user_id: i64,
        patch: UpdateUser,
    ) -> Result<PublicUser, Error> {
        let email = non_empty(patch.email);
        if let Some(ref email) = email {
            if !is_valid_email(email) {
                return Err(Error::validation("email is invalid"));
            }
        }
        let photo_key = non_empty(patch.photo_key);

        // Changing the handle obligates deleting the blob it replaced.
        let old_photo = if photo_key.is_some() {
            self.users
                .find_by_id(user_id)
                .await?
                .ok_or(Error::NotFound("user"))?
                .photo_key
        } else {
            None
        };

        let user = self
            .users
            .update(
                user_id,
                UserPatch {
                    name: non_empty(patch.name),
                    email,
                    birth_date: patch.birth_date,
                    phone: non_empty(patch.phone),
                    document: non_empty(patch.document),
                    photo_key,
                },
            )
            .await?
            .ok_or(Error::NotFound("user"))?;

        if let Some(old) = old_photo.as_deref() {
            if user.photo_key.as_deref() != Some(old) {
                if let Err(e) = self.photos.delete(old).await {
                    warn!(error = %e, key = old, "stale photo delete failed");
                }
            }
        }

        info!(user_id = %user.id, "profile updated");
        Ok(user.into())
    }

    /// Re-verifies the current password even for an authenticated caller;
    /// a stolen session token alone must not be enough to take the account.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<PublicUser, Error> {
        if new_password.is_empty() {
            return Err(Error::validation("new password is required"));
        }
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        if !verify_password(current_password, &user.password_hash)? {
            warn!(user_id = %user.id, "change password rejected: wrong current password");
            return Err(Error::Unauthorized);
        }

        let user = self.store_password(user_id, new_password).await?;
        self.send_password_changed(&user).await?;
        Ok(user.into())
    }

    /// Hash and persist a new password. The confirmation mail is a separate
    /// step so callers can tell a failed persist from a failed notification.
    pub(crate) async fn store_password(
        &self,
        user_id: i64,
        new_password: &str,
    ) -> Result<User, Error> {
        if new_password.is_empty() {
            return Err(Error::validation("new password is required"));
        }
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        let hash = hash_password(new_password)?;
        self.users.set_password_hash(user_id, &hash).await?;
        user.password_hash = hash;
        info!(user_id = %user.id, "password updated");
        Ok(user)
    }

    pub(crate) async fn send_password_changed(&self, user: &User) -> Result<(), Error> {
        self.mailer
            .send(
                &user.email,
                "Your password was changed",
                "password-changed",
                serde_json::json!({ "name": user.profile.name }),
            )
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "password-changed mail failed");
                Error::Internal(e)
            })
    }

    #[instrument(skip(self, bytes))]
    pub async fn set_photo(
        &self,
        user_id: i64,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<PublicUser, Error> {
        let ext = match content_type {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            other => {
                warn!(content_type = other, "rejected photo upload");
                return Err(Error::validation("invalid file type"));
            }
        };
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        // Write-new, commit handle, delete-old. The row must never point at
        // a blob the store cannot serve.
        let key = format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), ext);
        self.photos
            .save(&key, bytes, content_type)
            .await
            .map_err(Error::Internal)?;

        if let Err(e) = self.users.set_photo_key(user_id, Some(&key)).await {
            if let Err(cleanup_err) = self.photos.delete(&key).await {
                warn!(error = %cleanup_err, key = %key, "fresh photo cleanup failed");
            }
            return Err(e);
        }

        if let Some(old) = user.photo_key.as_deref() {
            if let Err(e) = self.photos.delete(old).await {
                warn!(error = %e, key = old, "stale photo delete failed");
            }
        }

        let updated = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        info!(user_id = %user_id, key = %key, "photo updated");
        Ok(updated.into())
    }

    /// Clears the handle first so the row never references a deleted blob;
    /// a no-op when no photo is set.
    #[instrument(skip(self))]
    pub async fn remove_photo(&self, user_id: i64) -> Result<PublicUser, Error> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        let Some(old) = user.photo_key.take() else {
            return Ok(user.into());
        };

        self.users.set_photo_key(user_id, None).await?;
        if let Err(e) = self.photos.delete(&old).await {
            warn!(error = %e, key = %old, "photo delete failed");
        }
        info!(user_id = %user_id, "photo removed");
        Ok(user.into())
    }

    pub async fn get_photo(&self, user_id: i64) -> Result<(Bytes, &'static str), Error> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        let key = user.photo_key.as_deref().ok_or(Error::NotFound("photo"))?;
        let bytes = self.photos.read(key).await.map_err(Error::Internal)?;
        let content_type = if key.ends_with(".png") {
            "image/png"
        } else {
            "image/jpeg"
        };
        Ok((bytes, content_type))
    }
}
