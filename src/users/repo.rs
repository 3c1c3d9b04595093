use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::Error;
use crate::users::repo_types::{NewUser, User, UserPatch};

/// Narrow persistence boundary for user + profile records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, Error>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;
    /// Persist user and profile atomically. A duplicate email maps to
    /// [`Error::Conflict`] via the storage-level uniqueness constraint.
    async fn create(&self, new: NewUser) -> Result<User, Error>;
    /// Apply a partial update and return the re-fetched record, or `None`
    /// if the user does not exist.
    async fn update(&self, id: i64, patch: UserPatch) -> Result<Option<User>, Error>;
    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<(), Error>;
    async fn set_photo_key(&self, id: i64, key: Option<&str>) -> Result<(), Error>;
}

/// Postgres-backed implementation.
#[derive(Clone)]
pub struct PgUsers {
    db: PgPool,
}

impl PgUsers {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.email, u.password_hash, u.photo_key, u.created_at,
           p.name, p.birth_date, p.phone, p.document
      FROM users u
      JOIN profiles p ON p.user_id = u.id
"#;

// Postgres unique_violation
fn map_unique_violation(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref db) = e {
        if db.code().as_deref() == Some("23505") {
            return Error::Conflict("email already exists".into());
        }
    }
    Error::Internal(e.into())
}

#[async_trait]
impl UserRepository for PgUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, Error> {
        let sql = format!("{SELECT_USER} WHERE u.id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let sql = format!("{SELECT_USER} WHERE u.email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, Error> {
        let mut tx = self.db.begin().await?;

        let (id, created_at) = sqlx::query_as::<_, (i64, OffsetDateTime)>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, created_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, name, birth_date, phone, document)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(&new.profile.name)
        .bind(new.profile.birth_date)
        .bind(&new.profile.phone)
        .bind(&new.profile.document)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(User {
            id,
            email: new.email,
            password_hash: new.password_hash,
            photo_key: None,
            created_at,
            profile: new.profile,
        })
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<Option<User>, Error> {
        let mut tx = self.db.begin().await?;

        let profile_rows = sqlx::query(
            r#"
            UPDATE profiles
               SET name       = COALESCE($2, name),
                   birth_date = COALESCE($3, birth_date),
                   phone      = COALESCE($4, phone),
                   document   = COALESCE($5, document)
             WHERE user_id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(patch.birth_date)
        .bind(&patch.phone)
        .bind(&patch.document)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if profile_rows == 0 {
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE users
               SET email     = COALESCE($2, email),
                   photo_key = COALESCE($3, photo_key)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.email)
        .bind(&patch.photo_key)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        tx.commit().await?;

        self.find_by_id(id).await
    }

    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<(), Error> {
        let rows = sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(hash)
            .execute(&self.db)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(Error::NotFound("user"));
        }
        Ok(())
    }

    async fn set_photo_key(&self, id: i64, key: Option<&str>) -> Result<(), Error> {
        let rows = sqlx::query(r#"UPDATE users SET photo_key = $2 WHERE id = $1"#)
            .bind(id)
            .bind(key)
            .execute(&self.db)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(Error::NotFound("user"));
        }
        Ok(())
    }
}
