use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::mailer::{Notifier, SmtpNotifier};
use crate::recovery::repo::{PgRecoveryLedger, RecoveryLedger};
use crate::recovery::services::RecoveryService;
use crate::storage::{PhotoStore, Storage};
use crate::users::repo::{PgUsers, UserRepository};
use crate::users::services::IdentityService;

/// Composition root: wires production adapters into the services.
///
/// The embedding layer (HTTP or otherwise) holds one of these and calls
/// `identity` / `recovery` with typed inputs.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub identity: IdentityService,
    pub recovery: RecoveryService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let storage = Arc::new(
            Storage::new(
                &config.minio_endpoint,
                &config.minio_bucket,
                &config.minio_access_key,
                &config.minio_secret_key,
                "us-east-1",
            )
            .await?,
        ) as Arc<dyn PhotoStore>;
        let mailer = Arc::new(SmtpNotifier::from_config(&config.smtp)?) as Arc<dyn Notifier>;

        Ok(Self::from_parts(db, config, storage, mailer))
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        storage: Arc<dyn PhotoStore>,
        mailer: Arc<dyn Notifier>,
    ) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let users = Arc::new(PgUsers::new(db.clone())) as Arc<dyn UserRepository>;
        let ledger = Arc::new(PgRecoveryLedger::new(db.clone())) as Arc<dyn RecoveryLedger>;

        let identity = IdentityService::new(users.clone(), storage, mailer.clone(), keys.clone());
        let recovery = RecoveryService::new(
            users,
            ledger,
            identity.clone(),
            keys,
            mailer,
            config.smtp.reset_url.clone(),
        );

        Self {
            db,
            config,
            identity,
            recovery,
        }
    }
}
