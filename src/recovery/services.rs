use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::auth::jwt::{JwtKeys, RecoveryClaims};
use crate::error::Error;
use crate::mailer::Notifier;
use crate::recovery::repo::RecoveryLedger;
use crate::users::dto::PublicUser;
use crate::users::repo::UserRepository;
use crate::users::services::IdentityService;

/// Runs the one-time password-reset protocol.
///
/// Per ledger row the only transition is issued -> consumed; expiry is a
/// time-based guard inside the token, checked at verification.
#[derive(Clone)]
pub struct RecoveryService {
    users: Arc<dyn UserRepository>,
    ledger: Arc<dyn RecoveryLedger>,
    identity: IdentityService,
    keys: JwtKeys,
    mailer: Arc<dyn Notifier>,
    reset_url: String,
}

impl RecoveryService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        ledger: Arc<dyn RecoveryLedger>,
        identity: IdentityService,
        keys: JwtKeys,
        mailer: Arc<dyn Notifier>,
        reset_url: String,
    ) -> Self {
        Self {
            users,
            ledger,
            identity,
            keys,
            mailer,
            reset_url,
        }
    }

    /// Issue a recovery token and mail a reset link.
    ///
    /// An unknown email is reported as success so the endpoint cannot be
    /// used to enumerate accounts. A mail transport failure is logged but
    /// does not fail the call; the token stays valid for a retry.
    #[instrument(skip(self))]
    pub async fn request_reset(&self, email: &str) -> Result<(), Error> {
        let Some(user) = self.users.find_by_email(email).await? else {
            debug!("reset requested for unknown email");
            return Ok(());
        };

        let token = self.keys.recovery_token(user.id)?;
        self.ledger.insert(user.id, &token).await?;

        let url = format!("{}?token={}", self.reset_url, token);
        if let Err(e) = self
            .mailer
            .send(
                &user.email,
                "Password reset",
                "recovery-request",
                serde_json::json!({ "name": user.profile.name, "url": url }),
            )
            .await
        {
            error!(error = %e, user_id = %user.id, "recovery mail failed");
        }

        info!(user_id = %user.id, "recovery token issued");
        Ok(())
    }

    /// Spend a recovery token and set the new password.
    ///
    /// The conditional consume and the password update form one logical
    /// unit: if the persist fails the token is released again, so a user
    /// is never locked out of recovery by a transient storage error.
    #[instrument(skip(self, token, new_password))]
    pub async fn confirm_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<PublicUser, Error> {
        if new_password.is_empty() {
            return Err(Error::validation("new password is required"));
        }

        let claims: RecoveryClaims = self.keys.verify(token).map_err(|e| match e {
            Error::TokenExpired | Error::TokenInvalid => {
                Error::validation("token invalid or expired")
            }
            other => other,
        })?;

        let record = self
            .ledger
            .consume(token)
            .await?
            .ok_or_else(|| Error::validation("token used"))?;
        debug_assert_eq!(record.user_id, claims.sub);

        let user = match self.identity.store_password(record.user_id, new_password).await {
            Ok(user) => user,
            Err(e) => {
                if let Err(release_err) = self.ledger.release(record.id).await {
                    error!(
                        error = %release_err,
                        ledger_id = record.id,
                        "failed to release token after failed reset"
                    );
                }
                return Err(e);
            }
        };

        // The password did change; a failed notification surfaces as an
        // internal error but the token stays consumed.
        self.identity.send_password_changed(&user).await?;

        info!(user_id = %user.id, "password reset completed");
        Ok(user.into())
    }
}
