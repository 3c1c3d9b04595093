use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{config::JwtConfig, error::Error, users::repo_types::User};

/// Payload of a long-lived session token. Carries no expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub iat: usize,
}

/// Payload of a short-lived password-recovery token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecoveryClaims {
    pub sub: i64,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 signing and verification keys derived from the process-wide secret.
///
/// Read-only after construction; rotating the secret invalidates every
/// outstanding token.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    recovery_ttl: TimeDuration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            recovery_ttl: TimeDuration::minutes(cfg.recovery_ttl_minutes),
        }
    }

    // Session tokens omit `exp`, so it must not be a required claim.
    fn validation() -> Validation {
        let mut validation = Validation::default();
        validation.set_required_spec_claims::<&str>(&[]);
        validation
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, Error> {
        let token = encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(token)
    }

    /// Issue a session token over the user's public identity. No expiry.
    pub fn session_token(&self, user: &User) -> Result<String, Error> {
        let claims = SessionClaims {
            sub: user.id,
            name: user.profile.name.clone(),
            email: user.email.clone(),
            photo: user.photo_key.clone(),
            iat: OffsetDateTime::now_utc().unix_timestamp() as usize,
        };
        let token = self.sign(&claims)?;
        debug!(user_id = %user.id, "session token signed");
        Ok(token)
    }

    /// Issue a recovery token for one password-reset attempt.
    pub fn recovery_token(&self, user_id: i64) -> Result<String, Error> {
        let now = OffsetDateTime::now_utc();
        let claims = RecoveryClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.recovery_ttl).unix_timestamp() as usize,
        };
        let token = self.sign(&claims)?;
        debug!(user_id = %user_id, "recovery token signed");
        Ok(token)
    }

    /// Check signature and, when present, expiry.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, Error> {
        let data = decode::<T>(token, &self.decoding, &Self::validation()).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::TokenInvalid,
            }
        })?;
        Ok(data.claims)
    }

    /// Decode claims without checking the signature.
    ///
    /// Only for call chains that already verified the same token; never
    /// reachable from an unauthenticated caller.
    pub fn decode_unverified<T: DeserializeOwned>(&self, token: &str) -> Result<T, Error> {
        let mut validation = Self::validation();
        validation.insecure_disable_signature_validation();
        let data =
            decode::<T>(token, &self.decoding, &validation).map_err(|_| Error::TokenInvalid)?;
        Ok(data.claims)
    }
}
