pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod recovery;
pub mod state;
pub mod storage;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;
pub use recovery::services::RecoveryService;
pub use state::AppState;
pub use users::services::IdentityService;
