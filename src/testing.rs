//! In-memory fakes for the repository, photo-store and notifier
//! boundaries, used by the service unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::auth::jwt::JwtKeys;
use crate::config::JwtConfig;
use crate::error::Error;
use crate::mailer::Notifier;
use crate::recovery::repo::RecoveryLedger;
use crate::recovery::repo_types::RecoveryToken;
use crate::recovery::services::RecoveryService;
use crate::storage::PhotoStore;
use crate::users::dto::{PublicUser, RegisterUser};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, User, UserPatch};
use crate::users::services::IdentityService;

#[derive(Default)]
pub struct MemoryUsers {
    inner: Mutex<MemoryUsersInner>,
}

#[derive(Default)]
struct MemoryUsersInner {
    next_id: i64,
    rows: Vec<User>,
}

impl MemoryUsers {
    pub fn remove(&self, id: i64) {
        self.inner.lock().unwrap().rows.retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, Error> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, Error> {
        let mut inner = self.inner.lock().unwrap();
        // same behavior as the unique constraint on users.email
        if inner.rows.iter().any(|u| u.email == new.email) {
            return Err(Error::Conflict("email already exists".into()));
        }
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            email: new.email,
            password_hash: new.password_hash,
            photo_key: None,
            created_at: OffsetDateTime::now_utc(),
            profile: new.profile,
        };
        inner.rows.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<Option<User>, Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ref email) = patch.email {
            if inner.rows.iter().any(|u| u.id != id && &u.email == email) {
                return Err(Error::Conflict("email already exists".into()));
            }
        }
        let Some(user) = inner.rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.profile.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(birth_date) = patch.birth_date {
            user.profile.birth_date = Some(birth_date);
        }
        if let Some(phone) = patch.phone {
            user.profile.phone = Some(phone);
        }
        if let Some(document) = patch.document {
            user.profile.document = Some(document);
        }
        if let Some(photo_key) = patch.photo_key {
            user.photo_key = Some(photo_key);
        }
        Ok(Some(user.clone()))
    }

    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(Error::NotFound("user"))?;
        user.password_hash = hash.to_string();
        Ok(())
    }

    async fn set_photo_key(&self, id: i64, key: Option<&str>) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(Error::NotFound("user"))?;
        user.photo_key = key.map(str::to_string);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryLedgerInner>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    next_id: i64,
    rows: Vec<RecoveryToken>,
}

impl MemoryLedger {
    pub fn rows(&self) -> Vec<RecoveryToken> {
        self.inner.lock().unwrap().rows.clone()
    }
}

#[async_trait]
impl RecoveryLedger for MemoryLedger {
    async fn insert(&self, user_id: i64, token: &str) -> Result<RecoveryToken, Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let row = RecoveryToken {
            id: inner.next_id,
            user_id,
            token: token.to_string(),
            created_at: OffsetDateTime::now_utc(),
            consumed_at: None,
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn consume(&self, token: &str) -> Result<Option<RecoveryToken>, Error> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner
            .rows
            .iter_mut()
            .find(|r| r.token == token && r.consumed_at.is_none())
        else {
            return Ok(None);
        };
        row.consumed_at = Some(OffsetDateTime::now_utc());
        Ok(Some(row.clone()))
    }

    async fn release(&self, id: i64) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) {
            row.consumed_at = None;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPhotos {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryPhotos {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotos {
    async fn save(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn read(&self, key: &str) -> anyhow::Result<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such object: {key}"))
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub data: serde_json::Value,
}

#[derive(Default)]
pub struct MailSpy {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl MailSpy {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for MailSpy {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        data: serde_json::Value,
    ) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("smtp unavailable");
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            template: template.to_string(),
            data,
        });
        Ok(())
    }
}

pub struct Harness {
    pub identity: IdentityService,
    pub recovery: RecoveryService,
    pub keys: JwtKeys,
    pub users: Arc<MemoryUsers>,
    pub ledger: Arc<MemoryLedger>,
    pub photos: Arc<MemoryPhotos>,
    pub mail: Arc<MailSpy>,
}

pub fn harness() -> Harness {
    let keys = JwtKeys::from_config(&JwtConfig {
        secret: "test-secret".into(),
        recovery_ttl_minutes: 30,
    });
    let users = Arc::new(MemoryUsers::default());
    let ledger = Arc::new(MemoryLedger::default());
    let photos = Arc::new(MemoryPhotos::default());
    let mail = Arc::new(MailSpy::default());

    let identity = IdentityService::new(
        users.clone(),
        photos.clone(),
        mail.clone(),
        keys.clone(),
    );
    let recovery = RecoveryService::new(
        users.clone(),
        ledger.clone(),
        identity.clone(),
        keys.clone(),
        mail.clone(),
        "https://localhost/auth/reset".into(),
    );

    Harness {
        identity,
        recovery,
        keys,
        users,
        ledger,
        photos,
        mail,
    }
}

pub async fn register_ana(h: &Harness) -> PublicUser {
    h.identity
        .register(RegisterUser {
            name: "Ana".into(),
            email: "ana@x.com".into(),
            password: "s3cret".into(),
            birth_date: None,
            phone: None,
            document: None,
        })
        .await
        .expect("register ana")
}
