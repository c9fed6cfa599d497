//! Durable accounts.
//!
//! An email owns at most one account. Both store implementations make `create` the
//! authoritative uniqueness check: whichever writer loses gets [`StoreError::Duplicate`].
use std::{collections::HashMap, fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, RedisError, Script, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const ACCOUNT_PREFIX: &str = "account:";
pub const ACCOUNT_ID_PREFIX: &str = "account_id:";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account already exists")]
    Duplicate,

    #[error("Account not found")]
    NotFound,

    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Corrupt account record: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Farmer,
    Inspector,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Farmer => "farmer",
            Role::Inspector => "inspector",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "inspector" => Ok(Role::Inspector),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub password_hash: String,
    pub email_verified: bool,
}

impl From<NewAccount> for Account {
    fn from(new: NewAccount) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            phone: new.phone,
            role: new.role,
            password_hash: new.password_hash,
            email_verified: new.email_verified,
            created_at: Utc::now(),
        }
    }
}

/// What clients get to see of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>, StoreError>;

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError>;

    async fn update_password_hash(&self, id: &Uuid, password_hash: String)
    -> Result<(), StoreError>;
}

fn account_key(email: &str) -> String {
    format!("{ACCOUNT_PREFIX}{email}")
}

fn account_id_key(id: &Uuid) -> String {
    format!("{ACCOUNT_ID_PREFIX}{id}")
}

/// Rewrites `password_hash` in place, atomically on the server.
const UPDATE_PASSWORD_HASH: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local account = cjson.decode(raw)
account.password_hash = ARGV[1]
redis.call('SET', KEYS[1], cjson.encode(account))
return 1
";

pub struct RedisAccounts {
    connection: ConnectionManager,
}

impl RedisAccounts {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl AccountStore for RedisAccounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(account_key(email)).await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>, StoreError> {
        let mut connection = self.connection.clone();
        let email: Option<String> = connection.get(account_id_key(id)).await?;

        match email {
            Some(email) => self.find_by_email(&email).await,
            None => Ok(None),
        }
    }

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        let account = Account::from(new);
        let json = serde_json::to_string(&account)?;

        // Both keys or neither. The id is fresh, so a refusal means the email is taken.
        let mut connection = self.connection.clone();
        let created: bool = connection
            .mset_nx(&[
                (account_key(&account.email), json),
                (account_id_key(&account.id), account.email.clone()),
            ])
            .await?;
        if !created {
            return Err(StoreError::Duplicate);
        }

        Ok(account)
    }

    async fn update_password_hash(
        &self,
        id: &Uuid,
        password_hash: String,
    ) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let email: Option<String> = connection.get(account_id_key(id)).await?;
        let email = email.ok_or(StoreError::NotFound)?;

        let updated: i32 = Script::new(UPDATE_PASSWORD_HASH)
            .key(account_key(&email))
            .arg(password_hash)
            .invoke_async(&mut connection)
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAccounts {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.lock().await.get(email).cloned())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|account| account.id == *id)
            .cloned())
    }

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&new.email) {
            return Err(StoreError::Duplicate);
        }

        let account = Account::from(new);
        accounts.insert(account.email.clone(), account.clone());

        Ok(account)
    }

    async fn update_password_hash(
        &self,
        id: &Uuid,
        password_hash: String,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .values_mut()
            .find(|account| account.id == *id)
            .ok_or(StoreError::NotFound)?;

        account.password_hash = password_hash;
        Ok(())
    }
}
