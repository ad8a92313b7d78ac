//! In-process data store
//!
//! Mirrors the hosted backend closely enough to run the whole application
//! without it: tables of JSON rows, an object bucket, password accounts and
//! JWT-shaped session tokens. Every call is recorded, and individual
//! operations can be made to fail, so tests can observe exactly which
//! requests a workflow issued and in what order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{OrderBy, RemoteStore, StoreError};
use crate::models::{AdminUser, RecordId, Session};

const STORAGE_HOST: &str = "storage.memory.local";

/// Operation kinds that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetSession,
    GetUser,
    SignIn,
    SignOut,
    SelectAll,
    SelectEq,
    Insert,
    Update,
    Delete,
    Upload,
    Remove,
}

/// A request as it reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetSession,
    GetUser,
    SignIn { email: String },
    SignOut,
    SelectAll { table: String },
    SelectEq { table: String, column: String, value: String },
    Insert { table: String },
    Update { table: String, id: String },
    Delete { table: String, id: String },
    Upload { bucket: String, key: String, content_type: String },
    Remove { bucket: String, key: String },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            Self::GetSession => StoreOp::GetSession,
            Self::GetUser => StoreOp::GetUser,
            Self::SignIn { .. } => StoreOp::SignIn,
            Self::SignOut => StoreOp::SignOut,
            Self::SelectAll { .. } => StoreOp::SelectAll,
            Self::SelectEq { .. } => StoreOp::SelectEq,
            Self::Insert { .. } => StoreOp::Insert,
            Self::Update { .. } => StoreOp::Update,
            Self::Delete { .. } => StoreOp::Delete,
            Self::Upload { .. } => StoreOp::Upload,
            Self::Remove { .. } => StoreOp::Remove,
        }
    }
}

struct Account {
    user: AdminUser,
    password: String,
    active: bool,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Value>>,
    objects: HashSet<(String, String)>,
    accounts: Vec<Account>,
    sessions: HashMap<String, Session>,
    calls: Vec<StoreCall>,
    failing: HashSet<StoreOp>,
    sequence: i64,
}

/// In-process stand-in for the hosted backend
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// Base of generated `created_at` values; each insert is one second later
    epoch: DateTime<Utc>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("epoch", &self.epoch).finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            epoch: Utc::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an account that can sign in; returns its user id
    pub fn add_user(&self, email: &str, password: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock().accounts.push(Account {
            user: AdminUser {
                id: id.clone(),
                email: Some(email.to_string()),
            },
            password: password.to_string(),
            active: true,
        });
        id
    }

    /// Keep the user's sessions but make the user lookup reject them
    pub fn deactivate_user(&self, user_id: &str) {
        for account in self.lock().accounts.iter_mut().filter(|a| a.user.id == user_id) {
            account.active = false;
        }
    }

    /// Issue a session for an existing user without going through sign-in
    pub fn issue_session(&self, user_id: &str) -> Session {
        let mut state = self.lock();
        state.sequence += 1;
        let expires_at = Utc::now() + Duration::hours(1);
        let session = Session {
            access_token: mint_token(user_id, expires_at, state.sequence),
            user_id: user_id.to_string(),
            expires_at,
        };
        state.sessions.insert(session.access_token.clone(), session.clone());
        session
    }

    /// Insert rows exactly as given, bypassing the call log
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.lock().tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current rows of a table in insertion order
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn has_object(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .objects
            .contains(&(bucket.to_string(), key.to_string()))
    }

    /// Make every subsequent call of this kind fail until [`Self::recover`]
    pub fn fail(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.lock().failing.remove(&op);
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: StoreOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Record the call, then fail it if its kind was marked failing
    fn record(&self, call: StoreCall) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = self.lock();
        let op = call.op();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(StoreError::Api {
                status: 503,
                message: format!("{:?} unavailable", op),
            });
        }
        Ok(state)
    }

    fn row_id(row: &Value) -> Option<String> {
        match row.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn mint_token(user_id: &str, expires_at: DateTime<Utc>, nonce: i64) -> String {
    let header = BASE64URL_NOPAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = json!({ "sub": user_id, "exp": expires_at.timestamp(), "jti": nonce });
    let payload = BASE64URL_NOPAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.memory", header, payload)
}

fn created_at_of(row: &Value) -> Option<DateTime<Utc>> {
    row.get("created_at")?
        .as_str()?
        .parse::<DateTime<Utc>>()
        .ok()
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError> {
        let state = self.record(StoreCall::GetSession)?;
        Ok(state
            .sessions
            .get(access_token)
            .filter(|s| !s.is_expired())
            .cloned())
    }

    async fn get_user(&self, access_token: &str) -> Result<AdminUser, StoreError> {
        let state = self.record(StoreCall::GetUser)?;
        let session = state
            .sessions
            .get(access_token)
            .filter(|s| !s.is_expired())
            .ok_or(StoreError::Unauthorized)?;
        state
            .accounts
            .iter()
            .find(|a| a.user.id == session.user_id && a.active)
            .map(|a| a.user.clone())
            .ok_or(StoreError::Unauthorized)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let user_id = {
            let state = self.record(StoreCall::SignIn {
                email: email.to_string(),
            })?;
            state
                .accounts
                .iter()
                .find(|a| {
                    a.active
                        && a.password == password
                        && a.user.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email))
                })
                .map(|a| a.user.id.clone())
                .ok_or(StoreError::InvalidCredentials)?
        };
        Ok(self.issue_session(&user_id))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError> {
        let mut state = self.record(StoreCall::SignOut)?;
        state.sessions.remove(access_token);
        Ok(())
    }

    async fn select_all(&self, table: &str, order: OrderBy) -> Result<Vec<Value>, StoreError> {
        let state = self.record(StoreCall::SelectAll {
            table: table.to_string(),
        })?;
        let mut rows = state.tables.get(table).cloned().unwrap_or_default();
        if order.column == "created_at" {
            rows.sort_by(|a, b| {
                let ordering = created_at_of(a).cmp(&created_at_of(b));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        Ok(rows)
    }

    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let state = self.record(StoreCall::SelectEq {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        })?;
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get(column).and_then(Value::as_str) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let mut state = self.record(StoreCall::Insert {
            table: table.to_string(),
        })?;
        let Value::Object(mut fields) = row else {
            return Err(StoreError::Api {
                status: 400,
                message: "insert payload must be an object".to_string(),
            });
        };
        state.sequence += 1;
        let created_at = self.epoch + Duration::seconds(state.sequence);
        fields.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        fields.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
        let stored = Value::Object(fields);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, table: &str, id: &RecordId, patch: Value) -> Result<Value, StoreError> {
        let mut state = self.record(StoreCall::Update {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        let not_found = || StoreError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        };
        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| Self::row_id(row).as_deref() == Some(id.as_str()))
            })
            .ok_or_else(not_found)?;
        if let (Value::Object(fields), Value::Object(changes)) = (&mut *row, patch) {
            for (key, value) in changes {
                if key != "id" && key != "created_at" {
                    fields.insert(key, value);
                }
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), StoreError> {
        let mut state = self.record(StoreCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| Self::row_id(row).as_deref() != Some(id.as_str()));
        }
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        _data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.record(StoreCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
        })?;
        state.objects.insert((bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "http://{}/storage/v1/object/public/{}/{}",
            STORAGE_HOST,
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut state = self.record(StoreCall::Remove {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        state.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn storage_host(&self) -> Option<String> {
        Some(STORAGE_HOST.to_string())
    }

    fn authorized(&self, _access_token: &str) -> Arc<dyn RemoteStore> {
        Arc::new(self.clone())
    }
}
