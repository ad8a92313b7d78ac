//! Session guard for the admin area
//!
//! A check runs `Checking -> Authenticated | Unauthenticated`. Anything short
//! of a live session whose user the store confirms is treated as no session,
//! and every unauthenticated outcome sends exactly one redirect to the login
//! route.

use std::sync::{Arc, Mutex};

use crate::models::AdminUser;
use crate::remote::{RemoteStore, StoreError};

/// Where the guard is in its check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authenticated(AdminUser),
    Unauthenticated,
}

impl GuardState {
    pub fn user(&self) -> Option<&AdminUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Receives the redirect issued when a check fails
pub trait Navigator: Send + Sync {
    fn redirect(&self, to: &str);
}

/// Navigator that remembers the redirect target for the caller to act on
#[derive(Debug, Default)]
pub struct RedirectSlot {
    target: Mutex<Option<String>>,
    count: Mutex<usize>,
}

impl RedirectSlot {
    pub fn take(&self) -> Option<String> {
        self.target.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Redirects issued so far
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Navigator for RedirectSlot {
    fn redirect(&self, to: &str) {
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = Some(to.to_string());
        *self.count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}

/// Gate in front of the admin workspace
pub struct SessionGuard {
    store: Arc<dyn RemoteStore>,
    login_path: String,
    state: Mutex<GuardState>,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn RemoteStore>, login_path: impl Into<String>) -> Self {
        Self {
            store,
            login_path: login_path.into(),
            state: Mutex::new(GuardState::Checking),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: GuardState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Run a check and redirect to the login route unless it authenticates
    pub async fn check_session(
        &self,
        access_token: Option<&str>,
        navigator: &dyn Navigator,
    ) -> GuardState {
        self.set_state(GuardState::Checking);

        let state = match self.current_user(access_token).await {
            Some(user) => GuardState::Authenticated(user),
            None => {
                navigator.redirect(&self.login_path);
                GuardState::Unauthenticated
            }
        };

        self.set_state(state.clone());
        state
    }

    /// The confirmed admin behind a token, without navigating anywhere
    pub async fn current_user(&self, access_token: Option<&str>) -> Option<AdminUser> {
        match self.resolve(access_token).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed, treating as signed out");
                None
            }
        }
    }

    async fn resolve(&self, access_token: Option<&str>) -> Result<Option<AdminUser>, StoreError> {
        let Some(token) = access_token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let Some(session) = self.store.get_session(token).await? else {
            return Ok(None);
        };

        let user = self.store.get_user(&session.access_token).await?;
        if user.id != session.user_id {
            tracing::warn!(
                session_user = %session.user_id,
                store_user = %user.id,
                "Session user does not match token owner"
            );
            return Ok(None);
        }
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryStore, StoreOp};

    fn setup() -> (MemoryStore, SessionGuard) {
        let store = MemoryStore::new();
        let guard = SessionGuard::new(Arc::new(store.clone()), "/login");
        (store, guard)
    }

    #[test]
    fn test_guard_starts_checking() {
        let (_, guard) = setup();
        assert_eq!(guard.state(), GuardState::Checking);
    }

    #[tokio::test]
    async fn test_no_session_redirects_once() {
        let (_, guard) = setup();
        let slot = RedirectSlot::default();

        let state = guard.check_session(None, &slot).await;

        assert_eq!(state, GuardState::Unauthenticated);
        assert_eq!(guard.state(), GuardState::Unauthenticated);
        assert_eq!(slot.count(), 1);
        assert_eq!(slot.take().as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn test_valid_session_authenticates_without_redirect() {
        let (store, guard) = setup();
        let user_id = store.add_user("admin@example.com", "pw");
        let session = store.issue_session(&user_id);
        let slot = RedirectSlot::default();

        let state = guard.check_session(Some(&session.access_token), &slot).await;

        assert_eq!(state.user().map(|u| u.id.as_str()), Some(user_id.as_str()));
        assert_eq!(slot.count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_user_lookup_fails_closed() {
        let (store, guard) = setup();
        let user_id = store.add_user("admin@example.com", "pw");
        let session = store.issue_session(&user_id);
        store.deactivate_user(&user_id);
        let slot = RedirectSlot::default();

        let state = guard.check_session(Some(&session.access_token), &slot).await;

        assert_eq!(state, GuardState::Unauthenticated);
        assert_eq!(slot.count(), 1);
    }

    #[tokio::test]
    async fn test_store_errors_fail_closed() {
        let (store, guard) = setup();
        let user_id = store.add_user("admin@example.com", "pw");
        let session = store.issue_session(&user_id);
        store.fail(StoreOp::GetUser);
        let slot = RedirectSlot::default();

        let state = guard.check_session(Some(&session.access_token), &slot).await;

        assert_eq!(state, GuardState::Unauthenticated);
        assert_eq!(slot.count(), 1);

        store.recover(StoreOp::GetUser);
        store.fail(StoreOp::GetSession);
        assert!(guard.current_user(Some(&session.access_token)).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let (_, guard) = setup();
        let slot = RedirectSlot::default();

        let state = guard.check_session(Some("forged.token.value"), &slot).await;
        assert_eq!(state, GuardState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_repeated_checks_agree() {
        let (store, guard) = setup();
        let user_id = store.add_user("admin@example.com", "pw");
        let session = store.issue_session(&user_id);
        let slot = RedirectSlot::default();

        let first = guard.check_session(Some(&session.access_token), &slot).await;
        let second = guard.check_session(Some(&session.access_token), &slot).await;
        assert_eq!(first, second);

        let first = guard.check_session(None, &slot).await;
        let second = guard.check_session(None, &slot).await;
        assert_eq!(first, second);
    }
}
