//! Authentication collaborator for the cart store.
//!
//! The cart store never logs anyone in. It only reads the current bearer
//! token (to scope requests) and the current user id (to detect a switch of
//! user between operations) from whatever implements [`AuthProvider`].

use std::sync::{PoisonError, RwLock};

use grocer_core::UserId;
use secrecy::SecretString;
use serde_json::Value;

/// Source of the bearer token and user identity for cart requests.
pub trait AuthProvider: Send + Sync {
    /// Current bearer token, if logged in.
    fn token(&self) -> Option<SecretString>;

    /// Identifier of the current user, if known.
    fn user_id(&self) -> Option<UserId>;
}

/// In-memory auth state, shared between the login flow and the cart store.
///
/// The user object is kept as the raw JSON the auth backend returned. Its id
/// lives under `id` on some backends and `_id` on others.
#[derive(Debug, Default)]
pub struct AuthSession {
    inner: RwLock<AuthSessionInner>,
}

#[derive(Debug, Default)]
struct AuthSessionInner {
    token: Option<SecretString>,
    user: Option<Value>,
}

impl AuthSession {
    /// Create a logged-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that is already logged in.
    #[must_use]
    pub fn logged_in(token: SecretString, user: Value) -> Self {
        let session = Self::new();
        session.login(token, user);
        session
    }

    /// Store a token and user after a successful login.
    pub fn login(&self, token: SecretString, user: Value) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.token = Some(token);
        inner.user = Some(user);
    }

    /// Replace the user object, keeping the token.
    pub fn set_user(&self, user: Value) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user = Some(user);
    }

    /// Forget the token and user.
    pub fn logout(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.token = None;
        inner.user = None;
    }
}

impl AuthProvider for AuthSession {
    fn token(&self) -> Option<SecretString> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    fn user_id(&self) -> Option<UserId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .as_ref()
            .and_then(user_id_from_json)
    }
}

/// Extract the user id from a user object (`id`, falling back to `_id`).
#[must_use]
pub fn user_id_from_json(user: &Value) -> Option<UserId> {
    ["id", "_id"]
        .iter()
        .find_map(|key| user.get(key).and_then(UserId::from_json))
}
