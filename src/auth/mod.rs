//! Sessions and identity.
//!
//! Session tokens are opaque UUIDs held in the shared app state and resolved
//! per request from the `Authorization: Bearer` header. There is no
//! process-wide current-user; each handler resolves its own caller.

use tokio::sync::RwLock;
use std::collections::HashMap;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::store::Store;
use crate::types::{is_valid_name, Account, StudentId, TattaError};

// ---------------------------------------------------------------------------
// Session registry
// ---------------------------------------------------------------------------

/// Token → account id. Tokens survive until logout or process restart.
#[derive(Default)]
pub struct Sessions {
    tokens: RwLock<HashMap<Uuid, Uuid>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh token bound to `account_id`.
    pub async fn issue(&self, account_id: Uuid) -> Uuid {
        let token = Uuid::new_v4();
        self.tokens.write().await.insert(token, account_id);
        token
    }

    /// Resolve a token to the account it was issued for.
    pub async fn resolve(&self, token: Uuid) -> Option<Uuid> {
        self.tokens.read().await.get(&token).copied()
    }

    /// Invalidate a token. Returns whether it existed.
    pub async fn revoke(&self, token: Uuid) -> bool {
        self.tokens.write().await.remove(&token).is_some()
    }
}

// ---------------------------------------------------------------------------
// Auth operations
// ---------------------------------------------------------------------------

pub struct AuthEngine;

impl AuthEngine {
    /// Register a new account and log it in.
    ///
    /// `admin` is decided by the caller (config-listed identities); the
    /// name/number formats are validated here, duplicates are rejected by
    /// the store.
    pub async fn signup(
        store: &Store,
        sessions: &Sessions,
        name: &str,
        number: &str,
        password: &str,
        admin: bool,
        starting_balance: Decimal,
    ) -> Result<(Account, Uuid), TattaError> {
        if !is_valid_name(name) {
            return Err(TattaError::Validation(
                "name must be 2-4 Hangul syllables".into(),
            ));
        }
        let number: StudentId = number.parse()?;

        let account = store
            .create_account(name, number, password, admin, starting_balance)
            .await?;
        let token = sessions.issue(account.id).await;

        info!(%number, name, admin, "Account created");
        Ok((account, token))
    }

    /// Credential check. Failures never reveal which field was wrong.
    pub async fn login(
        store: &Store,
        sessions: &Sessions,
        name: &str,
        number: &str,
        password: &str,
    ) -> Result<(Account, Uuid), TattaError> {
        let number: StudentId = number
            .parse()
            .map_err(|_| TattaError::Unauthorized("incorrect name, number, or password".into()))?;

        let account = store
            .find_by_identity(name, number)
            .await
            .filter(|a| a.password == password)
            .ok_or_else(|| {
                TattaError::Unauthorized("incorrect name, number, or password".into())
            })?;

        let token = sessions.issue(account.id).await;
        info!(%number, name, "Logged in");
        Ok((account, token))
    }

    /// Revoke a session token.
    pub async fn logout(sessions: &Sessions, token: Uuid) {
        sessions.revoke(token).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_sessions_issue_resolve_revoke() {
        let sessions = Sessions::new();
        let account_id = Uuid::new_v4();

        let token = sessions.issue(account_id).await;
        assert_eq!(sessions.resolve(token).await, Some(account_id));

        assert!(sessions.revoke(token).await);
        assert_eq!(sessions.resolve(token).await, None);
        assert!(!sessions.revoke(token).await);
    }

    #[tokio::test]
    async fn test_signup_issues_session() {
        let store = Store::in_memory();
        let sessions = Sessions::new();

        let (account, token) =
            AuthEngine::signup(&store, &sessions, "홍길동", "1101", "pw", false, dec!(5000))
                .await
                .unwrap();
        assert_eq!(sessions.resolve(token).await, Some(account.id));
        assert_eq!(account.balance, dec!(5000));
        assert!(!account.admin);
    }

    #[tokio::test]
    async fn test_signup_validates_name_and_number() {
        let store = Store::in_memory();
        let sessions = Sessions::new();

        let err = AuthEngine::signup(&store, &sessions, "John", "1101", "pw", false, dec!(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Validation(_)));

        let err = AuthEngine::signup(&store, &sessions, "홍길동", "9999", "pw", false, dec!(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_signup_duplicate_identity() {
        let store = Store::in_memory();
        let sessions = Sessions::new();

        AuthEngine::signup(&store, &sessions, "홍길동", "1101", "pw", false, dec!(5000))
            .await
            .unwrap();
        let err = AuthEngine::signup(&store, &sessions, "홍길동", "1101", "pw2", false, dec!(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::StateConflict(_)));
    }

    #[tokio::test]
    async fn test_login_success_and_failure() {
        let store = Store::in_memory();
        let sessions = Sessions::new();
        AuthEngine::signup(&store, &sessions, "홍길동", "1101", "secret", false, dec!(5000))
            .await
            .unwrap();

        let (account, token) =
            AuthEngine::login(&store, &sessions, "홍길동", "1101", "secret").await.unwrap();
        assert_eq!(sessions.resolve(token).await, Some(account.id));

        let err = AuthEngine::login(&store, &sessions, "홍길동", "1101", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Unauthorized(_)));

        let err = AuthEngine::login(&store, &sessions, "김수", "1101", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Unauthorized(_)));

        // Malformed number reads as bad credentials, not a validation hint.
        let err = AuthEngine::login(&store, &sessions, "홍길동", "abcd", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_logout_revokes() {
        let store = Store::in_memory();
        let sessions = Sessions::new();
        let (_, token) =
            AuthEngine::signup(&store, &sessions, "홍길동", "1101", "pw", false, dec!(5000))
                .await
                .unwrap();

        AuthEngine::logout(&sessions, token).await;
        assert_eq!(sessions.resolve(token).await, None);
    }
}
