//! Login: exchange email and password for a session token.

use crate::security::password::{dummy_password_verify, verify_password};
use crate::security::{TokenError, TokenService};
use crate::store::{AccessStore, Identity, StoreError};
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// Unknown email and wrong password are deliberately the same variant.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is not active")]
    Inactive,
    #[error("token issuance failed: {0}")]
    Token(#[from] TokenError),
    #[error("internal failure: {0}")]
    Internal(String),
}

/// Issued session for a verified identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
}

#[derive(Clone)]
pub struct LoginService {
    store: Arc<dyn AccessStore>,
    tokens: Arc<TokenService>,
}

impl LoginService {
    pub fn new(store: Arc<dyn AccessStore>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, LoginError> {
        let password = Zeroizing::new(password.to_string());
        let found = match self.store.find_credentials_by_email(email.trim()).await {
            Ok(found) => Some(found),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                tracing::error!(error = %e, "credential lookup failed");
                return Err(LoginError::Internal(e.to_string()));
            }
        };

        // Same Argon2 cost whether or not the account exists.
        let (identity, verified) = tokio::task::spawn_blocking(move || match found {
            Some((identity, hash)) => {
                let ok = verify_password(&password, &hash);
                (Some(identity), ok)
            }
            None => {
                dummy_password_verify(&password);
                (None, false)
            }
        })
        .await
        .map_err(|e| LoginError::Internal(format!("verification task failed: {e}")))?;

        let Some(identity) = identity.filter(|_| verified) else {
            tracing::debug!("login rejected");
            return Err(LoginError::InvalidCredentials);
        };
        if !identity.is_active {
            tracing::debug!(user_id = identity.id, "login refused for inactive identity");
            return Err(LoginError::Inactive);
        }

        let token = self.tokens.issue(identity.id)?;
        tracing::info!(user_id = identity.id, "session issued");
        Ok(Session { identity, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::security::password::hash_password;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, Arc<TokenService>, LoginService) {
        let store = Arc::new(MemoryStore::with_default_roles());
        let tokens = Arc::new(
            TokenService::new(&TokenConfig {
                secret: "0123456789abcdef0123456789abcdef".into(),
                issuer: "socialgate".into(),
                audience: "socialgate".into(),
                validity_secs: 60,
            })
            .unwrap(),
        );
        let service = LoginService::new(store.clone(), tokens.clone());
        (store, tokens, service)
    }

    #[tokio::test]
    async fn active_identity_gets_a_token() {
        let (store, tokens, service) = setup();
        let hash = hash_password("hunter22").unwrap();
        let alice = store
            .insert_identity("alice", "alice@example.com", &hash, "user", true)
            .unwrap();

        let session = service.login("alice@example.com", "hunter22").await.unwrap();
        assert_eq!(tokens.verify(&session.token), Ok(alice.id));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_alike() {
        let (store, _tokens, service) = setup();
        let hash = hash_password("hunter22").unwrap();
        store
            .insert_identity("alice", "alice@example.com", &hash, "user", true)
            .unwrap();

        assert_eq!(
            service.login("alice@example.com", "wrong").await.unwrap_err(),
            LoginError::InvalidCredentials
        );
        assert_eq!(
            service.login("nobody@example.com", "hunter22").await.unwrap_err(),
            LoginError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn inactive_identity_is_refused() {
        let (store, _tokens, service) = setup();
        let hash = hash_password("hunter22").unwrap();
        store
            .insert_identity("bob", "bob@example.com", &hash, "user", false)
            .unwrap();

        assert_eq!(
            service.login("bob@example.com", "hunter22").await.unwrap_err(),
            LoginError::Inactive
        );
    }
}
