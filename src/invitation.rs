//! Invitation lifecycle: registration with a one-time activation token.
//!
//! Registration stores an inactive identity together with the SHA-256 hash
//! of a freshly generated token. The plaintext token is handed back to the
//! caller for out-of-band delivery and is never persisted. Redeeming the
//! token flips the identity active and deletes the invitation, so each
//! token activates at most once.
//!
//! Unknown, expired and already-consumed tokens all surface as `NotFound`.

use crate::security::password::hash_password;
use crate::store::{AccessStore, Identity, NewIdentity, StoreError};
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;
use zeroize::Zeroizing;

/// Length of the plaintext activation token.
pub const TOKEN_LENGTH: usize = 48;

/// Role given to every newly registered identity.
pub const DEFAULT_ROLE: &str = "user";

const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 3;
const MAX_PASSWORD_LEN: usize = 72;

/// Invitation lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvitationError {
    #[error("invalid registration: {0}")]
    InvalidDraft(String),
    #[error("email already exists")]
    DuplicateEmail,
    #[error("username already exists")]
    DuplicateUsername,
    #[error("invitation not found")]
    NotFound,
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<StoreError> for InvitationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::DuplicateUsername => Self::DuplicateUsername,
            StoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// Registration input. The password is wiped from memory on drop.
#[derive(Clone)]
pub struct RegistrationDraft {
    pub username: String,
    pub email: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for RegistrationDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationDraft")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl RegistrationDraft {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Check field presence, lengths and email shape.
    pub fn validate(&self) -> Result<(), InvitationError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(InvitationError::InvalidDraft("username is required".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(InvitationError::InvalidDraft(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            )));
        }

        let email = self.email.trim();
        if email.is_empty() {
            return Err(InvitationError::InvalidDraft("email is required".into()));
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(InvitationError::InvalidDraft(format!(
                "email must be at most {MAX_EMAIL_LEN} characters"
            )));
        }
        if !email_shape().is_some_and(|re| re.is_match(email)) {
            return Err(InvitationError::InvalidDraft("email is not a valid address".into()));
        }

        let password_len = self.password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password_len) {
            return Err(InvitationError::InvalidDraft(format!(
                "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

fn email_shape() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

/// Result of a successful registration.
#[derive(Clone)]
pub struct IssuedInvitation {
    /// The inactive identity as committed.
    pub identity: Identity,
    /// Plaintext token. Deliver it and drop it; only its hash is stored.
    pub token: Zeroizing<String>,
    pub expires_at: i64,
}

impl std::fmt::Debug for IssuedInvitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedInvitation")
            .field("identity_id", &self.identity.id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh random plaintext token.
pub fn generate_token() -> Zeroizing<String> {
    Zeroizing::new(
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect(),
    )
}

/// Lowercase hex SHA-256 of a plaintext token.
pub fn hash_token(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Registers identities and redeems their invitations.
#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn AccessStore>,
}

impl std::fmt::Debug for InvitationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvitationService").finish_non_exhaustive()
    }
}

impl InvitationService {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Persist an inactive identity and its invitation atomically.
    ///
    /// Uniqueness conflicts come from the store's constraint check rather
    /// than a pre-check, so concurrent registrations cannot both succeed.
    pub async fn register_and_invite(
        &self,
        draft: &RegistrationDraft,
        validity: Duration,
    ) -> Result<IssuedInvitation, InvitationError> {
        draft.validate()?;

        let span = crate::telemetry::spans::invitation("register");
        async {
            // Argon2 is CPU-bound; keep it off the async workers.
            let password_hash = tokio::task::spawn_blocking({
                let password = draft.password.clone();
                move || hash_password(&password)
            })
            .await
            .map_err(|e| InvitationError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| InvitationError::Internal(format!("password hashing failed: {e}")))?;

            let token = generate_token();
            let validity = i64::try_from(validity.as_secs()).unwrap_or(i64::MAX);
            let expires_at = chrono::Utc::now().timestamp().saturating_add(validity);

            let new_identity = NewIdentity {
                username: draft.username.trim().to_string(),
                email: draft.email.trim().to_string(),
                password_hash,
                role_name: DEFAULT_ROLE.to_string(),
            };

            let identity = self
                .store
                .create_identity_and_invitation(&new_identity, &hash_token(&token), expires_at)
                .await
                .map_err(|e| {
                    match &e {
                        StoreError::Internal(detail) => {
                            tracing::error!(error = %detail, "registration transaction failed")
                        }
                        other => tracing::debug!(reason = %other, "registration conflict"),
                    }
                    InvitationError::from(e)
                })?;

            crate::metrics::record_invitation_issued();
            tracing::info!(user_id = identity.id, expires_at, "invitation issued");

            Ok(IssuedInvitation {
                identity,
                token,
                expires_at,
            })
        }
        .instrument(span)
        .await
    }

    /// Redeem a plaintext token and activate its identity.
    pub async fn activate(&self, token: &str) -> Result<Identity, InvitationError> {
        let span = crate::telemetry::spans::invitation("activate");
        async {
            let now = chrono::Utc::now().timestamp();
            let pending = self
                .store
                .find_unconsumed_invitation(&hash_token(token), now)
                .await
                .map_err(|e| {
                    if let StoreError::Internal(detail) = &e {
                        tracing::error!(error = %detail, "invitation lookup failed");
                    }
                    InvitationError::from(e)
                })?;

            self.store
                .activate_and_consume(pending.identity.id, pending.invitation_id)
                .await
                .map_err(|e| {
                    match &e {
                        StoreError::NotFound => {
                            tracing::debug!(user_id = pending.identity.id, "invitation consumed concurrently")
                        }
                        other => tracing::error!(error = %other, "activation transaction failed"),
                    }
                    InvitationError::from(e)
                })?;

            crate::metrics::record_activation();
            tracing::info!(user_id = pending.identity.id, "identity activated");

            let mut identity = pending.identity;
            identity.is_active = true;
            Ok(identity)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::password::verify_password;
    use crate::store::MemoryStore;

    const VALIDITY: Duration = Duration::from_secs(3 * 24 * 60 * 60);

    fn service() -> (Arc<MemoryStore>, InvitationService) {
        let store = Arc::new(MemoryStore::with_default_roles());
        let service = InvitationService::new(store.clone());
        (store, service)
    }

    fn draft(username: &str, email: &str) -> RegistrationDraft {
        RegistrationDraft::new(username, email, "hunter22")
    }

    #[test]
    fn token_hash_is_lowercase_hex_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert_ne!(*a, *b);
    }

    #[test]
    fn draft_validation() {
        assert!(draft("alice", "alice@example.com").validate().is_ok());
        for bad in [
            draft("", "alice@example.com"),
            draft(&"a".repeat(101), "alice@example.com"),
            draft("alice", ""),
            draft("alice", "not-an-email"),
            draft("alice", &format!("{}@example.com", "a".repeat(250))),
            RegistrationDraft::new("alice", "alice@example.com", "ab"),
            RegistrationDraft::new("alice", "alice@example.com", "x".repeat(73)),
        ] {
            assert!(matches!(bad.validate(), Err(InvitationError::InvalidDraft(_))), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn registration_stores_only_the_hash() {
        let (store, service) = service();
        let issued = service
            .register_and_invite(&draft("alice", "alice@example.com"), VALIDITY)
            .await
            .unwrap();

        let hashes = store.invitation_hashes();
        assert_eq!(hashes, vec![hash_token(&issued.token)]);
        assert!(!hashes.contains(&issued.token.to_string()));

        let identity = store.find_identity_by_id(issued.identity.id).await.unwrap();
        assert!(!identity.is_active);
        assert_eq!(identity.role.name, DEFAULT_ROLE);

        let stored = store.password_hash_of(issued.identity.id).unwrap();
        assert!(verify_password("hunter22", &stored));
    }

    #[tokio::test]
    async fn activation_is_exactly_once() {
        let (store, service) = service();
        let issued = service
            .register_and_invite(&draft("alice", "alice@example.com"), VALIDITY)
            .await
            .unwrap();

        let identity = service.activate(&issued.token).await.unwrap();
        assert!(identity.is_active);
        assert!(store.find_identity_by_id(issued.identity.id).await.unwrap().is_active);
        assert_eq!(store.invitation_count(), 0);

        assert_eq!(service.activate(&issued.token).await, Err(InvitationError::NotFound));
    }

    #[tokio::test]
    async fn unknown_and_expired_tokens_are_not_found() {
        let (_store, service) = service();
        assert_eq!(service.activate("nope").await, Err(InvitationError::NotFound));

        let issued = service
            .register_and_invite(&draft("bob", "bob@example.com"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(service.activate(&issued.token).await, Err(InvitationError::NotFound));
    }

    #[tokio::test]
    async fn duplicate_email_creates_no_row() {
        let (store, service) = service();
        service
            .register_and_invite(&draft("alice", "alice@example.com"), VALIDITY)
            .await
            .unwrap();

        let err = service
            .register_and_invite(&draft("alice2", "ALICE@example.com"), VALIDITY)
            .await
            .unwrap_err();
        assert_eq!(err, InvitationError::DuplicateEmail);
        assert_eq!(store.identity_count(), 1);
        assert_eq!(store.invitation_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_reported() {
        let (_store, service) = service();
        service
            .register_and_invite(&draft("alice", "alice@example.com"), VALIDITY)
            .await
            .unwrap();
        let err = service
            .register_and_invite(&draft("alice", "other@example.com"), VALIDITY)
            .await
            .unwrap_err();
        assert_eq!(err, InvitationError::DuplicateUsername);
    }

    #[tokio::test]
    async fn failed_invitation_write_leaves_nothing() {
        let (store, service) = service();
        store.fail_invitation_writes(true);

        let err = service
            .register_and_invite(&draft("alice", "alice@example.com"), VALIDITY)
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::Internal(_)));
        assert_eq!(store.identity_count(), 0);
        assert_eq!(store.invitation_count(), 0);
    }

    #[tokio::test]
    async fn invalid_draft_never_reaches_storage() {
        let (store, service) = service();
        let err = service
            .register_and_invite(&draft("alice", "bad"), VALIDITY)
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::InvalidDraft(_)));
        assert_eq!(store.identity_count(), 0);
    }
}
