//! In-process test server.

use async_trait::async_trait;
use parking_lot::Mutex;
use socialgate::config::Config;
use socialgate::http::{self, AppState};
use socialgate::mailer::{MailError, Mailer, TemplateData, render};
use socialgate::security::RateLimitManager;
use socialgate::store::MemoryStore;
use std::sync::Arc;

pub const OPERATOR_USER: &str = "admin";
pub const OPERATOR_PASSWORD: &str = "operator-secret";
pub const ACTIVATION_BASE: &str = "http://localhost:4000/confirm";

/// A sent message as seen by the mail collaborator.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub template: String,
    pub recipient: String,
    pub data: TemplateData,
}

/// Mailer that renders and keeps every message.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: Mutex<bool>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    pub fn fail_deliveries(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// Plaintext token from the most recent activation link sent to `recipient`.
    pub fn activation_token_for(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|mail| mail.recipient == recipient)
            .and_then(|mail| mail.data.get("activation_url").cloned())
            .and_then(|url| url.rsplit('/').next().map(str::to_string))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        template_key: &str,
        recipient: &str,
        data: &TemplateData,
    ) -> Result<(), MailError> {
        render(template_key, data)?;
        if *self.fail.lock() {
            return Err(MailError::Delivery("smtp unavailable".into()));
        }
        self.sent.lock().push(SentMail {
            template: template_key.to_string(),
            recipient: recipient.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}

pub fn test_config(rate_limiter: &str) -> Config {
    Config::from_toml(&format!(
        r#"
[server]
environment = "test"

[auth.basic]
username = "{OPERATOR_USER}"
password = "{OPERATOR_PASSWORD}"

[auth.token]
secret = "0123456789abcdef0123456789abcdef"
validity_secs = 3600

[mail]
activation_url = "{ACTIVATION_BASE}"

[rate_limiter]
{rate_limiter}
"#
    ))
    .expect("test config parses")
}

/// Router plus handles on its collaborators.
pub struct TestServer {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
}

impl TestServer {
    /// Server with the admission limiter disabled.
    pub fn new() -> Self {
        Self::with_config(test_config("enabled = false"))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::with_default_roles());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(Arc::new(config), store.clone(), store.clone(), mailer.clone())
            .expect("token service builds");
        Self {
            store,
            mailer,
            state,
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimitManager) -> Self {
        self.state = self.state.with_limiter(limiter);
        self
    }

    pub fn router(&self) -> axum::Router {
        http::router(self.state.clone())
    }

    /// Issue a session token for an identity directly.
    pub fn token_for(&self, identity_id: i64) -> String {
        self.state.tokens.issue(identity_id).expect("token issues")
    }
}
