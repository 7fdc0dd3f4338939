//! Mail collaborator contract.
//!
//! The registration route hands the activation link to a [`Mailer`]. Actual
//! delivery is external; [`SandboxMailer`] renders the message and logs it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Template sent after registration.
pub const USER_INVITATION_TEMPLATE: &str = "user_invitation";

/// Mail delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
    #[error("missing template field: {0}")]
    MissingField(&'static str),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Template data, keyed by placeholder name.
pub type TemplateData = BTreeMap<&'static str, String>;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        template_key: &str,
        recipient: &str,
        data: &TemplateData,
    ) -> Result<(), MailError>;
}

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub body: String,
}

/// Render a known template.
pub fn render(template_key: &str, data: &TemplateData) -> Result<RenderedMail, MailError> {
    match template_key {
        USER_INVITATION_TEMPLATE => {
            let username = data.get("username").ok_or(MailError::MissingField("username"))?;
            let url = data
                .get("activation_url")
                .ok_or(MailError::MissingField("activation_url"))?;
            Ok(RenderedMail {
                subject: "Finish registration with Socialgate".to_string(),
                body: format!(
                    "Hi {username},\n\nThanks for signing up. Activate your account here:\n{url}\n\nIf you did not sign up, ignore this email."
                ),
            })
        }
        other => Err(MailError::UnknownTemplate(other.to_string())),
    }
}

/// Mailer that renders and logs instead of delivering.
#[derive(Debug, Clone)]
pub struct SandboxMailer {
    from_email: String,
}

impl SandboxMailer {
    pub fn new(from_email: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
        }
    }
}

#[async_trait]
impl Mailer for SandboxMailer {
    async fn send(
        &self,
        template_key: &str,
        recipient: &str,
        data: &TemplateData,
    ) -> Result<(), MailError> {
        let mail = render(template_key, data)?;
        // Body carries the activation token; keep it out of default logs.
        tracing::info!(from = %self.from_email, to = %recipient, subject = %mail.subject, "sandbox mail");
        tracing::trace!(body = %mail.body, "sandbox mail body");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation_data() -> TemplateData {
        TemplateData::from([
            ("username", "alice".to_string()),
            ("activation_url", "http://localhost:4000/confirm/abc".to_string()),
        ])
    }

    #[test]
    fn renders_invitation() {
        let mail = render(USER_INVITATION_TEMPLATE, &invitation_data()).unwrap();
        assert!(mail.body.contains("Hi alice"));
        assert!(mail.body.contains("http://localhost:4000/confirm/abc"));
    }

    #[test]
    fn missing_field_and_unknown_template() {
        assert_eq!(
            render(USER_INVITATION_TEMPLATE, &TemplateData::new()),
            Err(MailError::MissingField("username"))
        );
        assert_eq!(
            render("password_reset", &invitation_data()),
            Err(MailError::UnknownTemplate("password_reset".into()))
        );
    }

    #[tokio::test]
    async fn sandbox_accepts_known_templates() {
        let mailer = SandboxMailer::new("noreply@example.com");
        assert!(mailer
            .send(USER_INVITATION_TEMPLATE, "alice@example.com", &invitation_data())
            .await
            .is_ok());
        assert!(mailer.send("nope", "alice@example.com", &invitation_data()).await.is_err());
    }
}
