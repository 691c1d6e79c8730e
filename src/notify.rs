//! Completion notifications: the capability contract plus a Brevo
//! transactional-email implementation.
//!
//! Delivery treats notification as strictly best-effort — a failure here is
//! logged by the caller and never invalidates a successful upload — so the
//! trait surface is the minimal `send` the pipeline needs.

use crate::error::QuizError;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// Abstract notification capability consumed by delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), QuizError>;
}

/// Transactional email via the Brevo SMTP API.
pub struct BrevoNotifier {
    client: reqwest::Client,
    api_key: String,
    from_name: String,
    from_email: String,
}

impl BrevoNotifier {
    const ENDPOINT: &'static str = "https://api.brevo.com/v3/smtp/email";

    pub fn new(
        api_key: impl Into<String>,
        from_name: impl Into<String>,
        from_email: impl Into<String>,
    ) -> Result<Self, QuizError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| QuizError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            from_name: from_name.into(),
            from_email: from_email.into(),
        })
    }

    /// Construct from `BREVO_API_KEY`, with optional `BREVO_FROM_NAME` and
    /// `BREVO_FROM_EMAIL` overrides.
    pub fn from_env() -> Result<Self, QuizError> {
        let api_key = std::env::var("BREVO_API_KEY")
            .map_err(|_| QuizError::InvalidConfig("BREVO_API_KEY is not set".into()))?;
        let from_name =
            std::env::var("BREVO_FROM_NAME").unwrap_or_else(|_| "Quiz Generator".to_string());
        let from_email = std::env::var("BREVO_FROM_EMAIL")
            .unwrap_or_else(|_| "quiz@example.com".to_string());
        Self::new(api_key, from_name, from_email)
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), QuizError> {
        debug!("Sending notification to {}", to);

        let payload = json!({
            "to": [{ "email": to }],
            "subject": subject,
            "htmlContent": html_body,
            "sender": {
                "name": self.from_name,
                "email": self.from_email,
            },
        });

        let response = self
            .client
            .post(Self::ENDPOINT)
            .header("api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| QuizError::Notification {
                to: to.to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(QuizError::Notification {
                to: to.to_string(),
                detail: format!("HTTP {}", response.status()),
            });
        }

        info!("Notification dispatched to {}", to);
        Ok(())
    }
}
