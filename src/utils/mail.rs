// src/utils/mail.rs

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};

use crate::{config::SmtpConfig, error::AppError};

/// Outgoing e-mail seam. Handlers only see this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// Delivers mail through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::InternalServerError(format!("SMTP relay: {}", e)))?
            .credentials(creds)
            .port(config.port)
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

/// Builds the message; address problems are the caller's fault.
fn build_message(from: &str, to: &str, subject: &str, body: &str) -> Result<Message, AppError> {
    Message::builder()
        .from(
            from.parse()
                .map_err(|e| AppError::InternalServerError(format!("Invalid from address: {}", e)))?,
        )
        .to(to
            .parse()
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient address: {}", e)))?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| AppError::InternalServerError(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let email = build_message(&self.from, to, subject, body)?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| AppError::InternalServerError(format!("Failed to send email: {}", e)))
    }
}

/// Fallback when no SMTP relay is configured: the mail goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        tracing::info!(%to, %subject, "SMTP not configured, mail not delivered:\n{}", body);
        Ok(())
    }
}

/// A delivered message, as recorded by `MemoryMailer`.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message in memory. Used by the integration tests to read
/// password reset codes back.
#[derive(Default, Clone)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<SentMail> {
        self.sent().into_iter().rev().find(|mail| mail.to == to)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        sent.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_with_bad_recipient_is_a_bad_request() {
        let result = build_message("Fithub <no-reply@fithub.local>", "not-an-email", "Hi", "Body");
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn message_with_valid_addresses_builds() {
        let result = build_message("Fithub <no-reply@fithub.local>", "cook@example.com", "Hi", "Body");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn memory_mailer_records_messages_in_order() {
        let mailer = MemoryMailer::new();
        mailer.send("a@example.com", "first", "1").await.unwrap();
        mailer.send("b@example.com", "second", "2").await.unwrap();
        mailer.send("a@example.com", "third", "3").await.unwrap();

        assert_eq!(mailer.sent().len(), 3);
        assert_eq!(mailer.last_to("a@example.com").unwrap().subject, "third");
        assert!(mailer.last_to("c@example.com").is_none());
    }
}
