//! Outbound mail sender
//!
//! The SMTP transport is constructed once at startup and injected into the
//! dispatcher; nothing here is ambient global state.

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use phishnet_common::config::SmtpConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A fully rendered lure ready for delivery
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Single-target delivery failure.
///
/// Always scoped to one recipient; the dispatcher records it on the target
/// and carries on with the rest of the batch. A collaborator timeout is
/// just another delivery failure.
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Recipient rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Send timed out: {0}")]
    Timeout(String),
}

/// Boundary to the delivery collaborator
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Attempt delivery of one rendered message
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError>;
}

/// SMTP-backed sender (lettre)
pub struct SmtpMailSender {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailSender {
    /// Build the transport from configuration.
    ///
    /// Relay with implicit TLS, STARTTLS, or plaintext for local
    /// development relays.
    pub fn new(config: SmtpConfig) -> Result<Self, DeliveryError> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| DeliveryError::Transport(format!("Failed to create SMTP transport: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DeliveryError::Transport(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder
            .timeout(Some(Duration::from_secs(config.send_timeout_secs)))
            .build();

        Ok(Self { config, transport })
    }

    fn from_mailbox(&self) -> Result<Mailbox, DeliveryError> {
        let raw = match &self.config.from_name {
            Some(name) => format!("{} <{}>", name, self.config.from_address),
            None => self.config.from_address.clone(),
        };
        raw.parse()
            .map_err(|e| DeliveryError::Address(format!("Invalid from address: {}", e)))
    }

    fn classify(error: lettre::transport::smtp::Error) -> DeliveryError {
        let text = error.to_string();
        if text.contains("timed out") || text.contains("timeout") {
            DeliveryError::Timeout(text)
        } else if text.contains("550")
            || text.contains("5.1.1")
            || text.contains("User unknown")
            || text.contains("does not exist")
        {
            DeliveryError::Rejected(text)
        } else {
            DeliveryError::Transport(text)
        }
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let from = self.from_mailbox()?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| DeliveryError::Address(format!("Invalid recipient address: {}", e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.text_body.clone()))
                    .singlepart(SinglePart::html(email.html_body.clone())),
            )
            .map_err(|e| DeliveryError::Build(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(response) => {
                debug!(to = %email.to, "Lure delivered: {:?}", response.code());
                Ok(())
            }
            Err(e) => Err(Self::classify(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mailbox_with_display_name() {
        let sender = SmtpMailSender::new(SmtpConfig {
            from_address: "it-security@example.com".to_string(),
            from_name: Some("IT Security".to_string()),
            use_starttls: false,
            ..SmtpConfig::default()
        })
        .unwrap();

        let mailbox = sender.from_mailbox().unwrap();
        assert_eq!(mailbox.email.to_string(), "it-security@example.com");
    }

    #[test]
    fn test_plaintext_builder_accepts_any_host() {
        // builder_dangerous performs no DNS or TLS setup
        let sender = SmtpMailSender::new(SmtpConfig {
            host: "smtp.internal".to_string(),
            use_starttls: false,
            ..SmtpConfig::default()
        });
        assert!(sender.is_ok());
    }
}
