use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::MailConfig;
use crate::intake::{EmailMessage, Mailer, NotificationError};

/// Development mailer: logs the envelope instead of delivering.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html_body.len(),
            "email captured by log mailer"
        );
        Ok(())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, NotificationError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|_| NotificationError::Address(raw.to_string()))
}

/// Render an [`EmailMessage`] as an HTML MIME message.
pub fn build_message(from: &Mailbox, message: &EmailMessage) -> Result<Message, NotificationError> {
    Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&message.to)?)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(message.html_body.clone())
        .map_err(|error| NotificationError::Message(error.to_string()))
}

/// SMTP relay mailer using STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|error| NotificationError::Transport(error.to_string()))?
            .port(port)
            .timeout(Some(timeout));
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(from)?,
        })
    }

    pub fn from_config(config: &MailConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::Transport("SMTP host is not configured".into()))?;
        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        };
        Self::new(
            host,
            config.smtp_port,
            credentials,
            &config.from,
            config.timeout,
        )
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let email = build_message(&self.from, &message)?;
        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|error| NotificationError::Transport(error.to_string()))
    }
}
