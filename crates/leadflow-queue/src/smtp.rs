//! SMTP-backed [`EmailSender`] using async lettre. Works with Gmail,
//! Outlook, or any STARTTLS relay.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor,
    message::Mailbox, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};

use leadflow_core::{
    EmailMessage, EmailSender, LeadflowError, ProviderReceipt, Result, SmtpConfig,
};

/// Sends mail through the configured SMTP relay.
pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| LeadflowError::Provider(format!("SMTP relay: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self { mailer })
    }
}

fn build_message(message: &EmailMessage) -> Result<LettreMessage> {
    let from_mailbox: Mailbox = format!("{} <{}>", message.from_name, message.from_email)
        .parse()
        .map_err(|e| LeadflowError::Provider(format!("Invalid from: {e}")))?;
    let to_mailbox: Mailbox = message
        .to
        .parse()
        .map_err(|e| LeadflowError::Provider(format!("Invalid to: {e}")))?;

    LettreMessage::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(&message.subject)
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|e| LeadflowError::Provider(format!("Build email: {e}")))
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<ProviderReceipt> {
        let email = build_message(message)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| LeadflowError::Provider(format!("SMTP send: {e}")))?;
        tracing::info!("📤 Email sent to: {}", message.to);
        Ok(ProviderReceipt {
            provider_id: uuid::Uuid::new_v4().to_string(),
            url: None,
        })
    }
}
