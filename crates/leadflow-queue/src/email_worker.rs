//! Email job processor: resolves the message against its campaign and
//! hands it to the configured [`EmailSender`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use leadflow_core::{
    EmailMessage, EmailSender, LeadflowError, RecordStore, Result, SmtpConfig,
    require_campaign,
};

use crate::job::Job;
use crate::worker::JobProcessor;

/// Payload of an email job. Subject and body may be inlined or resolved
/// from the campaign at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJobData {
    pub to: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
}

/// Turns queued email jobs into provider sends.
pub struct EmailProcessor {
    store: Arc<dyn RecordStore>,
    sender: Arc<dyn EmailSender>,
    from_name: String,
    from_email: String,
}

impl EmailProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sender: Arc<dyn EmailSender>,
        smtp: &SmtpConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sender,
            from_name: smtp.from_name.clone(),
            from_email: smtp.from_email.clone(),
        })
    }

    async fn resolve(&self, data: EmailJobData) -> Result<EmailMessage> {
        let mut subject = data.subject;
        let mut body = data.body;
        let mut from_name = self.from_name.clone();
        let mut from_email = self.from_email.clone();

        if let Some(campaign_id) = &data.campaign_id {
            if subject.is_none() || body.is_none() {
                let campaign = require_campaign(self.store.as_ref(), campaign_id).await?;
                subject.get_or_insert(campaign.subject);
                body.get_or_insert(campaign.body);
                if !campaign.from_email.is_empty() {
                    from_name = campaign.from_name;
                    from_email = campaign.from_email;
                }
            }
        }

        Ok(EmailMessage {
            to: data.to,
            subject: subject.unwrap_or_default(),
            body: body.unwrap_or_default(),
            from_name,
            from_email,
            campaign_id: data.campaign_id,
        })
    }
}

#[async_trait]
impl JobProcessor for EmailProcessor {
    async fn process(&self, job: &Job) -> Result<()> {
        let data: EmailJobData = serde_json::from_value(job.payload.clone())
            .map_err(|e| LeadflowError::Queue(format!("Bad email payload: {e}")))?;
        let to = data.to.clone();

        let message = self.resolve(data).await?;
        let receipt = self.sender.send(&message).await?;
        tracing::info!(
            "📧 Email sent to {} (provider id {})",
            to,
            receipt.provider_id
        );
        Ok(())
    }
}
