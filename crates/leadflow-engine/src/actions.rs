//! Action handlers — the pluggable side-effect layer of the engine.
//!
//! Each [`ActionKind`] maps to one handler. The defaults here either
//! perform the effect directly (webhook, wait) or stand in for the queue
//! subsystem, which replaces `send_email` / `post_to_social` at wiring time
//! with handlers that enqueue a job instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use leadflow_core::{LeadflowError, Result};

use crate::model::ActionKind;

/// An executable action. Receives the action's config and the execution's
/// current merged data; returns a map merged back into that data so later
/// actions see it.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, config: Value, data: Value) -> Result<Value>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Value, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn execute(&self, config: Value, data: Value) -> Result<Value> {
        (self.f)(config, data).await
    }
}

/// Wrap an async closure as an [`ActionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ActionHandler>
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Build the default handler table for every [`ActionKind`].
pub fn default_handlers() -> HashMap<ActionKind, Arc<dyn ActionHandler>> {
    let mut handlers: HashMap<ActionKind, Arc<dyn ActionHandler>> = HashMap::new();

    handlers.insert(
        ActionKind::SendEmail,
        handler_fn(|config, data| async move {
            let template = config["template"].as_str().unwrap_or("default");
            let to = data["email"].as_str().unwrap_or("");
            tracing::info!("📧 send_email: template '{template}' to '{to}'");
            Ok(json!({"emailSent": true, "emailTemplate": template}))
        }),
    );

    handlers.insert(
        ActionKind::CreateTask,
        handler_fn(|config, _data| async move {
            let title = config["title"].as_str().unwrap_or("Follow up");
            tracing::info!("📝 create_task: '{title}'");
            Ok(json!({"taskCreated": true, "taskTitle": title}))
        }),
    );

    handlers.insert(
        ActionKind::UpdateLead,
        handler_fn(|config, data| async move {
            let lead_id = data["leadId"].as_str().unwrap_or("");
            tracing::info!("👤 update_lead: '{lead_id}' fields {}", config);
            Ok(json!({"leadUpdated": true}))
        }),
    );

    handlers.insert(
        ActionKind::PostToSocial,
        handler_fn(|config, _data| async move {
            let platform = config["platform"].as_str().unwrap_or("unknown");
            tracing::info!("📣 post_to_social: platform '{platform}'");
            Ok(json!({"postQueued": true}))
        }),
    );

    handlers.insert(
        ActionKind::SendNotification,
        handler_fn(|config, _data| async move {
            let message = config["message"].as_str().unwrap_or("");
            tracing::info!("🔔 send_notification: {message}");
            Ok(json!({"notificationSent": true}))
        }),
    );

    handlers.insert(ActionKind::CallWebhook, handler_fn(call_webhook));

    handlers.insert(
        ActionKind::Wait,
        handler_fn(|config, _data| async move {
            let ms = config["duration_ms"].as_u64().unwrap_or(0);
            if ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
            Ok(json!({}))
        }),
    );

    handlers
}

/// POST the execution data to the configured URL.
async fn call_webhook(config: Value, data: Value) -> Result<Value> {
    let url = config["url"]
        .as_str()
        .ok_or_else(|| LeadflowError::Workflow("call_webhook: missing 'url'".into()))?
        .to_string();

    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&data)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| LeadflowError::Workflow(format!("Webhook send failed: {e}")))?;

    let status = resp.status();
    if status.is_success() {
        tracing::info!("✅ Webhook called: {url} ({status})");
        Ok(json!({"webhookCalled": true, "webhookStatus": status.as_u16()}))
    } else {
        Err(LeadflowError::Workflow(format!("Webhook error {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_send_email_output() {
        let handlers = default_handlers();
        let handler = handlers.get(&ActionKind::SendEmail).unwrap();
        let out = handler
            .execute(
                json!({"template": "welcome"}),
                json!({"email": "a@b.com"}),
            )
            .await
            .unwrap();
        assert_eq!(out["emailSent"], true);
        assert_eq!(out["emailTemplate"], "welcome");
    }

    #[tokio::test]
    async fn test_handler_fn_closure_override() {
        let handler = handler_fn(|_config, data| async move {
            Ok(json!({"seenLead": data["leadId"].clone()}))
        });
        let out = handler
            .execute(json!({}), json!({"leadId": "l1"}))
            .await
            .unwrap();
        assert_eq!(out["seenLead"], "l1");
    }

    #[tokio::test]
    async fn test_webhook_missing_url_is_error() {
        let err = call_webhook(json!({}), json!({})).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Workflow(_)));
    }
}
