use super::NotificationContext;
use crate::error::DispatchError;
use serde_json::json;
use std::time::Duration;

/// Generic webhook payload (spec §6): a flat JSON body understood by any
/// HTTP endpoint. Success is a 2xx response.
pub async fn send(client: &reqwest::Client, url: &str, ctx: &NotificationContext, timeout: Duration) -> Result<(), DispatchError> {
    let body = json!({
        "incident_id": ctx.incident_id,
        "monitor_name": ctx.monitor_name,
        "monitor_url": ctx.monitor_url,
        "status": ctx.status_str(),
        "message": ctx.message(),
        "timestamp": ctx.timestamp.to_rfc3339(),
    });

    let response = client
        .post(url)
        .json(&body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(e))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(DispatchError::Transport(format!("webhook returned {}", response.status())))
    }
}

fn classify(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Transport(e.to_string())
    }
}
