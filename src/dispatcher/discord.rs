use super::NotificationContext;
use crate::error::DispatchError;
use crate::models::EventKind;
use serde_json::json;
use std::time::Duration;

const COLOR_OPENED: u32 = 0xE74C3C; // red
const COLOR_RESOLVED: u32 = 0x2ECC71; // green

/// Discord webhook payload (spec §6): an `embeds` array with a colour-coded
/// status and labelled fields.
pub async fn send(client: &reqwest::Client, url: &str, ctx: &NotificationContext, timeout: Duration) -> Result<(), DispatchError> {
    let color = match ctx.kind {
        EventKind::IncidentOpened => COLOR_OPENED,
        EventKind::IncidentResolved => COLOR_RESOLVED,
    };

    let mut fields = vec![
        json!({ "name": "Monitor", "value": ctx.monitor_name, "inline": true }),
        json!({ "name": "Status", "value": ctx.status_str(), "inline": true }),
        json!({ "name": "Rule", "value": ctx.rule_name, "inline": true }),
    ];
    if let Some(duration) = ctx.duration_human() {
        fields.push(json!({ "name": "Duration", "value": duration, "inline": true }));
    }

    let body = json!({
        "embeds": [{
            "title": ctx.message(),
            "url": ctx.monitor_url,
            "color": color,
            "fields": fields,
            "timestamp": ctx.timestamp.to_rfc3339(),
        }]
    });

    let response = client.post(url).json(&body).timeout(timeout).send().await.map_err(classify)?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(DispatchError::Transport(format!("discord webhook returned {}", response.status())))
    }
}

fn classify(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Transport(e.to_string())
    }
}
