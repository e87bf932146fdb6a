use super::NotificationContext;
use crate::error::DispatchError;
use crate::models::ChannelConfig;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// Sends an incident notification over SMTP (spec §6: CRLF line endings are
/// `lettre`'s default wire behaviour). Unauthenticated when `smtp_user` is
/// empty or absent.
pub async fn send(config: &ChannelConfig, ctx: &NotificationContext, timeout: Duration) -> Result<(), DispatchError> {
    let ChannelConfig::Email { smtp_host, smtp_port, smtp_user, smtp_password, smtp_from, recipients } = config else {
        return Err(DispatchError::ConfigError("email channel invoked with non-email config".into()));
    };

    let from: Mailbox = smtp_from.parse().map_err(|e| DispatchError::ConfigError(format!("invalid smtp_from: {e}")))?;

    let mut builder = Message::builder().from(from).subject(ctx.message());
    for recipient in recipients {
        let mailbox: Mailbox = recipient.parse().map_err(|e| DispatchError::ConfigError(format!("invalid recipient {recipient}: {e}")))?;
        builder = builder.to(mailbox);
    }
    if recipients.is_empty() {
        return Err(DispatchError::ConfigError("email channel has no recipients".into()));
    }

    let message = builder
        .body(email_body(ctx))
        .map_err(|e| DispatchError::ConfigError(format!("failed to build message: {e}")))?;

    let mut transport_builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
        .map_err(|e| DispatchError::ConfigError(format!("invalid smtp_host: {e}")))?
        .port(*smtp_port)
        .timeout(Some(timeout));

    if let Some(user) = smtp_user.as_ref().filter(|u| !u.is_empty()) {
        let password = smtp_password.clone().unwrap_or_default();
        transport_builder = transport_builder.credentials(Credentials::new(user.clone(), password));
    }

    let transport = transport_builder.build();

    transport.send(message).await.map(|_| ()).map_err(|e| {
        if e.is_timeout() {
            DispatchError::Timeout
        } else {
            DispatchError::Transport(e.to_string())
        }
    })
}

fn email_body(ctx: &NotificationContext) -> String {
    let mut body = format!(
        "Monitor: {}\r\nURL: {}\r\nRule: {}\r\nStatus: {}\r\n",
        ctx.monitor_name,
        ctx.monitor_url,
        ctx.rule_name,
        ctx.status_str(),
    );
    if let Some(duration) = ctx.duration_human() {
        body.push_str(&format!("Duration: {duration}\r\n"));
    }
    body.push_str(&format!("At: {}\r\n", ctx.timestamp.to_rfc3339()));
    body
}
