//! Channel config validation (SPEC_FULL AMBIENT-5). Pure checks usable both
//! at rule-creation time (out of scope here) and immediately before each
//! dispatch attempt, so a malformed channel fails fast with `config_error`
//! rather than after a wasted network round trip.

use crate::error::DispatchError;
use crate::models::ChannelConfig;

pub fn validate(config: &ChannelConfig) -> Result<(), DispatchError> {
    match config {
        ChannelConfig::Webhook { url } => validate_http_url(url),
        ChannelConfig::Discord { url } => {
            validate_http_url(url)?;
            if !url.contains("discord.com") && !url.contains("discordapp.com") {
                return Err(DispatchError::ConfigError("discord channel url is not a discord webhook endpoint".into()));
            }
            Ok(())
        }
        ChannelConfig::Email { smtp_host, smtp_port, smtp_from, recipients, .. } => {
            if smtp_host.is_empty() {
                return Err(DispatchError::ConfigError("smtp_host is required".into()));
            }
            if *smtp_port == 0 {
                return Err(DispatchError::ConfigError("smtp_port must be nonzero".into()));
            }
            if smtp_from.parse::<lettre::message::Mailbox>().is_err() {
                return Err(DispatchError::ConfigError(format!("invalid smtp_from address: {smtp_from}")));
            }
            if recipients.is_empty() {
                return Err(DispatchError::ConfigError("email channel has no recipients".into()));
            }
            Ok(())
        }
    }
}

fn validate_http_url(url: &str) -> Result<(), DispatchError> {
    let parsed = url::Url::parse(url).map_err(|e| DispatchError::ConfigError(format!("invalid url: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(DispatchError::ConfigError(format!("unsupported url scheme: {}", parsed.scheme())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_webhook_scheme() {
        let cfg = ChannelConfig::Webhook { url: "ftp://example.test".into() };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_discord_url_on_foreign_host() {
        let cfg = ChannelConfig::Discord { url: "https://example.test/webhook".into() };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_email_without_recipients() {
        let cfg = ChannelConfig::Email {
            smtp_host: "smtp.example.test".into(),
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            smtp_from: "alerts@example.test".into(),
            recipients: vec![],
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn accepts_well_formed_webhook() {
        let cfg = ChannelConfig::Webhook { url: "https://example.test/hook".into() };
        assert!(validate(&cfg).is_ok());
    }
}
