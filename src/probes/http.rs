use super::{outcome_from_probe_error, tls, CheckOutcome};
use crate::error::ProbeError;
use crate::models::Monitor;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// HTTP probe executor (spec §4.2).
///
/// `success` iff the final status code (after following up to
/// `max_redirects`) is in [200,399] and, when a keyword is configured, the
/// decoded body contains it literally. When `check_ssl` applies, certificate
/// facts are gathered independently of whether the request itself
/// succeeded.
pub async fn check(client: &reqwest::Client, monitor: &Monitor, timeout: Duration, now: DateTime<Utc>) -> CheckOutcome {
    let start = Instant::now();

    let response = client.get(&monitor.target).timeout(timeout).send().await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let mut outcome = match response {
        Ok(resp) => {
            let status = resp.status();
            let code = status.as_u16();
            if !(200..400).contains(&code) {
                let mut o = outcome_from_probe_error(ProbeError::NonSuccessStatus(code));
                o.response_time_ms = Some(elapsed_ms);
                o
            } else if let Some(ref keyword) = monitor.keyword {
                if keyword.is_empty() {
                    success_outcome(code, elapsed_ms)
                } else {
                    match resp.text().await {
                        Ok(body) if body.contains(keyword.as_str()) => success_outcome(code, elapsed_ms),
                        Ok(_) => {
                            let mut o = outcome_from_probe_error(ProbeError::KeywordMissing);
                            o.status_code = Some(code);
                            o.response_time_ms = Some(elapsed_ms);
                            o
                        }
                        Err(_) => {
                            let mut o = outcome_from_probe_error(ProbeError::ReadTimeout);
                            o.status_code = Some(code);
                            o.response_time_ms = Some(elapsed_ms);
                            o
                        }
                    }
                }
            } else {
                success_outcome(code, elapsed_ms)
            }
        }
        Err(e) => {
            let probe_err = classify_reqwest_error(&e);
            let mut o = outcome_from_probe_error(probe_err);
            o.response_time_ms = Some(elapsed_ms);
            o
        }
    };

    if monitor.ssl_applicable() {
        if let Ok(parsed) = url::Url::parse(&monitor.target) {
            if let Some(host) = parsed.host_str() {
                let port = parsed.port_or_known_default().unwrap_or(443);
                let remaining = timeout.saturating_sub(start.elapsed());
                let probe_timeout = if remaining.is_zero() { Duration::from_millis(500) } else { remaining };
                match tls::inspect(host, port, probe_timeout).await {
                    Ok(facts) => {
                        outcome.ssl_valid = Some(facts.ssl_valid);
                        outcome.ssl_expires_at = facts.ssl_expires_at;
                    }
                    Err(_) => {
                        // No certificate could be observed at all (e.g. the TCP
                        // connection itself failed) — leave ssl fields unset.
                    }
                }
            }
        }
    }

    let _ = now;
    outcome
}

fn success_outcome(code: u16, elapsed_ms: u32) -> CheckOutcome {
    CheckOutcome {
        success: true,
        status_code: Some(code),
        response_time_ms: Some(elapsed_ms),
        error_message: None,
        ssl_valid: None,
        ssl_expires_at: None,
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::ReadTimeout
    } else if e.is_connect() {
        let msg = e.to_string().to_lowercase();
        if msg.contains("dns") || msg.contains("resolve") {
            ProbeError::DnsFailure
        } else if msg.contains("refused") {
            ProbeError::ConnectionRefused
        } else {
            ProbeError::ConnectTimeout
        }
    } else if e.is_redirect() {
        ProbeError::ProtocolError("too_many_redirects".into())
    } else {
        ProbeError::ProtocolError(e.to_string())
    }
}
