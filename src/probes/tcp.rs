use super::{outcome_from_probe_error, CheckOutcome};
use crate::error::ProbeError;
use crate::models::Monitor;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// TCP probe executor (spec §4.2). Target is parsed as `host:port`;
/// `success` iff a connection is established within `timeout`. Latency is
/// time to `connect` completion.
pub async fn check(monitor: &Monitor, timeout: Duration) -> CheckOutcome {
    let start = Instant::now();

    let addr = monitor.target.strip_prefix("tcp://").unwrap_or(&monitor.target);

    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => CheckOutcome {
            success: true,
            status_code: None,
            response_time_ms: Some(start.elapsed().as_millis() as u32),
            error_message: None,
            ssl_valid: None,
            ssl_expires_at: None,
        },
        Ok(Err(e)) => {
            let msg = e.to_string().to_lowercase();
            let probe_err = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                ProbeError::ConnectionRefused
            } else if msg.contains("resolve") || msg.contains("dns") || msg.contains("name or service") {
                ProbeError::DnsFailure
            } else {
                ProbeError::ProtocolError(e.to_string())
            };
            let mut o = outcome_from_probe_error(probe_err);
            o.response_time_ms = Some(start.elapsed().as_millis() as u32);
            o
        }
        Err(_) => {
            let mut o = outcome_from_probe_error(ProbeError::ConnectTimeout);
            o.response_time_ms = Some(start.elapsed().as_millis() as u32);
            o
        }
    }
}
