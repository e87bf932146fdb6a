use super::{outcome_from_probe_error, CheckOutcome};
use crate::error::ProbeError;
use crate::models::Monitor;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Number of echo attempts per check; `success` iff at least one reply
/// arrives within `timeout`, and reported latency is the minimum RTT
/// observed across attempts (spec §4.2).
const ECHO_ATTEMPTS: usize = 3;
const ECHO_PAYLOAD: [u8; 8] = *b"sentinel";

/// Ping probe executor. Emits ICMP echo via `surge-ping` where the process
/// has raw-socket privilege; falls back to a TCP connect against common
/// ports when raw sockets are unavailable (e.g. missing `CAP_NET_RAW`).
/// The fallback is always noted in `error_message`, including on success,
/// so callers/tests can distinguish which path produced the result.
pub async fn check(monitor: &Monitor, timeout: Duration) -> CheckOutcome {
    let hostname = monitor.target.strip_prefix("ping://").unwrap_or(&monitor.target);

    let ip = match resolve(hostname).await {
        Ok(ip) => ip,
        Err(probe_err) => return outcome_from_probe_error(probe_err),
    };

    match icmp_echo(ip, timeout).await {
        EchoResult::Replied { min_rtt_ms } => CheckOutcome {
            success: true,
            status_code: None,
            response_time_ms: Some(min_rtt_ms),
            error_message: None,
            ssl_valid: None,
            ssl_expires_at: None,
        },
        EchoResult::NoReply => {
            let mut o = outcome_from_probe_error(ProbeError::Unreachable);
            o.response_time_ms = None;
            o
        }
        EchoResult::SocketUnavailable => tcp_fallback(ip, timeout).await,
    }
}

async fn resolve(hostname: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip);
    }
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    let response = resolver.lookup_ip(hostname).await.map_err(|_| ProbeError::DnsFailure)?;
    response.iter().next().ok_or(ProbeError::DnsFailure)
}

enum EchoResult {
    Replied { min_rtt_ms: u32 },
    NoReply,
    SocketUnavailable,
}

async fn icmp_echo(ip: IpAddr, timeout: Duration) -> EchoResult {
    let per_attempt_timeout = timeout / ECHO_ATTEMPTS as u32;
    let mut min_rtt: Option<Duration> = None;

    for _ in 0..ECHO_ATTEMPTS {
        match tokio::time::timeout(per_attempt_timeout, surge_ping::ping(ip, &ECHO_PAYLOAD)).await {
            Ok(Ok((_packet, rtt))) => {
                min_rtt = Some(min_rtt.map_or(rtt, |m| m.min(rtt)));
            }
            Ok(Err(err)) => {
                if is_permission_error(&err) {
                    return EchoResult::SocketUnavailable;
                }
                // Individual echo failed (e.g. one dropped packet) — keep trying.
            }
            Err(_) => {
                // This attempt's slice of the timeout elapsed; move to the next.
            }
        }
    }

    match min_rtt {
        Some(rtt) => EchoResult::Replied { min_rtt_ms: rtt.as_millis() as u32 },
        None => EchoResult::NoReply,
    }
}

fn is_permission_error(err: &surge_ping::SurgeError) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("permission") || msg.contains("not permitted") || msg.contains("operation not permitted")
}

/// TCP-based fallback for hosts where raw ICMP sockets are unavailable.
/// Tries a handful of commonly-open ports as a coarse reachability signal.
async fn tcp_fallback(ip: IpAddr, timeout: Duration) -> CheckOutcome {
    const FALLBACK_PORTS: &[u16] = &[443, 80, 22];
    let per_attempt_timeout = timeout / FALLBACK_PORTS.len() as u32;

    for &port in FALLBACK_PORTS {
        let start = Instant::now();
        if tokio::time::timeout(per_attempt_timeout, TcpStream::connect((ip, port))).await.is_ok_and(|r| r.is_ok())
        {
            return CheckOutcome {
                success: true,
                status_code: None,
                response_time_ms: Some(start.elapsed().as_millis() as u32),
                error_message: Some(ProbeError::IcmpUnavailableTcpFallback.canonical()),
                ssl_valid: None,
                ssl_expires_at: None,
            };
        }
    }

    CheckOutcome {
        success: false,
        status_code: None,
        response_time_ms: None,
        error_message: Some(ProbeError::IcmpUnavailableTcpFallback.canonical()),
        ssl_valid: None,
        ssl_expires_at: None,
    }
}
