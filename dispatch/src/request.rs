//! Extracting addresses and subscriber numbers from inbound requests.

use crate::errors::ValidationError;
use http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Candidate client addresses, most trusted first: the `X-Forwarded-For`
/// chain from the right, then `X-Real-IP`, then the peer. Unparseable
/// entries are dropped.
pub fn candidate_ips(headers: &HeaderMap, peer: Option<SocketAddr>) -> Vec<IpAddr> {
    let mut ips: Vec<IpAddr> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| entry.trim().parse().ok())
        .collect();
    ips.reverse();

    if let Some(ip) = headers
        .get(X_REAL_IP)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
    {
        ips.push(ip);
    }
    if let Some(peer) = peer {
        ips.push(peer.ip());
    }
    ips
}

/// Value of the first named header carrying a plausible MSISDN.
pub fn header_msisdn<S: AsRef<str>>(headers: &HeaderMap, names: &[S]) -> Option<String> {
    names.iter().find_map(|name| {
        headers
            .get(name.as_ref())
            .and_then(|value| value.to_str().ok())
            .and_then(normalize_msisdn)
    })
}

/// Strips whitespace and a leading `+`. Anything that is not all digits
/// afterwards is not an MSISDN.
pub fn normalize_msisdn(raw: &str) -> Option<String> {
    let digits = raw.trim();
    let digits = digits.strip_prefix('+').unwrap_or(digits);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.to_string())
}

pub fn validate_hash(hash: &str, expected: usize) -> Result<(), ValidationError> {
    let actual = hash.chars().count();
    if actual != expected {
        return Err(ValidationError::HashLength { expected, actual });
    }
    Ok(())
}
