//! URL safety validation and normalization
//!
//! Every URL entering the system passes through [`validate`] twice: once at
//! submit time (API edge) and once again in the worker immediately before
//! rendering. Vetting is purely textual, no DNS resolution happens here.
//!
//! The checks:
//! - scheme must be `http` or `https`
//! - host must be present and parseable
//! - IP literals (including IPv4-mapped IPv6) must not fall into private,
//!   loopback, link-local, or unspecified ranges
//! - `localhost` and cloud metadata endpoints are always rejected
//!
//! Validation also produces the two derived values the queue keys on: the
//! normalized URL (dedup key component) and the registrable domain
//! (per-domain lock key).

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Cloud metadata endpoints, blocked regardless of range checks.
const METADATA_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);
const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SafetyError {
    #[error("URL is not parseable: {0}")]
    Malformed(String),

    #[error("scheme '{0}' is not allowed (http/https only)")]
    SchemeNotAllowed(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("host '{0}' is in a blocked address range")]
    BlockedAddress(String),

    #[error("host '{0}' is a loopback alias")]
    LoopbackHost(String),

    #[error("host '{0}' is a cloud metadata endpoint")]
    MetadataEndpoint(String),
}

impl SafetyError {
    /// True when the rejection is an SSRF block rather than a parse problem.
    pub fn is_ssrf(&self) -> bool {
        matches!(
            self,
            SafetyError::BlockedAddress(_)
                | SafetyError::LoopbackHost(_)
                | SafetyError::MetadataEndpoint(_)
        )
    }
}

/// A vetted URL with the derived queue keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    /// Lowercase scheme+host, default port stripped, fragment removed,
    /// query preserved verbatim. Idempotent under re-validation.
    pub normalized_url: String,
    /// Registrable domain (eTLD+1), lowercase. IP literals fall back to the
    /// host string itself.
    pub domain_key: String,
}

/// Parse, vet, and normalize a submitted URL.
pub fn validate(raw_url: &str) -> Result<ValidatedUrl, SafetyError> {
    let mut parsed =
        Url::parse(raw_url).map_err(|e| SafetyError::Malformed(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(SafetyError::SchemeNotAllowed(other.to_string())),
    }

    let domain_key = {
        let host = parsed.host().ok_or(SafetyError::MissingHost)?;
        vet_host(&host)?
    };

    // The url crate already lowercases scheme/host and strips default ports
    // at parse time; normalization only has to drop the fragment.
    parsed.set_fragment(None);

    Ok(ValidatedUrl {
        normalized_url: parsed.to_string(),
        domain_key,
    })
}

/// Reject blocked hosts; return the lock key for accepted ones.
fn vet_host(host: &Host<&str>) -> Result<String, SafetyError> {
    match host {
        Host::Ipv4(addr) => {
            if *addr == METADATA_V4 {
                return Err(SafetyError::MetadataEndpoint(addr.to_string()));
            }
            if is_blocked_v4(*addr) {
                return Err(SafetyError::BlockedAddress(addr.to_string()));
            }
            Ok(addr.to_string())
        }
        Host::Ipv6(addr) => {
            if *addr == METADATA_V6 {
                return Err(SafetyError::MetadataEndpoint(addr.to_string()));
            }
            // An IPv4-mapped address is vetted as the IPv4 it names.
            if let Some(mapped) = addr.to_ipv4_mapped() {
                if mapped == METADATA_V4 {
                    return Err(SafetyError::MetadataEndpoint(addr.to_string()));
                }
                if is_blocked_v4(mapped) {
                    return Err(SafetyError::BlockedAddress(addr.to_string()));
                }
            }
            if is_blocked_v6(*addr) {
                return Err(SafetyError::BlockedAddress(addr.to_string()));
            }
            Ok(addr.to_string())
        }
        Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            if name.split('.').any(|label| label == "localhost") {
                return Err(SafetyError::LoopbackHost(name));
            }
            Ok(registrable_domain(&name))
        }
    }
}

/// 10/8, 172.16/12, 192.168/16, 127/8, 169.254/16, 0/8
fn is_blocked_v4(addr: Ipv4Addr) -> bool {
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.octets()[0] == 0
}

/// ::1, unique-local fc00::/7, link-local fe80::/10
fn is_blocked_v6(addr: Ipv6Addr) -> bool {
    let seg0 = addr.segments()[0];
    addr.is_loopback() || (seg0 & 0xfe00) == 0xfc00 || (seg0 & 0xffc0) == 0xfe80
}

/// eTLD+1 via the bundled Public Suffix List snapshot.
///
/// Hosts that the PSL cannot split (single labels, unknown suffixes) key on
/// the full host so they still serialize against themselves.
fn registrable_domain(host: &str) -> String {
    psl::domain_str(host)
        .map(str::to_string)
        .unwrap_or_else(|| host.to_string())
}
