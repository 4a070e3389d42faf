//! Canonical tunnel identifiers
//!
//! The identifier is the join key between control-plane operations and a live
//! edge session. Edge nodes and the control service must derive it the same
//! way from a tunnel's stored URL and protocol:
//!
//! - HTTP tunnels are virtual-hosted, so the identifier is the full hostname
//!   (`pretty-cake.example.app`)
//! - TCP/UDP tunnels are addressed by port, so only the subdomain label counts
//!   (`pretty-cake`)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Protocol tag stored with a tunnel record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelProtocol {
    #[default]
    Http,
    Tcp,
    Udp,
}

impl TunnelProtocol {
    /// Parse a stored protocol tag; unknown or empty tags are treated as HTTP
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or_default()
    }

    /// How identifiers are derived for this protocol
    pub fn identifier_policy(self) -> IdentifierPolicy {
        match self {
            TunnelProtocol::Http => IdentifierPolicy::VirtualHost,
            TunnelProtocol::Tcp | TunnelProtocol::Udp => IdentifierPolicy::SubdomainLabel,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TunnelProtocol::Http => "http",
            TunnelProtocol::Tcp => "tcp",
            TunnelProtocol::Udp => "udp",
        }
    }
}

impl FromStr for TunnelProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(TunnelProtocol::Http),
            "tcp" => Ok(TunnelProtocol::Tcp),
            "udp" => Ok(TunnelProtocol::Udp),
            other => Err(format!("unknown tunnel protocol '{}'", other)),
        }
    }
}

impl fmt::Display for TunnelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier derivation policy, one per protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Full hostname (HTTP)
    VirtualHost,
    /// First DNS label of the hostname (TCP/UDP)
    SubdomainLabel,
}

impl IdentifierPolicy {
    /// Derive the canonical identifier for a stored tunnel URL
    ///
    /// Never fails: if the URL cannot be parsed the stored URL itself is
    /// returned as a [`ResolvedIdentifier::Fallback`].
    pub fn derive_identifier(self, stored_url: &str) -> ResolvedIdentifier {
        let normalized = match self {
            // Only the host matters, so any scheme is swapped for https
            IdentifierPolicy::SubdomainLabel => match stored_url.split_once("://") {
                Some((_, rest)) => format!("https://{}", rest),
                None => format!("https://{}", stored_url),
            },
            IdentifierPolicy::VirtualHost => {
                if stored_url.contains("://") {
                    stored_url.to_string()
                } else {
                    format!("https://{}", stored_url)
                }
            }
        };

        let host = Url::parse(&normalized)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .filter(|host| !host.is_empty());

        let Some(host) = host else {
            return ResolvedIdentifier::Fallback(stored_url.to_string());
        };

        match self {
            IdentifierPolicy::VirtualHost => ResolvedIdentifier::Parsed(host),
            IdentifierPolicy::SubdomainLabel => {
                let label = host.split('.').next().unwrap_or(&host).to_string();
                ResolvedIdentifier::Parsed(label)
            }
        }
    }
}

/// Outcome of identifier resolution
///
/// A fallback identifier is still usable (it is what the control plane
/// publishes and looks up), it is just less likely to match a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedIdentifier {
    /// Derived from a successfully parsed URL
    Parsed(String),
    /// The stored URL, used verbatim because it could not be parsed
    Fallback(String),
}

impl ResolvedIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            ResolvedIdentifier::Parsed(id) | ResolvedIdentifier::Fallback(id) => id,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ResolvedIdentifier::Fallback(_))
    }

    pub fn into_string(self) -> String {
        match self {
            ResolvedIdentifier::Parsed(id) | ResolvedIdentifier::Fallback(id) => id,
        }
    }
}

impl AsRef<str> for ResolvedIdentifier {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ResolvedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the canonical identifier for a tunnel record
pub fn resolve(stored_url: &str, protocol: TunnelProtocol) -> ResolvedIdentifier {
    protocol.identifier_policy().derive_identifier(stored_url)
}

/// Extract the subdomain part of `host` under `base_domain`
///
/// Used by edge nodes to map an incoming Host header back to a subdomain.
/// The port is ignored and the comparison is case-insensitive. Returns `None`
/// if the host is not below the base domain.
pub fn extract_subdomain(host: &str, base_domain: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
    let base = base_domain.to_ascii_lowercase();

    host.strip_suffix(&format!(".{}", base))
        .filter(|sub| !sub.is_empty())
        .map(str::to_string)
}
