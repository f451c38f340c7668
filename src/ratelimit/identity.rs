//! Client identity used to bucket rate limit state.

use std::net::IpAddr;

/// Identity shared by every caller whose address could not be determined.
pub const FALLBACK_IDENTITY: &str = "unknown";

/// A key that identifies one client for rate limiting purposes.
///
/// Usually the textual form of the peer IP address. Callers that cannot
/// supply one all collapse onto [`FALLBACK_IDENTITY`], so they share a single
/// counter instead of bypassing the limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Create an identity from a raw string, falling back when it is blank.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::fallback()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Create an identity from a peer IP address.
    pub fn from_ip(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }

    /// The shared identity for callers with no usable address.
    pub fn fallback() -> Self {
        Self(FALLBACK_IDENTITY.to_string())
    }

    /// Whether this is the shared fallback identity.
    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_IDENTITY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
