// flowgate-dispatch/src/sources/mod.rs
// ============================================================================
// Module: Dispatch Event Sources
// Description: Host policy shared by transport-backed sources, plus the
//              EventSource implementations themselves.
// Purpose: Keep SSRF protections in one place regardless of which source
//          issues the outbound or inbound connection.
// Dependencies: tokio, std::net
// ============================================================================

//! ## Overview
//! [`HostPolicy`] gates which hosts an `EventSource` (or the webhook sink) is
//! permitted to reach: an optional allowlist, a denylist checked first, and a
//! default refusal of private/link-local/loopback ranges. Resolution happens
//! once per request via [`HostPolicy::resolve`], and the caller is expected to
//! pin its transport to the returned address rather than re-resolving.

pub mod http;
pub mod inline;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::SocketAddr;

use crate::error::TransportError;

// ============================================================================
// SECTION: Host Policy
// ============================================================================

/// Host allow/deny policy enforced before any outbound or inbound connection.
///
/// # Invariants
/// - Denylist rules are evaluated before allowlist rules.
/// - Private, loopback, and link-local addresses are denied unless explicitly allowed.
#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    /// Optional allowlist; when set, only matching hosts are permitted.
    allowlist: Option<Vec<String>>,
    /// Hosts denied regardless of the allowlist.
    denylist: Vec<String>,
    /// Whether private/loopback/link-local ranges are permitted.
    allow_private_networks: bool,
}

impl HostPolicy {
    /// Creates a default policy: no allowlist, empty denylist, private ranges denied.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the policy to the given hosts.
    #[must_use]
    pub fn allow_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(hosts.into_iter().map(|host| host.into().to_ascii_lowercase()).collect());
        self
    }

    /// Denies the given hosts regardless of the allowlist.
    #[must_use]
    pub fn deny_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist = hosts.into_iter().map(|host| host.into().to_ascii_lowercase()).collect();
        self
    }

    /// Permits requests to private/loopback/link-local ranges. Intended for local
    /// development and tests only.
    #[must_use]
    pub const fn allow_private_networks(mut self) -> Self {
        self.allow_private_networks = true;
        self
    }

    /// Validates `host` against the allow/deny lists and resolves it to a
    /// socket address, rejecting private ranges unless explicitly allowed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Policy`] if the host is denied, not resolvable,
    /// or resolves only to addresses outside the permitted ranges.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, TransportError> {
        let normalized = host.to_ascii_lowercase();
        if self.denylist.iter().any(|denied| denied == &normalized) {
            return Err(TransportError::Policy(format!("host denied: {normalized}")));
        }
        if let Some(allowlist) = &self.allowlist
            && !allowlist.iter().any(|allowed| allowed == &normalized)
        {
            return Err(TransportError::Policy(format!("host not in allowlist: {normalized}")));
        }
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((normalized.as_str(), port))
            .await
            .map_err(|err| TransportError::Policy(format!("dns lookup failed for {normalized}: {err}")))?
            .collect();
        let resolved = addrs
            .into_iter()
            .find(|addr| self.allow_private_networks || !is_private_or_link_local(addr.ip()))
            .ok_or_else(|| TransportError::Policy(format!("host has no permitted resolved address: {normalized}")))?;
        Ok(resolved)
    }
}

/// Returns true if the address is private, loopback, link-local, unspecified, or multicast.
fn is_private_or_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback() || addr.is_unspecified() || addr.is_multicast() || addr.is_unique_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_is_denied_by_default() {
        let policy = HostPolicy::new();
        let err = policy.resolve("127.0.0.1", 8080).await.unwrap_err();
        assert!(matches!(err, TransportError::Policy(_)));
    }

    #[tokio::test]
    async fn loopback_is_allowed_when_opted_in() {
        let policy = HostPolicy::new().allow_private_networks();
        let resolved = policy.resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(resolved.port(), 8080);
    }

    #[tokio::test]
    async fn denylist_wins_over_allowlist() {
        let policy = HostPolicy::new().allow_private_networks().allow_hosts(["127.0.0.1"]).deny_hosts(["127.0.0.1"]);
        let err = policy.resolve("127.0.0.1", 8080).await.unwrap_err();
        assert!(matches!(err, TransportError::Policy(_)));
    }

    #[tokio::test]
    async fn host_outside_allowlist_is_rejected() {
        let policy = HostPolicy::new().allow_private_networks().allow_hosts(["example.internal"]);
        let err = policy.resolve("127.0.0.1", 8080).await.unwrap_err();
        assert!(matches!(err, TransportError::Policy(_)));
    }
}
