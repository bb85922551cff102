// # IP Source Trait
//
// Defines the interface for discovering the host's public addresses.
//
// ## Implementations
//
// - HTTP lookup services: `ddns-ip-http` crate

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Public addresses of the host, one per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicAddrs {
    /// Public IPv4 address, if the host has IPv4 connectivity
    pub v4: Option<Ipv4Addr>,
    /// Public IPv6 address, if the host has IPv6 connectivity
    pub v6: Option<Ipv6Addr>,
}

impl PublicAddrs {
    /// Create a new address pair
    pub fn new(v4: Option<Ipv4Addr>, v6: Option<Ipv6Addr>) -> Self {
        Self { v4, v6 }
    }

    /// Whether neither family is known
    pub fn is_empty(&self) -> bool {
        self.v4.is_none() && self.v6.is_none()
    }

    /// Replace the IPv6 address with a statically configured one
    pub fn with_static_v6(mut self, v6: Option<Ipv6Addr>) -> Self {
        if v6.is_some() {
            self.v6 = v6;
        }
        self
    }
}

/// Trait for IP source implementations
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform network I/O to address lookup services
/// - ✅ Return a partial result when only one family is reachable
///
/// ## Forbidden Capabilities
/// - ❌ Perform DNS updates (use `DnsProvider`)
/// - ❌ Spawn background polling loops (scheduling is owned by the runner)
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current public addresses
    ///
    /// # Returns
    ///
    /// - `Ok(PublicAddrs)`: At least one family is known
    /// - `Err(Error)`: No address could be determined
    async fn current(&self) -> Result<PublicAddrs, crate::Error>;
}
