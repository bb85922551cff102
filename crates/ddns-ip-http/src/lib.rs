// # HTTP IP Source
//
// This crate provides the `IpSource` used by the DDNS daemon: it asks a
// public "what is my address" service once per address family.
//
// ## Architecture
//
// - Two HTTP clients, one bound to `0.0.0.0` and one bound to `::`, so each
//   lookup leaves the host over the family it is asking about
// - Both lookups run concurrently; either may fail on a single-stack host
// - When the IPv6 lookup fails, the source falls back to the local address
//   the kernel picks for an outbound IPv6 UDP socket (no packet is sent)
//
// ## Services
//
// - IPv4: `https://api.ipify.org?format=json`
// - IPv6: `https://api64.ipify.org?format=json`

use async_trait::async_trait;
use ddns_core::traits::{IpSource, PublicAddrs};
use ddns_core::{Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// IPv4 lookup service
pub const DEFAULT_V4_URL: &str = "https://api.ipify.org?format=json";

/// IPv6 lookup service
pub const DEFAULT_V6_URL: &str = "https://api64.ipify.org?format=json";

/// Per-request timeout
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Well-known IPv6 destination used to pick an outbound source address
const V6_PROBE_TARGET: &str = "[2606:4700:4700::1111]:53";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ip: String,
}

/// Parse a lookup service body (`{"ip": "..."}` or a bare address)
fn parse_lookup(body: &str) -> Result<IpAddr> {
    let text = match serde_json::from_str::<LookupResponse>(body) {
        Ok(response) => response.ip,
        Err(_) => body.trim().to_string(),
    };
    text.trim()
        .parse()
        .map_err(|e| Error::ip_source(format!("invalid address {:?}: {}", text, e)))
}

/// HTTP-based IP source
pub struct HttpIpSource {
    v4_url: String,
    v6_url: String,
    v4_client: reqwest::Client,
    v6_client: reqwest::Client,
    udp_fallback: bool,
}

impl HttpIpSource {
    /// Create a source using the default lookup services
    pub fn new() -> Result<Self> {
        Self::with_urls(DEFAULT_V4_URL, DEFAULT_V6_URL)
    }

    /// Create a source using custom lookup services
    pub fn with_urls(v4_url: impl Into<String>, v6_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            v4_url: v4_url.into(),
            v6_url: v6_url.into(),
            v4_client: bound_client(IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            v6_client: bound_client(IpAddr::V6(Ipv6Addr::UNSPECIFIED))?,
            udp_fallback: true,
        })
    }

    /// Enable or disable the outbound-socket IPv6 fallback
    pub fn with_udp_fallback(mut self, enabled: bool) -> Self {
        self.udp_fallback = enabled;
        self
    }

    async fn lookup(&self, client: &reqwest::Client, url: &str) -> Result<IpAddr> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ip_source(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::ip_source(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ip_source(format!("failed to read {}: {}", url, e)))?;
        parse_lookup(&body)
    }

    async fn lookup_v4(&self) -> Result<Ipv4Addr> {
        match self.lookup(&self.v4_client, &self.v4_url).await? {
            IpAddr::V4(addr) => Ok(addr),
            IpAddr::V6(addr) => Err(Error::ip_source(format!(
                "IPv4 lookup returned IPv6 address {}",
                addr
            ))),
        }
    }

    async fn lookup_v6(&self) -> Result<Ipv6Addr> {
        match self.lookup(&self.v6_client, &self.v6_url).await? {
            IpAddr::V6(addr) => Ok(addr),
            IpAddr::V4(addr) => Err(Error::ip_source(format!(
                "IPv6 lookup returned IPv4 address {}",
                addr
            ))),
        }
    }
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<PublicAddrs> {
        let (v4, v6) = tokio::join!(self.lookup_v4(), self.lookup_v6());

        let v4 = v4
            .map_err(|e| tracing::debug!("IPv4 lookup failed: {}", e))
            .ok();

        let v6 = match v6 {
            Ok(addr) => Some(addr),
            Err(e) if self.udp_fallback => {
                tracing::debug!("IPv6 lookup failed, trying outbound socket: {}", e);
                outbound_ipv6()
                    .await
                    .map_err(|e| tracing::debug!("IPv6 outbound probe failed: {}", e))
                    .ok()
            }
            Err(e) => {
                tracing::debug!("IPv6 lookup failed: {}", e);
                None
            }
        };

        let addrs = PublicAddrs::new(v4, v6);
        if addrs.is_empty() {
            return Err(Error::ip_source("no public IPv4 or IPv6 address found"));
        }
        Ok(addrs)
    }
}

fn bound_client(local: IpAddr) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .local_address(local)
        .timeout(LOOKUP_TIMEOUT)
        .build()
        .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))
}

/// Local address of an IPv6 UDP socket connected to a public resolver
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub async fn outbound_ipv6() -> Result<Ipv6Addr> {
    let target: SocketAddr = V6_PROBE_TARGET
        .parse()
        .map_err(|e| Error::ip_source(format!("invalid probe target: {}", e)))?;

    let socket = tokio::net::UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).await?;
    socket.connect(target).await?;

    match socket.local_addr()?.ip() {
        IpAddr::V6(addr) if is_public_candidate(&addr) => Ok(addr),
        other => Err(Error::ip_source(format!(
            "outbound socket has no usable IPv6 address ({})",
            other
        ))),
    }
}

fn is_public_candidate(addr: &Ipv6Addr) -> bool {
    let link_local = (addr.segments()[0] & 0xffc0) == 0xfe80;
    !(addr.is_unspecified() || addr.is_loopback() || link_local)
}
