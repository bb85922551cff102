// # DNS Provider Trait
//
// Defines the interface for managing DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `ddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::DnsProvider;
//
// let records = provider.list_records(zone_id).await?;
// for record in records {
//     println!("{} {} {}", record.record_type, record.name, record.content);
// }
// ```

use crate::config::RecordType;
use async_trait::async_trait;

/// A record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-specific record ID
    pub id: String,
    /// Fully qualified record name
    pub name: String,
    /// Record type as reported (may be a type the daemon does not manage)
    pub record_type: String,
    /// Record content (the address for A/AAAA)
    pub content: String,
    /// Whether the provider proxies traffic for this record
    pub proxied: bool,
}

/// Desired content of a managed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContent {
    /// Fully qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Address to publish
    pub content: String,
    /// Whether the provider proxies traffic for this record
    pub proxied: bool,
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// DNS providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (the reconciliation engine decides what next)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads (violates shutdown determinism)
/// - ❌ Implement retry logic or backoff
/// - ❌ Decide which records should exist (owned by the reconciliation engine)
/// - ❌ Cache state beyond single request
///
/// Each method performs one logical API operation. A provider is built per
/// generation from that generation's settings and dropped with it.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every record of a zone
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a record, returning it as stored by the provider
    async fn create_record(
        &self,
        zone_id: &str,
        record: &RecordContent,
    ) -> Result<DnsRecord, crate::Error>;

    /// Overwrite an existing record
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordContent,
    ) -> Result<(), crate::Error>;

    /// Delete a record
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
