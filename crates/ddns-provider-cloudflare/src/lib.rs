// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare `DnsProvider` used by the DDNS daemon.
//
// ## Implementation Status
//
// - ✅ One HTTP request per trait call (listing pages through `result_info`)
// - ✅ Full error propagation to the reconciliation engine
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 409, 429, 5xx)
// - ✅ Dry-run mode for safe testing (`DDNS_MODE=dry-run`)
// - ✅ API token or global API key credentials
// - ❌ NO retry logic (the next reconcile pass is the retry)
// - ❌ NO caching (every pass lists the zone afresh)
// - ❌ NO background tasks
//
// ### Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to the Cloudflare API only
// - ✅ Parse Cloudflare v4 response envelopes
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Decide which records should exist (owned by the reconciliation engine)
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs or `Debug` output
// - Provider MUST fail fast if the credential is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=N&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, DnsRecord, RecordContent};
use ddns_core::{Error, Result, Settings};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per listing page (the API maximum for DNS records)
const PAGE_SIZE: u32 = 100;

/// Environment variable selecting dry-run mode
pub const MODE_ENV: &str = "DDNS_MODE";

/// How requests authenticate against the API
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Scoped API token, sent as a bearer token
    ApiToken(String),
    /// Legacy global API key, sent as `X-Auth-Email` / `X-Auth-Key`
    GlobalKey { email: String, key: String },
}

impl Credentials {
    /// Credentials from the settings file: an email selects the global key
    /// scheme, otherwise `token` is an API token
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.email.is_empty() {
            Credentials::ApiToken(settings.token.clone())
        } else {
            Credentials::GlobalKey {
                email: settings.email.clone(),
                key: settings.token.clone(),
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Credentials::ApiToken(token) => token.is_empty(),
            Credentials::GlobalKey { email, key } => email.is_empty() || key.is_empty(),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::ApiToken(token) => request.bearer_auth(token),
            Credentials::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ApiToken(_) => f.write_str("ApiToken(<REDACTED>)"),
            Credentials::GlobalKey { email, .. } => f
                .debug_struct("GlobalKey")
                .field("email", email)
                .field("key", &"<REDACTED>")
                .finish(),
        }
    }
}

/// Whether `DDNS_MODE` asks for dry-run mode
pub fn dry_run_from_env() -> bool {
    std::env::var(MODE_ENV)
        .map(|mode| mode.eq_ignore_ascii_case("dry-run"))
        .unwrap_or(false)
}

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

/// Record as serialized by the API
#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    proxied: bool,
}

impl From<ApiRecord> for DnsRecord {
    fn from(record: ApiRecord) -> Self {
        DnsRecord {
            id: record.id,
            name: record.name,
            record_type: record.record_type,
            content: record.content,
            proxied: record.proxied,
        }
    }
}

/// Body of create and update requests
#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
    proxied: bool,
    ttl: u32,
}

impl<'a> From<&'a RecordContent> for RecordBody<'a> {
    fn from(record: &'a RecordContent) -> Self {
        RecordBody {
            record_type: record.record_type.as_str(),
            name: &record.name,
            content: &record.content,
            proxied: record.proxied,
            // 1 = automatic
            ttl: 1,
        }
    }
}

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is stateless and single-shot. Which records to touch, and
/// what to do after a failure, is decided by the `Reconciler`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform listing requests normally
/// - Log the intended create/update/delete
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation does NOT expose the credentials.
pub struct CloudflareProvider {
    credentials: Credentials,
    base_url: String,
    client: reqwest::Client,
    dry_run: bool,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the credentials are empty
    /// - `Error::Http` if the HTTP client cannot be built
    pub fn new(credentials: Credentials, dry_run: bool) -> Result<Self> {
        if credentials.is_empty() {
            return Err(Error::config("Cloudflare credentials are required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            credentials,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Create a provider from the settings file, dry-run per `DDNS_MODE`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(Credentials::from_settings(settings), dry_run_from_env())
    }

    /// Point the provider at another API root (used against local test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    fn record_url(&self, zone_id: &str, record_id: &str) -> String {
        format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id)
    }

    /// Send a request and unwrap the v4 envelope
    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<Envelope<T>> {
        let response = self
            .credentials
            .apply(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read response: {}", what, e)))?;

        if !status.is_success() {
            return Err(map_status(status, what, &api_errors(&body)));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::provider("cloudflare", format!("{}: invalid response: {}", what, e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!("{}: {}", what, describe(&envelope.errors)),
            ));
        }

        Ok(envelope)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }
}

/// Map a non-success HTTP status to a specific error
fn map_status(status: StatusCode, what: &str, detail: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid credentials or insufficient permissions ({}): {}",
            what, status, detail
        )),
        404 => Error::not_found(format!("{}: not found ({}): {}", what, status, detail)),
        409 => Error::provider(
            "cloudflare",
            format!("{}: conflict ({}): {}", what, status, detail),
        ),
        429 => Error::rate_limited(format!("{}: rate limit exceeded ({})", what, status)),
        500..=599 => Error::provider(
            "cloudflare",
            format!("{}: server error (transient) ({}): {}", what, status, detail),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{}: unexpected status {}: {}", what, status, detail),
        ),
    }
}

/// Error messages from a failed response body, or the raw body if it is not
/// an envelope
fn api_errors(body: &str) -> String {
    match serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) if !envelope.errors.is_empty() => describe(&envelope.errors),
        _ => body.trim().to_string(),
    }
}

fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request was not successful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>> {
        let url = self.records_url(zone_id);
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let request = self
                .request(Method::GET, &url)
                .query(&[("page", page), ("per_page", PAGE_SIZE)]);
            let envelope: Envelope<Vec<ApiRecord>> =
                self.send(request, "list DNS records").await?;

            records.extend(envelope.result.unwrap_or_default().into_iter().map(DnsRecord::from));

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }

        tracing::debug!("Listed {} records in zone {}", records.len(), zone_id);
        Ok(records)
    }

    async fn create_record(&self, zone_id: &str, record: &RecordContent) -> Result<DnsRecord> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would create {} {}: {}",
                record.record_type,
                record.name,
                record.content
            );
            return Ok(DnsRecord {
                id: String::new(),
                name: record.name.clone(),
                record_type: record.record_type.as_str().to_string(),
                content: record.content.clone(),
                proxied: record.proxied,
            });
        }

        let request = self
            .request(Method::POST, &self.records_url(zone_id))
            .json(&RecordBody::from(record));
        let envelope: Envelope<ApiRecord> = self.send(request, "create DNS record").await?;

        envelope
            .result
            .map(DnsRecord::from)
            .ok_or_else(|| {
                Error::provider("cloudflare", "create DNS record: response has no result")
            })
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordContent,
    ) -> Result<()> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would update {} {} ({}): {}",
                record.record_type,
                record.name,
                record_id,
                record.content
            );
            return Ok(());
        }

        let request = self
            .request(Method::PUT, &self.record_url(zone_id, record_id))
            .json(&RecordBody::from(record));
        self.send::<serde_json::Value>(request, "update DNS record").await?;
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would delete record {}", record_id);
            return Ok(());
        }

        let request = self.request(Method::DELETE, &self.record_url(zone_id, record_id));
        self.send::<serde_json::Value>(request, "delete DNS record").await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}
