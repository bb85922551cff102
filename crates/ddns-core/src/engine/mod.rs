//! Record reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Discovering the public addresses via IpSource
//! - Listing the zone's records via DnsProvider
//! - Planning and applying the create/update/delete calls
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   PublicAddrs   ┌──────────────┐   RecordAction   ┌─────────────┐
//! │  IpSource   │────────────────▶│  Reconciler  │─────────────────▶│ DnsProvider │
//! └─────────────┘                 └──────────────┘                  └─────────────┘
//!                                        ▲
//!                          interval tick │ apply trigger
//! ```
//!
//! ## Event Flow
//!
//! 1. Tick (every `period`, first one immediately) or manual trigger
//! 2. Get public addresses; static IPv6 overrides the detected one
//! 3. List zone records
//! 4. [`plan()`] the actions
//! 5. Apply each action, continuing past individual failures

mod plan;

pub use plan::{RecordAction, plan};

use crate::config::{RecordConfig, Settings};
use crate::error::{Error, Result};
use crate::supervisor::GenerationContext;
use crate::traits::{DnsProvider, IpSource, PublicAddrs};
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default reconciliation period
pub const DEFAULT_RECONCILE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records created
    pub created: usize,
    /// Records updated
    pub updated: usize,
    /// Records deleted
    pub deleted: usize,
    /// Provider calls that failed
    pub failed: usize,
}

impl ReconcileReport {
    /// Whether the zone was already up to date
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Reconciles a zone's A/AAAA records with the desired set
pub struct Reconciler {
    /// IP source for public addresses
    ip_source: Box<dyn IpSource>,

    /// DNS provider owning the zone
    provider: Box<dyn DnsProvider>,

    /// Zone identifier
    zone: String,

    /// Desired records
    records: Vec<RecordConfig>,

    /// IPv6 address published instead of the detected one
    static_ipv6: Option<Ipv6Addr>,
}

impl Reconciler {
    /// Create a reconciler for the zone and records in `settings`
    pub fn new(
        ip_source: Box<dyn IpSource>,
        provider: Box<dyn DnsProvider>,
        settings: &Settings,
    ) -> Result<Self> {
        if settings.zone.is_empty() {
            return Err(Error::config("zone is not configured"));
        }

        Ok(Self {
            ip_source,
            provider,
            zone: settings.zone.clone(),
            records: settings.records.clone(),
            static_ipv6: settings.static_ipv6()?,
        })
    }

    /// Run one reconciliation pass
    ///
    /// # Returns
    ///
    /// - `Ok(report)`: Actions were planned and attempted (some may have failed)
    /// - `Err(Error)`: Addresses or zone records could not be obtained
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let addrs = self.public_addrs().await?;
        if addrs.v6.is_none() {
            warn!("Public IPv6 address not found");
        }

        let actual = self.provider.list_records(&self.zone).await?;
        let actions = plan(&self.records, &actual, addrs);
        debug!(
            "Planned {} action(s) for {} zone record(s)",
            actions.len(),
            actual.len()
        );

        let mut report = ReconcileReport::default();
        for action in actions {
            self.apply(action, &mut report).await;
        }
        Ok(report)
    }

    async fn public_addrs(&self) -> Result<PublicAddrs> {
        match self.ip_source.current().await {
            Ok(addrs) => Ok(addrs.with_static_v6(self.static_ipv6)),
            Err(e) if self.static_ipv6.is_some() => {
                warn!("Public address lookup failed, using static IPv6 only: {}", e);
                Ok(PublicAddrs::new(None, self.static_ipv6))
            }
            Err(e) => Err(e),
        }
    }

    async fn apply(&self, action: RecordAction, report: &mut ReconcileReport) {
        let provider = self.provider.provider_name();
        match action {
            RecordAction::Create(content) => {
                match self.provider.create_record(&self.zone, &content).await {
                    Ok(_) => {
                        info!(
                            "ADD record: {{{} {}: {}}}",
                            content.record_type,
                            content.name,
                            content.content
                        );
                        report.created += 1;
                    }
                    Err(e) => {
                        error!(
                            provider,
                            "Failed to create {} {}: {}",
                            content.record_type,
                            content.name,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
            RecordAction::Update { id, content } => {
                match self.provider.update_record(&self.zone, &id, &content).await {
                    Ok(()) => {
                        info!(
                            "PATCH record: {{{} {}: {}}}",
                            content.record_type,
                            content.name,
                            content.content
                        );
                        report.updated += 1;
                    }
                    Err(e) => {
                        error!(
                            provider,
                            "Failed to update {} {}: {}",
                            content.record_type,
                            content.name,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
            RecordAction::Delete(record) => {
                match self.provider.delete_record(&self.zone, &record.id).await {
                    Ok(()) => {
                        info!(
                            "DELETE record: {{{} {}: {}}}",
                            record.record_type,
                            record.name,
                            record.content
                        );
                        report.deleted += 1;
                    }
                    Err(e) => {
                        error!(
                            provider,
                            "Failed to delete {} {}: {}",
                            record.record_type,
                            record.name,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
        }
    }

    /// Reconcile every `period` and on each trigger until `ctx` is cancelled
    ///
    /// The first pass runs immediately. Triggers arriving while a pass is in
    /// flight are picked up after it. A pass in flight is abandoned on
    /// cancellation.
    pub async fn run_until_cancelled(
        &self,
        ctx: &GenerationContext,
        mut triggers: mpsc::Receiver<()>,
        period: Duration,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => debug!("Periodic reconciliation"),
                Some(()) = triggers.recv() => debug!("Reconciliation triggered"),
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                result = self.reconcile() => match result {
                    Ok(report) if report.is_noop() => debug!("Records up to date"),
                    Ok(report) => info!(
                        created = report.created,
                        updated = report.updated,
                        deleted = report.deleted,
                        failed = report.failed,
                        "Reconciliation finished"
                    ),
                    Err(e) => error!("Reconciliation failed: {}", e),
                },
            }
        }

        debug!(generation = ctx.generation(), "Reconcile loop stopped");
    }
}
