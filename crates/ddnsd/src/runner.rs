//! The daemon's generation: HTTP control surface plus periodic reconciliation

use crate::http::{self, AppState, TlsFiles};
use crate::logging::LogFile;
use async_trait::async_trait;
use ddns_core::engine::DEFAULT_RECONCILE_PERIOD;
use ddns_core::{GenerationContext, GenerationRunner, Reconciler, Settings};
use ddns_ip_http::HttpIpSource;
use ddns_provider_cloudflare::CloudflareProvider;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runs one generation of the daemon from a given settings snapshot
pub struct DaemonRunner {
    log: LogFile,
    reconcile_period: Duration,
}

impl DaemonRunner {
    pub fn new(log: LogFile) -> Self {
        Self {
            log,
            reconcile_period: DEFAULT_RECONCILE_PERIOD,
        }
    }

    /// Build the reconciler, `None` when no zone or credentials are configured
    fn reconciler(settings: &Settings) -> ddns_core::Result<Option<Reconciler>> {
        if settings.zone.is_empty() || settings.token.is_empty() {
            warn!("No zone or API credentials configured, DNS reconciliation disabled");
            return Ok(None);
        }

        let ip_source = HttpIpSource::new()?;
        let provider = CloudflareProvider::from_settings(settings)?;
        Reconciler::new(Box::new(ip_source), Box::new(provider), settings).map(Some)
    }
}

#[async_trait]
impl GenerationRunner for DaemonRunner {
    async fn run(&self, ctx: GenerationContext, settings: Arc<Settings>) -> ddns_core::Result<()> {
        info!(
            generation = ctx.generation(),
            "Generation starting: {} record(s)",
            settings.records.len()
        );

        if let Err(e) = self.log.set_path(&settings.data) {
            warn!("Log file unavailable: {}", e);
        }

        let reconciler = Self::reconciler(&settings)?;

        let (apply_tx, apply_rx) = mpsc::channel(1);
        let app = http::router(
            AppState {
                log: self.log.clone(),
                apply: apply_tx,
            },
            &settings.www,
        );

        let https = settings.tls_enabled().then(|| {
            (
                settings.https,
                TlsFiles {
                    cert: Path::new(&settings.tls_cert),
                    key: Path::new(&settings.tls_key),
                },
            )
        });

        let reconcile = async {
            match &reconciler {
                Some(reconciler) => {
                    reconciler
                        .run_until_cancelled(&ctx, apply_rx, self.reconcile_period)
                        .await
                }
                None => {
                    drop(apply_rx);
                    ctx.cancelled().await;
                }
            }
        };

        tokio::join!(reconcile, http::serve(&ctx, app, settings.http, https));

        info!(generation = ctx.generation(), "Generation stopped");
        Ok(())
    }
}
