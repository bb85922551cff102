//! HTTP control surface
//!
//! - `GET /vapi/version`: daemon version
//! - `GET /vapi/logs`: JSON log lines of the current log file
//! - `DELETE /vapi/logs`: rotate the log file
//! - `POST /vapi/records/apply`: trigger a reconciliation pass
//! - anything else: static files from the `www` directory
//!
//! Listeners live exactly as long as their generation. A port that cannot be
//! bound is retried every second until the generation is cancelled.

use crate::logging::LogFile;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use ddns_core::GenerationContext;
use serde_json::{Value, json};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Delay between bind attempts
const BIND_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long in-flight requests may finish after cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// State shared by the handlers of one generation
#[derive(Clone)]
pub struct AppState {
    pub log: LogFile,
    pub apply: mpsc::Sender<()>,
}

/// Build the router for one generation
pub fn router(state: AppState, www: &Path) -> Router {
    Router::new()
        .route("/vapi/version", get(version))
        .route("/vapi/logs", get(read_logs).delete(rotate_logs))
        .route("/vapi/records/apply", post(apply))
        .fallback_service(ServeDir::new(www))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

async fn read_logs(State(state): State<AppState>) -> Result<Json<Vec<Value>>, StatusCode> {
    state.log.entries().await.map(Json).map_err(|e| {
        error!("Failed to read log file: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn rotate_logs(State(state): State<AppState>) -> StatusCode {
    let log = state.log.clone();
    match tokio::task::spawn_blocking(move || log.rotate()).await {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(e)) => {
            error!("Failed to rotate log file: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            error!("Log rotation task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn apply(State(state): State<AppState>) -> Json<Value> {
    match state.apply.try_send(()) {
        Ok(()) => debug!("Reconciliation requested"),
        // A pass is already queued; this request joins it
        Err(mpsc::error::TrySendError::Full(())) => debug!("Reconciliation already pending"),
        Err(mpsc::error::TrySendError::Closed(())) => {
            warn!("Reconciliation requested but no reconciler is running")
        }
    }
    Json(json!({}))
}

/// TLS material for the HTTPS listener
pub struct TlsFiles<'a> {
    pub cert: &'a Path,
    pub key: &'a Path,
}

/// Serve `app` on `http_port`, and on `https_port` when `tls` is given,
/// until `ctx` is cancelled
pub async fn serve(
    ctx: &GenerationContext,
    app: Router,
    http_port: u16,
    https: Option<(u16, TlsFiles<'_>)>,
) {
    let plain = serve_listener(ctx, app.clone(), http_port, None);

    let secure = async {
        let Some((port, files)) = https else {
            return;
        };
        match RustlsConfig::from_pem_file(files.cert, files.key).await {
            Ok(config) => serve_listener(ctx, app, port, Some(config)).await,
            Err(e) => error!(
                "HTTPS disabled: failed to load {} / {}: {}",
                files.cert.display(),
                files.key.display(),
                e
            ),
        }
    };

    tokio::join!(plain, secure);
}

async fn serve_listener(
    ctx: &GenerationContext,
    app: Router,
    port: u16,
    tls: Option<RustlsConfig>,
) {
    let scheme = if tls.is_some() { "https" } else { "http" };
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let listener = loop {
        match std::net::TcpListener::bind(addr).and_then(|l| {
            l.set_nonblocking(true)?;
            Ok(l)
        }) {
            Ok(listener) => break listener,
            Err(e) => {
                warn!("{} server listen {}: {}", scheme, addr, e);
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = tokio::time::sleep(BIND_RETRY_DELAY) => {}
                }
            }
        }
    };

    info!("{} server listen: {}", scheme, addr);

    let handle = Handle::new();
    let shutdown = handle.clone();
    let cancel = ctx.clone();
    let watcher = tokio::spawn(async move {
        cancel.cancelled().await;
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let service = app.into_make_service();
    let result = match tls {
        Some(config) => {
            axum_server::from_tcp_rustls(listener, config)
                .handle(handle)
                .serve(service)
                .await
        }
        None => axum_server::from_tcp(listener).handle(handle).serve(service).await,
    };

    watcher.abort();
    match result {
        Ok(()) => debug!("{} server on {} stopped", scheme, addr),
        Err(e) => error!("{} server on {} failed: {}", scheme, addr, e),
    }
}
