//! Test doubles and common utilities for supervision contract tests
//!
//! These doubles replace the kernel watcher and the server runner so the
//! tests control exactly when events arrive and how long a generation takes
//! to drain.

#![allow(dead_code)]

use ddns_core::error::{Error, Result};
use ddns_core::supervisor::{
    CancellationCause, GenerationContext, Supervisor, SupervisorEvent, SupervisorOptions,
    TerminationSignal,
};
use ddns_core::traits::{
    ChangeKind, ChangeKinds, DnsProvider, DnsRecord, FileWatcher, GenerationRunner, IpSource,
    PublicAddrs, RecordContent, WatchEvent,
};
use ddns_core::Settings;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;

/// A watcher whose events are injected by the test
pub struct ControlledWatcher {
    /// Sender for the test to inject events
    test_tx: mpsc::UnboundedSender<WatchEvent>,
    /// Receiver handed out by the first watch() call
    stream_rx: Mutex<Option<mpsc::UnboundedReceiver<WatchEvent>>>,
    /// Every path passed to add_watch(), in call order
    added: Mutex<Vec<PathBuf>>,
    /// Set by close()
    closed: AtomicBool,
}

impl ControlledWatcher {
    pub fn new() -> Arc<Self> {
        let (test_tx, stream_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            test_tx,
            stream_rx: Mutex::new(Some(stream_rx)),
            added: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Inject an event for `path` as the kernel would report it on the
    /// parent directory watch
    pub fn notify(&self, path: &Path, kind: ChangeKind) {
        let dir = path.parent().unwrap_or(path).to_path_buf();
        let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let _ = self.test_tx.send(WatchEvent::new(dir, name, kind));
    }

    /// Paths registered so far
    pub fn added(&self) -> Vec<PathBuf> {
        self.added.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl FileWatcher for ControlledWatcher {
    fn add_watch(&self, path: &Path, _kinds: ChangeKinds) -> Result<()> {
        if !path.exists() {
            return Err(Error::not_found(path.display().to_string()));
        }
        let mut added = self.added.lock().unwrap();
        if !added.iter().any(|p| p == path) {
            added.push(path.to_path_buf());
        }
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = WatchEvent> + Send + 'static>> {
        match self.stream_rx.lock().unwrap().take() {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty()),
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A runner that records generations and takes a while to shut down
pub struct RecordingRunner {
    /// Generations currently inside run()
    active: AtomicUsize,
    /// Highest value `active` ever reached
    max_active: AtomicUsize,
    /// Settings snapshot of each generation, in start order
    settings: Mutex<Vec<Arc<Settings>>>,
    /// Cause observed by each generation, in stop order
    causes: Mutex<Vec<Option<CancellationCause>>>,
    /// Notified with the generation ID once it observes cancellation
    cancelled_tx: mpsc::UnboundedSender<u64>,
    /// Simulated graceful shutdown time
    shutdown_delay: Duration,
}

impl RecordingRunner {
    pub fn new(shutdown_delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<u64>) {
        let (cancelled_tx, cancelled_rx) = mpsc::unbounded_channel();
        let runner = Arc::new(Self {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            settings: Mutex::new(Vec::new()),
            causes: Mutex::new(Vec::new()),
            cancelled_tx,
            shutdown_delay,
        });
        (runner, cancelled_rx)
    }

    pub fn started(&self) -> usize {
        self.settings.lock().unwrap().len()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> Vec<Arc<Settings>> {
        self.settings.lock().unwrap().clone()
    }

    pub fn causes(&self) -> Vec<Option<CancellationCause>> {
        self.causes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerationRunner for RecordingRunner {
    async fn run(&self, ctx: GenerationContext, settings: Arc<Settings>) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.settings.lock().unwrap().push(settings);

        let cause = ctx.cancelled().await;
        let _ = self.cancelled_tx.send(ctx.generation());

        tokio::time::sleep(self.shutdown_delay).await;

        self.causes.lock().unwrap().push(cause);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A runner that fails immediately, like a listener that cannot bind
pub struct FailingRunner {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl GenerationRunner for FailingRunner {
    async fn run(&self, _ctx: GenerationContext, _settings: Arc<Settings>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::runner("address already in use"))
    }
}

/// Settings directory on disk
pub struct Fixture {
    pub dir: TempDir,
    pub config: PathBuf,
}

impl Fixture {
    pub fn new(config: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, config).unwrap();
        Self { dir, config: path }
    }

    pub fn write_config(&self, content: &str) {
        std::fs::write(&self.config, content).unwrap();
    }

    /// Create (or overwrite) a file relative to the fixture directory
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// Fast timings for tests running on real time
pub fn test_options() -> SupervisorOptions {
    SupervisorOptions {
        quiet_period: Duration::from_millis(20),
        restart_delay: Duration::from_millis(10),
        event_channel_capacity: 64,
    }
}

/// A running supervisor and its handles
pub struct Running {
    pub handle: JoinHandle<Result<TerminationSignal>>,
    pub signals: mpsc::Sender<TerminationSignal>,
    pub events: mpsc::Receiver<SupervisorEvent>,
}

pub fn spawn_supervisor<R: GenerationRunner>(
    fixture: &Fixture,
    watcher: Arc<ControlledWatcher>,
    runner: Arc<R>,
) -> Running {
    let (supervisor, events) = Supervisor::new(&fixture.config, watcher, runner, test_options());
    let (signals, signals_rx) = mpsc::channel(4);
    let handle = tokio::spawn(supervisor.run(signals_rx));
    Running {
        handle,
        signals,
        events,
    }
}

/// Wait for the first event matching `pred`, discarding the others
pub async fn expect_event(
    events: &mut mpsc::Receiver<SupervisorEvent>,
    pred: impl Fn(&SupervisorEvent) -> bool,
) -> SupervisorEvent {
    let wait = async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("supervisor event channel closed");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("expected supervisor event within 5 seconds")
}

/// Assert no event matching `pred` arrives within `window`
pub async fn expect_no_event(
    events: &mut mpsc::Receiver<SupervisorEvent>,
    window: Duration,
    pred: impl Fn(&SupervisorEvent) -> bool,
) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Err(_) | Ok(None) => return,
            Ok(Some(event)) => assert!(!pred(&event), "unexpected supervisor event: {:?}", event),
        }
    }
}

pub fn is_started(generation: u64) -> impl Fn(&SupervisorEvent) -> bool {
    move |event| match event {
        SupervisorEvent::GenerationStarted { generation: g, .. } => *g == generation,
        _ => false,
    }
}

/// An IP source with fixed addresses
pub struct FixedIpSource {
    pub addrs: PublicAddrs,
}

#[async_trait::async_trait]
impl IpSource for FixedIpSource {
    async fn current(&self) -> Result<PublicAddrs> {
        if self.addrs.is_empty() {
            return Err(Error::ip_source("no address"));
        }
        Ok(self.addrs)
    }
}

/// An in-memory zone
#[derive(Clone, Default)]
pub struct MemoryZone {
    records: Arc<Mutex<Vec<DnsRecord>>>,
    next_id: Arc<AtomicUsize>,
    /// Record names whose mutation fails
    failing: Arc<Mutex<Vec<String>>>,
    pub calls: Arc<AtomicUsize>,
}

impl MemoryZone {
    pub fn with_records(records: Vec<DnsRecord>) -> Self {
        let zone = Self::default();
        zone.next_id.store(records.len() + 1, Ordering::SeqCst);
        *zone.records.lock().unwrap() = records;
        zone
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().push(name.to_string());
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Drop every record behind the reconciler's back
    pub fn remove_all(&self) {
        self.records.lock().unwrap().clear();
    }

    fn check(&self, name: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().iter().any(|n| n == name) {
            return Err(Error::dns_provider(format!("refused: {}", name)));
        }
        Ok(())
    }
}

pub fn zone_record(id: &str, name: &str, record_type: &str, content: &str) -> DnsRecord {
    DnsRecord {
        id: id.to_string(),
        name: name.to_string(),
        record_type: record_type.to_string(),
        content: content.to_string(),
        proxied: false,
    }
}

#[async_trait::async_trait]
impl DnsProvider for MemoryZone {
    async fn list_records(&self, _zone_id: &str) -> Result<Vec<DnsRecord>> {
        Ok(self.records())
    }

    async fn create_record(&self, _zone_id: &str, record: &RecordContent) -> Result<DnsRecord> {
        self.check(&record.name)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let created = DnsRecord {
            id,
            name: record.name.clone(),
            record_type: record.record_type.to_string(),
            content: record.content.clone(),
            proxied: record.proxied,
        };
        self.records.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        _zone_id: &str,
        record_id: &str,
        record: &RecordContent,
    ) -> Result<()> {
        self.check(&record.name)?;
        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::not_found(record_id.to_string()))?;
        existing.content = record.content.clone();
        existing.proxied = record.proxied;
        Ok(())
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<()> {
        let name = self
            .records()
            .into_iter()
            .find(|r| r.id == record_id)
            .map(|r| r.name)
            .unwrap_or_default();
        self.check(&name)?;
        self.records.lock().unwrap().retain(|r| r.id != record_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
