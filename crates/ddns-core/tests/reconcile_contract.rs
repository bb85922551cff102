//! Architectural Contract Test: Reconciliation
//!
//! Constraints verified:
//! - One pass converges the zone; the next pass is a no-op
//! - A failing provider call does not stop the rest of the pass
//! - The static IPv6 override replaces the detected address
//! - The reconcile loop runs immediately, on triggers, and stops on cancel
//!
//! If this test fails, someone has:
//! - Added retries or early returns to the apply step
//! - Let the reconcile loop outlive its generation

mod common;

use common::*;
use ddns_core::config::{RecordConfig, RecordType, Settings};
use ddns_core::supervisor::{CancellationCause, generation_context};
use ddns_core::traits::PublicAddrs;
use ddns_core::Reconciler;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn settings(records: Vec<RecordConfig>) -> Settings {
    Settings {
        zone: "zone-1".to_string(),
        token: "token".to_string(),
        records,
        ..Settings::default()
    }
}

fn dual_stack() -> PublicAddrs {
    PublicAddrs::new(
        Some(Ipv4Addr::new(203, 0, 113, 7)),
        Some("2001:db8::7".parse().unwrap()),
    )
}

fn reconciler(zone: &MemoryZone, addrs: PublicAddrs, settings: &Settings) -> Reconciler {
    Reconciler::new(
        Box::new(FixedIpSource { addrs }),
        Box::new(zone.clone()),
        settings,
    )
    .unwrap()
}

#[tokio::test]
async fn one_pass_converges_the_zone() {
    let zone = MemoryZone::with_records(vec![
        zone_record("1", "home.example.com", "A", "198.51.100.1"),
        zone_record("2", "home.example.com", "A", "198.51.100.1"),
        zone_record("3", "gone.example.com", "AAAA", "2001:db8::1"),
        zone_record("4", "example.com", "MX", "mail.example.com"),
    ]);
    let settings = settings(vec![
        RecordConfig::new("home.example.com", RecordType::A),
        RecordConfig::new("home.example.com", RecordType::Aaaa),
    ]);
    let reconciler = reconciler(&zone, dual_stack(), &settings);

    let report = reconciler.reconcile().await.unwrap();
    assert_eq!((report.created, report.updated, report.deleted, report.failed), (1, 1, 2, 0));

    let mut records: Vec<(String, String, String)> = zone
        .records()
        .into_iter()
        .map(|r| (r.name, r.record_type, r.content))
        .collect();
    records.sort();
    assert_eq!(
        records,
        vec![
            ("example.com".into(), "MX".into(), "mail.example.com".into()),
            ("home.example.com".into(), "A".into(), "203.0.113.7".into()),
            ("home.example.com".into(), "AAAA".into(), "2001:db8::7".into()),
        ]
    );

    let calls = zone.calls.load(Ordering::SeqCst);
    assert!(reconciler.reconcile().await.unwrap().is_noop());
    assert_eq!(zone.calls.load(Ordering::SeqCst), calls, "second pass called the provider");
}

#[tokio::test]
async fn failed_call_does_not_stop_the_pass() {
    let zone = MemoryZone::default();
    zone.fail_on("a.example.com");
    let settings = settings(vec![
        RecordConfig::new("a.example.com", RecordType::A),
        RecordConfig::new("b.example.com", RecordType::A),
    ]);

    let report = reconciler(&zone, dual_stack(), &settings).reconcile().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.created, 1);
    assert_eq!(zone.records()[0].name, "b.example.com");
}

#[tokio::test]
async fn static_ipv6_overrides_detected_address() {
    let zone = MemoryZone::default();
    let mut settings = settings(vec![RecordConfig::new("home.example.com", RecordType::Aaaa)]);
    settings.static_ipv6 = "2001:db8::99".to_string();

    reconciler(&zone, dual_stack(), &settings).reconcile().await.unwrap();
    assert_eq!(zone.records()[0].content, "2001:db8::99");

    // Lookup failure still publishes the static address
    let zone = MemoryZone::default();
    reconciler(&zone, PublicAddrs::default(), &settings).reconcile().await.unwrap();
    assert_eq!(zone.records()[0].content, "2001:db8::99");
}

#[tokio::test]
async fn lookup_failure_is_an_error() {
    let zone = MemoryZone::default();
    let settings = settings(vec![RecordConfig::new("home.example.com", RecordType::A)]);
    assert!(reconciler(&zone, PublicAddrs::default(), &settings).reconcile().await.is_err());
    assert_eq!(zone.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_zone_is_a_config_error() {
    let settings = Settings::default();
    let result = Reconciler::new(
        Box::new(FixedIpSource { addrs: dual_stack() }),
        Box::new(MemoryZone::default()),
        &settings,
    );
    assert!(matches!(result, Err(ddns_core::Error::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn loop_runs_on_start_trigger_and_stops_on_cancel() {
    let zone = MemoryZone::default();
    let settings = settings(vec![RecordConfig::new("home.example.com", RecordType::A)]);
    let reconciler = reconciler(&zone, dual_stack(), &settings);

    let (ctx, canceller) = generation_context(1);
    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(1);
    let probe = zone.clone();

    let task = tokio::spawn(async move {
        reconciler
            .run_until_cancelled(&ctx, trigger_rx, Duration::from_secs(300))
            .await;
    });

    // First pass runs immediately
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(probe.records().len(), 1);

    // Manual trigger
    probe.remove_all();
    trigger_tx.send(()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(probe.records().len(), 1);

    // Periodic pass
    probe.remove_all();
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(probe.records().len(), 1);

    canceller.cancel(CancellationCause::ConfigChanged);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("reconcile loop stops on cancellation")
        .unwrap();
}
