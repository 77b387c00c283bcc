//! Architectural Contract Test: TTL-Driven Dispatch
//!
//! Constraints verified:
//! - Each alias is rechecked when its lowest source TTL expires
//! - Rechecks never come faster than the minimum schedule floor
//! - Lookup and update failures alert only after the allowed streak
//! - A deactivated entry never runs again
//! - `stop` waits for running checks up to the grace period
//! - A panicking check is alerted and rechecked
//! - A restart keeps pending due times and restaggers overdue entries
//!
//! All tests run on a paused clock.

mod common;

use common::{Recorder, ScriptedResolver, alias, document, recording_provider, registry_with};
use dnsalias_core::alert::{AlertCategory, AlertRouting, CollectingAlertSink};
use dnsalias_core::secrets::StaticSecretProvider;
use dnsalias_core::Scheduler;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

struct Harness {
    scheduler: Scheduler,
    resolver: Arc<ScriptedResolver>,
    recorder: Arc<Recorder>,
    alerts: Arc<CollectingAlertSink>,
}

impl Harness {
    fn started() -> Self {
        let recorder = Recorder::new();
        let resolver = ScriptedResolver::new();
        let scheduler = Scheduler::new(registry_with(&recorder), resolver.clone());
        scheduler.start().unwrap();
        Self {
            scheduler,
            resolver,
            recorder,
            alerts: Arc::new(CollectingAlertSink::new()),
        }
    }

    /// Apply `config`, then route alerts to the collector
    fn configure(&self, config: &Value) {
        self.scheduler
            .configure(config, &StaticSecretProvider::new())
            .unwrap();
        self.scheduler
            .alert_sink()
            .apply(AlertRouting::to_sink(self.alerts.clone()));
    }

    fn categories(&self) -> Vec<AlertCategory> {
        self.alerts.alerts().iter().map(|a| a.category).collect()
    }
}

fn portal_document(source: &str) -> Value {
    document(
        json!({ "primary": recording_provider(&["dest.com"]) }),
        json!({ "portal": alias("primary", source, "portal.dest.com") }),
    )
}

#[tokio::test(start_paused = true)]
async fn recheck_follows_source_ttl() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 30);
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.call_count(), 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.resolver.call_count(), 2, "second check is due one TTL after the first");

    sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.resolver.call_count(), 3);

    assert_eq!(harness.recorder.creates(), 1, "an unchanged answer must not be rewritten");
    assert_eq!(harness.categories(), vec![AlertCategory::ResolutionChange]);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_is_held_to_schedule_floor() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 0);
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_millis(1000)).await;

    let calls = harness.resolver.call_count();
    assert!(
        (9..=11).contains(&calls),
        "a zero TTL must be rechecked every 100ms, got {} checks in one second",
        calls
    );
}

#[tokio::test(start_paused = true)]
async fn lookup_failures_alert_after_allowed_streak() {
    let harness = Harness::started();
    harness.resolver.fail("origin.example.net");
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.call_count(), 1);
    assert!(harness.alerts.alerts().is_empty(), "the first failure is tolerated");

    sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.resolver.call_count(), 2, "failures are rechecked after 300 seconds");
    let alerts = harness.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::LookupException);
    assert_eq!(
        alerts[0].message,
        "An exception occurred reading source data for alias([origin.example.net]->(portal,dest.com))"
    );
    let detail = alerts[0].error.as_ref().expect("lookup alert carries its error");
    assert!(detail.message.contains("system resolver"), "got {}", detail.message);

    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    sleep(Duration::from_secs(300)).await;
    assert_eq!(
        harness.categories(),
        vec![AlertCategory::LookupException, AlertCategory::ResolutionChange]
    );

    harness.resolver.fail("origin.example.net");
    sleep(Duration::from_secs(100)).await;
    assert_eq!(harness.resolver.call_count(), 4);
    assert_eq!(
        harness.alerts.alerts().len(),
        2,
        "a success resets the failure streak"
    );
}

#[tokio::test(start_paused = true)]
async fn update_failures_alert_after_allowed_streak() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    harness.recorder.fail_writes(true);
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.recorder.creates(), 1);
    assert!(harness.alerts.alerts().is_empty());

    sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.recorder.creates(), 2);
    assert_eq!(harness.categories(), vec![AlertCategory::UpdateException]);
    assert_eq!(
        harness.alerts.alerts()[0].message,
        "An exception occurred in the DNS provider for alias([origin.example.net]->(portal,dest.com))"
    );

    harness.recorder.fail_writes(false);
    sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.recorder.a_values("dest.com", "portal").await, vec!["10.0.0.1"]);
    assert_eq!(
        harness.categories(),
        vec![AlertCategory::UpdateException, AlertCategory::ResolutionChange]
    );
}

#[tokio::test(start_paused = true)]
async fn removed_alias_never_runs_again() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.call_count(), 1);

    harness.configure(&document(
        json!({ "primary": recording_provider(&["dest.com"]) }),
        json!({}),
    ));

    sleep(Duration::from_secs(600)).await;
    assert_eq!(harness.resolver.call_count(), 1, "a removed alias must not be checked again");
    assert_eq!(harness.scheduler.queued_len(), 0, "the stale queue slot is discarded when it surfaces");
}

#[tokio::test(start_paused = true)]
async fn changed_alias_replaces_old_version() {
    let harness = Harness::started();
    harness.resolver.answer("old.example.net", &[[10, 0, 0, 1]], 60);
    harness.resolver.answer("new.example.net", &[[10, 0, 0, 2]], 60);
    harness.configure(&portal_document("old.example.net"));

    sleep(Duration::from_secs(1)).await;
    harness.configure(&portal_document("new.example.net"));

    sleep(Duration::from_secs(100)).await;
    assert_eq!(harness.resolver.calls_for("old.example.net"), 1);
    assert_eq!(harness.resolver.calls_for("new.example.net"), 2);
    assert_eq!(harness.recorder.a_values("dest.com", "portal").await, vec!["10.0.0.2"]);
    assert_eq!(harness.scheduler.queued_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn identical_reload_does_not_reschedule() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    let config = portal_document("origin.example.net");
    harness.configure(&config);

    sleep(Duration::from_secs(1)).await;
    harness.configure(&config);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.call_count(), 1, "a kept entry keeps its schedule");

    sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.resolver.call_count(), 2);
    assert_eq!(harness.recorder.finds(), 1, "a kept entry keeps its processor state");
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_running_checks() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    harness.resolver.delay("origin.example.net", Duration::from_secs(10));
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_millis(1)).await;
    assert_eq!(harness.resolver.call_count(), 1);

    let began = Instant::now();
    harness.scheduler.stop().await;
    let waited = began.elapsed();

    assert!(waited >= Duration::from_secs(9), "stop returned after {:?}", waited);
    assert!(waited < Duration::from_secs(30));
    assert_eq!(harness.recorder.creates(), 1, "the running check completes");
    assert!(!harness.scheduler.is_running());
    assert_eq!(harness.scheduler.queued_len(), 0);

    sleep(Duration::from_secs(600)).await;
    assert_eq!(harness.resolver.call_count(), 1, "nothing runs after stop");
}

#[tokio::test(start_paused = true)]
async fn stop_abandons_checks_after_grace() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    harness.resolver.delay("origin.example.net", Duration::from_secs(120));
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_millis(1)).await;

    let began = Instant::now();
    harness.scheduler.stop().await;
    let waited = began.elapsed();

    assert!(
        waited >= Duration::from_secs(30) && waited < Duration::from_secs(31),
        "stop must give up after the grace period, waited {:?}",
        waited
    );
    assert!(!harness.scheduler.is_running());
}

fn pair_document() -> Value {
    document(
        json!({ "primary": recording_provider(&["dest.com"]) }),
        json!({
            "a": alias("primary", "a.example.net", "a.dest.com"),
            "b": alias("primary", "b.example.net", "b.dest.com")
        }),
    )
}

#[tokio::test(start_paused = true)]
async fn first_start_staggers_configured_entries() {
    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    resolver.answer("a.example.net", &[[10, 0, 0, 1]], 600);
    resolver.answer("b.example.net", &[[10, 0, 0, 2]], 600);
    let scheduler = Scheduler::new(registry_with(&recorder), resolver.clone());
    scheduler
        .configure(&pair_document(), &StaticSecretProvider::new())
        .unwrap();

    scheduler.start().unwrap();
    assert_eq!(scheduler.queued_len(), 2);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(resolver.calls_for("a.example.net"), 1);
    assert_eq!(resolver.calls_for("b.example.net"), 0);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(resolver.calls_for("b.example.net"), 1, "entries start five seconds apart");
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn restart_keeps_pending_schedule() {
    let harness = Harness::started();
    harness.resolver.answer("a.example.net", &[[10, 0, 0, 1]], 600);
    harness.resolver.answer("b.example.net", &[[10, 0, 0, 2]], 600);
    harness.configure(&pair_document());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.resolver.call_count(), 2);

    harness.scheduler.stop().await;
    harness.scheduler.start().unwrap();
    assert_eq!(harness.scheduler.queued_len(), 2);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.resolver.call_count(), 2, "a restart must not pull pending checks forward");

    sleep(Duration::from_secs(600)).await;
    assert_eq!(harness.resolver.calls_for("a.example.net"), 2);
    assert_eq!(harness.resolver.calls_for("b.example.net"), 2);
}

#[tokio::test(start_paused = true)]
async fn restart_restaggers_overdue_entries() {
    let harness = Harness::started();
    harness.resolver.answer("a.example.net", &[[10, 0, 0, 1]], 600);
    harness.resolver.answer("b.example.net", &[[10, 0, 0, 2]], 600);
    harness.configure(&pair_document());

    sleep(Duration::from_secs(2)).await;
    harness.scheduler.stop().await;
    sleep(Duration::from_secs(700)).await;
    assert_eq!(harness.resolver.call_count(), 2, "nothing runs while stopped");

    harness.scheduler.start().unwrap();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.calls_for("a.example.net"), 2);
    assert_eq!(harness.resolver.calls_for("b.example.net"), 1);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.resolver.calls_for("b.example.net"), 2, "overdue entries restart five seconds apart");
}

#[tokio::test(start_paused = true)]
async fn panicking_check_alerts_and_is_rechecked() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 30);
    harness.resolver.panic_next("origin.example.net", 1);
    harness.configure(&portal_document("origin.example.net"));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.call_count(), 1);
    let alerts = harness.alerts.alerts();
    assert_eq!(alerts.len(), 1, "a panic is alerted without waiting for a streak");
    assert_eq!(alerts[0].category, AlertCategory::ProcessingException);
    let detail = alerts[0].error.as_ref().expect("the panic is attached to the alert");
    assert!(detail.message.contains("resolver blew up"), "got {}", detail.message);
    assert_eq!(harness.scheduler.queued_len(), 1, "the alias stays scheduled");

    sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.resolver.call_count(), 2, "a panicked check is retried at the failure interval");
    assert_eq!(harness.recorder.a_values("dest.com", "portal").await, vec!["10.0.0.1"]);
    assert_eq!(
        harness.categories(),
        vec![AlertCategory::ProcessingException, AlertCategory::ResolutionChange]
    );
}

#[tokio::test(start_paused = true)]
async fn reconfigure_during_check_keeps_only_replacement() {
    let harness = Harness::started();
    harness.resolver.answer("a.example.net", &[[10, 0, 0, 1]], 30);
    harness.resolver.answer("b.example.net", &[[10, 0, 0, 2]], 30);
    harness.resolver.delay("a.example.net", Duration::from_secs(5));
    harness.configure(&portal_document("a.example.net"));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.calls_for("a.example.net"), 1, "the first check is in flight");

    harness.configure(&portal_document("b.example.net"));

    sleep(Duration::from_secs(200)).await;
    assert_eq!(
        harness.resolver.calls_for("a.example.net"),
        1,
        "the replaced entry must not re-queue itself when its check finishes"
    );
    assert_eq!(
        harness.resolver.calls_for("b.example.net"),
        7,
        "the replacement runs every 30 seconds from its own start"
    );
    assert_eq!(harness.scheduler.queued_len(), 1);
    assert_eq!(harness.scheduler.aliases().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_ignored() {
    let harness = Harness::started();
    harness.resolver.answer("origin.example.net", &[[10, 0, 0, 1]], 60);
    harness.configure(&portal_document("origin.example.net"));

    harness.scheduler.start().unwrap();
    sleep(Duration::from_secs(1)).await;

    assert!(harness.scheduler.is_running());
    assert_eq!(harness.resolver.call_count(), 1);
    assert_eq!(harness.scheduler.queued_len(), 1);
}

#[test]
fn start_requires_runtime() {
    let recorder = Recorder::new();
    let scheduler = Scheduler::new(registry_with(&recorder), ScriptedResolver::new());
    assert!(scheduler.start().is_err());
    assert!(!scheduler.is_running());
}
