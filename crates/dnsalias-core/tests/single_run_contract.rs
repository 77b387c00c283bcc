//! Architectural Contract Test: Single-Shot Runs
//!
//! Constraints verified:
//! - Every alias runs exactly once
//! - Every failure becomes an alert, with no tolerated streak
//! - A panicking check is reported as a failure
//! - Configuration errors fail the run before any alias runs
//! - A configured alert sink receives the same alerts as the report

mod common;

use common::{Recorder, ScriptedResolver, alias, document, recording_provider, registry_with};
use dnsalias_core::alert::AlertCategory;
use dnsalias_core::secrets::StaticSecretProvider;
use dnsalias_core::SingleRunExecutor;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn two_aliases() -> serde_json::Value {
    document(
        json!({ "primary": recording_provider(&["dest.com"]) }),
        json!({
            "portal": alias("primary", "portal.example.net", "portal.dest.com"),
            "www": alias("primary", "www.example.net", "www.dest.com")
        }),
    )
}

#[tokio::test]
async fn every_alias_runs_once() {
    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    resolver.answer("portal.example.net", &[[10, 0, 0, 1]], 60);
    resolver.answer("www.example.net", &[[10, 0, 0, 2]], 60);

    let executor = SingleRunExecutor::new(registry_with(&recorder), resolver.clone());
    let report = executor
        .run_report(&two_aliases(), &StaticSecretProvider::new())
        .await;

    assert!(report.success);
    assert!(report.error.is_none());
    assert!(!report.failed());
    assert_eq!(resolver.call_count(), 2, "each alias is resolved exactly once");
    assert_eq!(report.alerts.len(), 2);
    assert!(
        report
            .alerts
            .iter()
            .all(|a| a.category == AlertCategory::ResolutionChange)
    );
    assert_eq!(recorder.a_values("dest.com", "portal").await, vec!["10.0.0.1"]);
    assert_eq!(recorder.a_values("dest.com", "www").await, vec!["10.0.0.2"]);
}

#[tokio::test]
async fn first_failure_is_alerted() {
    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    resolver.answer("portal.example.net", &[[10, 0, 0, 1]], 60);
    resolver.fail("www.example.net");

    let executor = SingleRunExecutor::new(registry_with(&recorder), resolver);
    let report = executor
        .run_report(&two_aliases(), &StaticSecretProvider::new())
        .await;

    assert!(report.success, "alias failures do not fail the run itself");
    assert!(report.failed());
    assert_eq!(report.alerts_with_errors(), 1);

    let mut categories: Vec<AlertCategory> = report.alerts.iter().map(|a| a.category).collect();
    categories.sort();
    let mut expected = vec![AlertCategory::ResolutionChange, AlertCategory::LookupException];
    expected.sort();
    assert_eq!(categories, expected);
}

#[tokio::test]
async fn panicking_alias_fails_the_run() {
    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    resolver.answer("portal.example.net", &[[10, 0, 0, 1]], 60);
    resolver.answer("www.example.net", &[[10, 0, 0, 2]], 60);
    resolver.panic_next("www.example.net", 1);

    let executor = SingleRunExecutor::new(registry_with(&recorder), resolver);
    let report = executor
        .run_report(&two_aliases(), &StaticSecretProvider::new())
        .await;

    assert!(report.failed(), "a panicked check counts as failed");
    assert_eq!(report.alerts_with_errors(), 1);
    let panicked = report
        .alerts
        .iter()
        .find(|a| a.category == AlertCategory::ProcessingException)
        .expect("the panic is alerted");
    let detail = panicked.error.as_ref().expect("the alert carries the panic");
    assert!(detail.message.contains("resolver blew up on www.example.net"));
    assert_eq!(recorder.a_values("dest.com", "portal").await, vec!["10.0.0.1"]);
}

#[tokio::test]
async fn configuration_error_fails_the_run() {
    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    let executor = SingleRunExecutor::new(registry_with(&recorder), resolver.clone());

    let config = document(
        json!({ "primary": recording_provider(&["dest.com"]) }),
        json!({ "portal": alias("missing", "portal.example.net", "portal.dest.com") }),
    );
    let report = executor.run_report(&config, &StaticSecretProvider::new()).await;

    assert!(!report.success);
    assert!(report.failed());
    let detail = report.error.expect("failed run carries its error");
    assert!(detail.message.contains("DNS provider missing is not defined."), "got {}", detail.message);
    assert_eq!(resolver.call_count(), 0, "nothing runs when the document is rejected");
}

#[tokio::test]
async fn configured_sink_receives_alerts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    resolver.answer("portal.example.net", &[[10, 0, 0, 1]], 60);
    resolver.answer("www.example.net", &[[10, 0, 0, 2]], 60);

    let mut config = two_aliases();
    config["alerts"] = json!({ "type": "webhook", "url": format!("{}/alerts", server.uri()) });
    config["logOutput"] = json!(false);

    let executor = SingleRunExecutor::new(registry_with(&recorder), resolver);
    let report = executor.run_report(&config, &StaticSecretProvider::new()).await;

    assert!(report.success);
    assert_eq!(report.alerts.len(), 2);
    server.verify().await;
}

#[tokio::test]
async fn report_serializes_for_output() {
    let recorder = Recorder::new();
    let resolver = ScriptedResolver::new();
    resolver.fail("portal.example.net");

    let config = document(
        json!({ "primary": recording_provider(&["dest.com"]) }),
        json!({ "portal": alias("primary", "portal.example.net", "portal.dest.com") }),
    );
    let executor = SingleRunExecutor::new(registry_with(&recorder), resolver);
    let report = executor.run_report(&config, &StaticSecretProvider::new()).await;

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["alerts"][0]["category"], "LOOKUP_EXCEPTION");
    assert_eq!(value["alerts"][0]["error"]["errorClass"], "LookupError");
}
