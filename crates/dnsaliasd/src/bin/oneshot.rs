// # dnsalias-oneshot - single pass over a configuration document
//
// Reads the document from the path given as the first argument, or from
// stdin, runs every alias once and prints the report as JSON on stdout.
// Logs go to stderr.
//
// Exit codes: 0 success, 1 the run itself failed, 3 alerts carried errors.

use anyhow::{Context, Result};
use dnsalias_core::SingleRunExecutor;
use dnsalias_core::resolver::HickorySourceResolver;
use dnsaliasd::{Config, DnsAliasExitCode, init_tracing, provider_registry};
use serde_json::Value;
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

fn main() -> ExitCode {
    let config = match Config::from_env().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnsAliasExitCode::ConfigError.into();
        }
    };

    if let Err(e) = init_tracing(config.tracing_level(), true) {
        eprintln!("{}", e);
        return DnsAliasExitCode::ConfigError.into();
    }

    let document = match read_document(std::env::args().nth(1)) {
        Ok(document) => document,
        Err(e) => {
            error!("Unable to read configuration: {:#}", e);
            return DnsAliasExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsAliasExitCode::ConfigError.into();
        }
    };

    let code = rt.block_on(async {
        match run(&config, &document).await {
            Ok(code) => code,
            Err(e) => {
                error!("Single-shot run failed: {:#}", e);
                DnsAliasExitCode::ConfigError
            }
        }
    });
    code.into()
}

async fn run(config: &Config, document: &Value) -> Result<DnsAliasExitCode> {
    let resolver = Arc::new(HickorySourceResolver::from_system_conf()?);
    let executor = SingleRunExecutor::new(provider_registry(), resolver);

    let report = executor
        .run_report(document, &config.secret_provider())
        .await;

    let output = serde_json::to_string_pretty(&report).context("Unable to serialize the report")?;
    println!("{}", output);

    let code = if !report.success {
        DnsAliasExitCode::ConfigError
    } else if report.alerts_with_errors() > 0 {
        DnsAliasExitCode::AlertsWithErrors
    } else {
        DnsAliasExitCode::CleanShutdown
    };
    info!(
        "Single-shot run finished with {} alert(s), {} with errors",
        report.alerts.len(),
        report.alerts_with_errors()
    );
    Ok(code)
}

fn read_document(path: Option<String>) -> Result<Value> {
    let text = match path {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("Configuration is not valid JSON")
}
