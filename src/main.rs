// SPDX-License-Identifier: MIT
use anyhow::Result;
use logship::telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, instrument, warn};

#[instrument]
async fn simulated_work() {
    info!(task = "simulated_work", "starting task");
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    warn!(task = "simulated_work", retries = 1, "upstream slow, retried once");
    info!(task = "simulated_work", "completed task");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = TelemetryConfig::from_env()?;
    let telemetry = init_telemetry(cfg.clone())?;
    info!(
        service = %cfg.service_name,
        endpoint = %cfg.endpoint,
        export_timeout_secs = cfg.export_timeout.as_secs(),
        max_record_bytes = cfg.max_record_bytes,
        "application started"
    );

    simulated_work().await;

    info!("shutting down");
    let stats = telemetry.log_stream().stats();
    telemetry.shutdown()?;
    eprintln!(
        "console records: {} written, {} truncated, {} dropped",
        stats.records, stats.truncated, stats.dropped
    );
    Ok(())
}
