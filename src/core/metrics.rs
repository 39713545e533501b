use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

pub(crate) const ATTEMPTS_STARTED: &str = "cbt_attempts_started_total";
pub(crate) const ATTEMPTS_SUBMITTED: &str = "cbt_attempts_submitted_total";
pub(crate) const ANSWERS_RECORDED: &str = "cbt_answers_recorded_total";

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    metrics::describe_counter!(ATTEMPTS_STARTED, "Exam attempts created");
    metrics::describe_counter!(ATTEMPTS_SUBMITTED, "Exam attempts finalized, by resulting status");
    metrics::describe_counter!(ANSWERS_RECORDED, "Answers saved against in-progress attempts");
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
