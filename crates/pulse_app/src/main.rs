mod config;
mod logging;
mod signals;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use pipeline_logging::{pipeline_error, pipeline_info, pipeline_warn};
use pulse_core::ExitStatus;
use pulse_engine::{
    export_records, ExtractRules, FetchSettings, HttpSessionFetcher, MemoryStore,
    OverviewExtractor, Pipeline, PipelineSettings,
};

use config::{load_config, AppConfig, CONFIG_FILENAME};
use logging::LogDestination;

fn main() -> ExitCode {
    logging::initialize(LogDestination::Both);
    let config = load_config(Path::new(CONFIG_FILENAME));

    match run(&config) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            pipeline_error!("startup failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &AppConfig) -> anyhow::Result<u8> {
    pipeline_info!(
        "ingestion run starting: {} target(s), confirmation={}",
        config.targets.len(),
        config.confirmation_enabled
    );

    let store = Arc::new(MemoryStore::with_targets(config.targets.iter().cloned()));
    let fetcher =
        HttpSessionFetcher::new(FetchSettings::default()).context("fetch session setup")?;
    let extractor = OverviewExtractor::new(ExtractRules::default());

    let mut settings = PipelineSettings::new(config.entry_url.clone());
    settings.confirmation_enabled = config.confirmation_enabled;
    settings.confirm_timeout = config.confirm_timeout();
    settings.gate_poll_interval = config.gate_poll_interval();

    let mut pipeline = Pipeline::new(
        store.clone(),
        Box::new(fetcher),
        Box::new(extractor),
        settings,
    );
    if config.confirmation_enabled {
        pipeline = pipeline.with_signals(signals::spawn_stdin_signals());
    }

    let report = pipeline.run_full_pipeline();

    let records = store.records();
    match export_records(Path::new(&config.output_dir), &records) {
        Ok(summary) => pipeline_info!(
            "exported {} record(s) to {:?}",
            summary.record_count,
            summary.output_path
        ),
        Err(err) => pipeline_error!("record export failed: {err}"),
    }

    if report.status != ExitStatus::Completed {
        pipeline_warn!("run ended early with status {:?}", report.status);
    }
    Ok(report.status.code() as u8)
}
