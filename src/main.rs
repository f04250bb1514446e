// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Process entrypoint for the database telemetry collector
//! (`SPEC_FULL.md` §2: binary `otap-df` / `df_engine`): load a pipeline
//! configuration, build the collector's pipelines, and run to shutdown.

#[cfg(all(not(windows), feature = "jemalloc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(all(feature = "mimalloc", not(all(not(windows), feature = "jemalloc"))))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static DHAT_ALLOC: dhat::Alloc = dhat::Alloc;

use clap::Parser;
use otap_df_config::engine::OtelDataflowSpec;
use otap_df_controller::Controller;
use otap_df_dbtel::DBTEL_PIPELINE_FACTORY;
use otap_df_telemetry::otel_error;
use std::path::PathBuf;
use std::process::ExitCode;

/// Database telemetry collector: scrapes PostgreSQL/MySQL query-execution
/// logs and host metrics, runs them through the adaptive sampler, circuit
/// breaker, plan extractor, query correlator, verification, cost control,
/// and error monitor stages, and forwards the result to the configured
/// sinks (`SPEC_FULL.md` §4).
#[derive(Parser, Debug)]
#[command(name = "df_engine", version, about)]
struct Args {
    /// Path to the pipeline configuration file (YAML or JSON).
    #[arg(short, long)]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    let engine_config = match OtelDataflowSpec::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            otel_error!("df_engine.config_load_failed", error = e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let controller = Controller::new(&DBTEL_PIPELINE_FACTORY);
    if let Err(e) = controller.run_forever(engine_config) {
        otel_error!("df_engine.controller_failed", error = e.to_string());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
