mod allarches;
mod analyzer;
mod buildroot;
mod cli;
mod config;
mod data;
mod koji;
mod lock;
mod maintainers;
mod outputs;
mod progress;
mod query;
mod rootlog;
mod runner;
mod solver;
mod views;

use crate::data::AnalyzedData;
use crate::progress::log_progress;
use crate::solver::{Solver, SubprocessSolver};
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

fn timestamp_now() -> String {
    Local::now().format("%m/%d/%Y, %H:%M:%S").to_string()
}

/// Runs every analysis phase in order against a fresh solver backend.
/// Each phase hands its results to the next through the shared data map;
/// only this driver ever writes to it.
fn analyze_everything(
    settings: &config::Settings,
    configs: &config::Configs,
) -> Result<AnalyzedData> {
    let tmp = tempfile::tempdir().context("creating the temporary work directory")?;

    let dnf_cache_dir = match &settings.dnf_cache_dir_override {
        Some(dir) => dir.clone(),
        None => tmp.path().join("dnf_cachedir"),
    };
    let install_roots_dir = tmp.path().join("installroots");
    fs::create_dir_all(&dnf_cache_dir)
        .with_context(|| format!("creating {}", dnf_cache_dir.display()))?;
    fs::create_dir_all(&install_roots_dir)
        .with_context(|| format!("creating {}", install_roots_dir.display()))?;

    let solver: Arc<dyn Solver> = Arc::new(SubprocessSolver {
        command: settings.solver_command.clone(),
        dnf_cache_dir,
        install_roots_dir,
    });

    let mut data = AnalyzedData::default();

    log_progress("phase=repos status=started");
    analyzer::analyze_repos(&solver, configs, &mut data)?;

    log_progress("phase=envs status=started");
    analyzer::analyze_envs(&solver, configs, &mut data)?;

    log_progress("phase=workloads status=started");
    analyzer::analyze_workloads(&solver, configs, settings, &mut data)?;

    log_progress("phase=views status=started");
    views::analyze_views(configs, &mut data)?;

    log_progress("phase=buildroot status=started");
    buildroot::analyze_buildroot(&solver, configs, settings, &mut data)?;

    log_progress("phase=unwanted status=started");
    views::add_unwanted_packages_to_views(configs, &mut data);

    log_progress("phase=views-all-arches status=started");
    allarches::generate_views_all_arches(configs, &mut data)?;

    log_progress("phase=maintainers status=started");
    maintainers::recommend_maintainers(configs, settings, &mut data);

    Ok(data)
}

fn run_pipeline(settings: &config::Settings) -> Result<()> {
    let time_started = timestamp_now();

    let (configs, data) = if settings.use_cache {
        log_progress("phase=pipeline status=loading-caches");
        outputs::load_caches(settings)?
    } else {
        let configs = config::get_configs(settings)?;
        let data = analyze_everything(settings, &configs)?;
        if settings.dev_buildroot {
            outputs::write_caches(settings, &configs, &data)?;
        }
        (configs, data)
    };

    let time_analysis_done = timestamp_now();

    let query = query::Query::new(&data, &configs, settings);
    outputs::generate_data_files(&query)?;

    let time_ended = timestamp_now();

    println!("packset run done");
    println!("  Started:       {time_started}");
    println!("  Analysis done: {time_analysis_done}");
    println!("  Finished:      {time_ended}");

    Ok(())
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let settings = cli.settings();

    if let Err(err) = settings.validate() {
        eprintln!("packset failed: {err:#}");
        return ExitCode::FAILURE;
    }

    progress::install_ctrlc_handler();

    let _session = match lock::SessionGuard::acquire(&settings.output_dir, &settings.configs_dir)
    {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("packset failed: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run_pipeline(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            progress::stop_active_children("pipeline failed");
            eprintln!("packset failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
