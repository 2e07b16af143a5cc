mod config;
mod metrics;
mod scenario;

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use coop_core::{Simulation, SimulationReport, TickSnapshot};
use serde::Serialize;
use tokio::time::{Interval, MissedTickBehavior};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::metrics::SimMetrics;

#[derive(Serialize)]
struct SnapshotLine<'a> {
    run_id: &'a str,
    timestamp_ms: i64,
    #[serde(flatten)]
    snapshot: &'a TickSnapshot,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    run_id: &'a str,
    finished_at: String,
    interrupted: bool,
    #[serde(flatten)]
    report: &'a SimulationReport,
}

async fn pace(interval: &mut Interval, paced: bool) {
    if paced {
        interval.tick().await;
    } else {
        tokio::task::yield_now().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Initialization ---
    // Logs go to stderr so stdout stays a clean JSON stream.
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();
    let config = Config::parse();
    tracing::info!(config = ?config, "coop_sim starting with configuration");

    let run_id = uuid::Uuid::new_v4().to_string();
    let (grid, scenario) = scenario::build(&config)?;
    let metrics = SimMetrics::new(&run_id).context("failed to create metrics registry")?;
    let mut sim = Simulation::new(grid, scenario).context("scenario rejected")?;
    if let Some(plan) = sim.assignment() {
        tracing::info!(
            run_id = %run_id,
            ideal = plan.ideal,
            lower_bound = plan.lower_bound,
            total = plan.total,
            makespan = plan.makespan,
            "tasks allocated"
        );
    }

    // --- 2. Tick Loop ---
    let paced = config.tick_ms > 0;
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interrupted = false;

    tracing::info!(run_id = %run_id, "Starting tick loop...");
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received.");
                interrupted = true;
                break;
            },
            _ = pace(&mut interval, paced) => {}
        }

        let Some(snapshot) = sim.step() else {
            break;
        };
        metrics.observe_tick(&snapshot);
        for done in &snapshot.completed {
            tracing::debug!(tick = snapshot.tick, agent = done.agent, task = done.task, cell = %done.cell, "task completed");
        }
        for cell in &snapshot.arrived {
            tracing::debug!(tick = snapshot.tick, cell = %cell, "task arrived");
        }
        if config.snapshots {
            let line = SnapshotLine {
                run_id: &run_id,
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                snapshot: &snapshot,
            };
            let mut out = std::io::stdout().lock();
            serde_json::to_writer(&mut out, &line)?;
            writeln!(out)?;
        }
    }

    // --- 3. Report ---
    let report = sim.report();
    metrics.observe_report(&report);
    tracing::info!(
        run_id = %run_id,
        outcome = ?report.outcome,
        ticks = report.ticks,
        completed = report.tasks_completed,
        total = report.tasks_total,
        efficiency = report.efficiency,
        makespan = report.makespan,
        "run finished"
    );

    let document = ReportDocument {
        run_id: &run_id,
        finished_at: chrono::Utc::now().to_rfc3339(),
        interrupted,
        report: &report,
    };
    let json = serde_json::to_string_pretty(&document)?;
    match &config.report_out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => println!("{json}"),
    }
    if let Some(path) = &config.metrics_out {
        std::fs::write(path, metrics.encode()?)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }

    tracing::info!("coop_sim shutting down.");
    Ok(())
}
