use std::collections::HashMap;

use coop_core::{SimulationReport, TickSnapshot};
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

/// Prometheus collectors for one simulation run.
///
/// Nothing is served over HTTP; the registry is encoded once at exit.
pub struct SimMetrics {
    pub registry: Registry,
    pub ticks_total: IntCounter,
    pub tasks_completed_total: IntCounter,
    pub tasks_remaining: IntGauge,
    pub tasks_arrived_total: IntCounter,
    /// Target changes made by reactive agents.
    pub retargets_total: IntCounter,
    /// Re-targets that had to take over a task claimed by another agent.
    pub fallbacks_total: IntCounter,
    pub repartitions_total: IntCounter,
    /// States expanded across every search of the run.
    pub search_expansions_total: IntCounter,
    pub efficiency_percent: Gauge,
    pub makespan_ticks: IntGauge,
    pub coverage_ratio: Gauge,
}

impl SimMetrics {
    pub fn new(run_id: &str) -> prometheus::Result<Self> {
        let labels = HashMap::from([("run_id".to_string(), run_id.to_string())]);
        let registry = Registry::new_custom(Some("coop_sim".into()), Some(labels))?;

        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric?;
                registry.register(Box::new(collector.clone()))?;
                collector
            }};
        }

        Ok(Self {
            ticks_total: reg!(IntCounter::new("ticks_total", "Ticks simulated")),
            tasks_completed_total: reg!(IntCounter::new(
                "tasks_completed_total",
                "Tasks completed by any agent"
            )),
            tasks_remaining: reg!(IntGauge::new("tasks_remaining", "Tasks not yet completed")),
            tasks_arrived_total: reg!(IntCounter::new(
                "tasks_arrived_total",
                "Tasks that appeared after the run started"
            )),
            retargets_total: reg!(IntCounter::new(
                "retargets_total",
                "Times an agent picked a new target"
            )),
            fallbacks_total: reg!(IntCounter::new(
                "fallbacks_total",
                "Stall fallbacks onto tasks claimed by other agents"
            )),
            repartitions_total: reg!(IntCounter::new(
                "repartitions_total",
                "Territory partitions computed"
            )),
            search_expansions_total: reg!(IntCounter::new(
                "search_expansions_total",
                "States expanded by all searches"
            )),
            efficiency_percent: reg!(Gauge::new(
                "efficiency_percent",
                "Ideal lower bound over actual team distance, capped at 100"
            )),
            makespan_ticks: reg!(IntGauge::new(
                "makespan_ticks",
                "Tick at which the last agent finished its work"
            )),
            coverage_ratio: reg!(Gauge::new(
                "coverage_ratio",
                "Completed tasks over all tasks (0.0 to 1.0)"
            )),
            registry,
        })
    }

    pub fn observe_tick(&self, snapshot: &TickSnapshot) {
        self.ticks_total.inc();
        self.tasks_completed_total.inc_by(snapshot.completed.len() as u64);
        self.tasks_remaining.set(snapshot.remaining.len() as i64);
        self.tasks_arrived_total.inc_by(snapshot.arrived.len() as u64);
    }

    /// Records end-of-run totals. Call once.
    pub fn observe_report(&self, report: &SimulationReport) {
        let counters = report.counters;
        self.retargets_total.inc_by(counters.retargets);
        self.fallbacks_total.inc_by(counters.fallbacks);
        self.repartitions_total.inc_by(counters.repartitions);
        self.search_expansions_total.inc_by(counters.expanded);
        self.efficiency_percent.set(report.efficiency);
        self.makespan_ticks.set(i64::from(report.makespan));
        self.coverage_ratio.set(report.coverage);
    }

    /// Renders every collector in the Prometheus text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
