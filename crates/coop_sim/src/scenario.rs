use anyhow::Context;
use coop_core::{GridWorld, ScenarioConfig, Spread, TaskPlacement};

use crate::config::Config;

/// Loads the map and turns command-line flags into a core scenario.
pub fn build(config: &Config) -> anyhow::Result<(GridWorld, ScenarioConfig)> {
    let grid = match &config.map {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read map file {}", path.display()))?;
            GridWorld::from_ascii(&text).with_context(|| format!("invalid map in {}", path.display()))?
        }
        None => GridWorld::open(config.rows, config.cols).context("invalid grid dimensions")?,
    };

    let tasks = match config.random_tasks {
        Some(count) => TaskPlacement::Random {
            count,
            seed: config.seed,
        },
        None => TaskPlacement::Fixed(config.tasks.clone()),
    };

    let scenario = ScenarioConfig {
        agents: config.agents.clone(),
        tasks,
        drop_off: config.drop_off,
        mode: config.mode,
        hold_horizon: config.hold_horizon,
        max_horizon: config.max_horizon,
        stall_threshold: config.stall_threshold,
        repartition_every: config.repartition_every,
        tie_break: config.tie_break,
        territory_scope: config.territory_scope,
        max_ticks: config.max_ticks,
        spread: config.spread_every.map(|every| Spread {
            every,
            limit: config.spread_limit,
        }),
    };
    tracing::info!(
        rows = grid.rows(),
        cols = grid.cols(),
        free = grid.free_count(),
        agents = scenario.agents.len(),
        "scenario loaded"
    );
    Ok((grid, scenario))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use coop_core::Cell;

    #[test]
    fn open_grid_with_random_tasks() {
        let config = Config::try_parse_from([
            "coop_sim",
            "--rows",
            "4",
            "--cols",
            "6",
            "--agent",
            "1,1",
            "--random-tasks",
            "5",
            "--seed",
            "9",
        ])
        .unwrap();
        let (grid, scenario) = build(&config).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (4, 6));
        assert_eq!(scenario.tasks, TaskPlacement::Random { count: 5, seed: 9 });
        assert_eq!(scenario.agents[0].start, Cell::new(1, 1));
    }

    #[test]
    fn spread_flags_become_a_spread_rule() {
        let config = Config::try_parse_from([
            "coop_sim",
            "--agent",
            "1,1",
            "--task",
            "2,2",
            "--mode",
            "reactive",
            "--spread-every",
            "5",
        ])
        .unwrap();
        let (grid, scenario) = build(&config).unwrap();
        assert_eq!(scenario.spread, Some(Spread { every: 5, limit: 16 }));
        assert!(scenario.validate(&grid).is_ok());

        let planned =
            Config::try_parse_from(["coop_sim", "--agent", "1,1", "--task", "2,2", "--spread-every", "5"]).unwrap();
        let (grid, scenario) = build(&planned).unwrap();
        assert!(scenario.validate(&grid).is_err());
    }

    #[test]
    fn missing_map_file_is_reported() {
        let config = Config::try_parse_from([
            "coop_sim",
            "--map",
            "/nonexistent/coop_sim/map.txt",
            "--agent",
            "1,1",
        ])
        .unwrap();
        let err = build(&config).unwrap_err();
        assert!(err.to_string().contains("failed to read map file"));
    }
}
