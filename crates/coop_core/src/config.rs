//! Scenario description and its validation.
//!
//! Everything here is checked before the first tick so a simulation never
//! starts from an impossible setup.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::grid::{Cell, GridWorld};
use crate::search::PriorityRule;
use crate::territory::TieBreak;

/// How agents pick their next task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Allocate the whole task set up front and replay collision-free paths.
    #[default]
    Planned,
    /// Re-target tick by tick to the nearest open task.
    Reactive,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "planned" | "allocate" => Ok(Self::Planned),
            "reactive" | "nearest" => Ok(Self::Reactive),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub start: Cell,
    #[serde(default)]
    pub rule: PriorityRule,
    /// Lower ranks plan first in planned mode.
    #[serde(default)]
    pub priority: Option<u32>,
}

impl AgentSpec {
    pub fn new(start: Cell) -> Self {
        Self {
            start,
            rule: PriorityRule::AStar,
            priority: None,
        }
    }

    pub fn with_rule(mut self, rule: PriorityRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPlacement {
    Fixed(Vec<Cell>),
    /// `count` distinct free cells, avoiding agent starts and the drop-off.
    Random { count: usize, seed: u64 },
}

/// Upper bound on `hold_horizon`. Holds are reserved tick by tick.
pub const MAX_HOLD_HORIZON: u32 = 10_000;

/// Tasks that appear while a reactive run is in progress.
///
/// Every `every` ticks one new task appears next to an open one, until
/// `limit` tasks have arrived this way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spread {
    pub every: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub agents: Vec<AgentSpec>,
    pub tasks: TaskPlacement,
    pub drop_off: Option<Cell>,
    pub mode: Mode,
    /// Ticks a parked agent keeps its final cell reserved.
    pub hold_horizon: u32,
    /// Longest single space-time search leg, in ticks.
    pub max_horizon: u32,
    /// Ticks without a completion before reactive agents may chase claimed tasks.
    pub stall_threshold: u32,
    pub repartition_every: u32,
    pub tie_break: TieBreak,
    /// Restrict planned-mode bids to each agent's initial territory.
    pub territory_scope: bool,
    pub max_ticks: u32,
    /// Reactive mode only.
    pub spread: Option<Spread>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            tasks: TaskPlacement::Fixed(Vec::new()),
            drop_off: None,
            mode: Mode::Planned,
            hold_horizon: 20,
            max_horizon: 200,
            stall_threshold: 30,
            repartition_every: 25,
            tie_break: TieBreak::LowestIndex,
            territory_scope: false,
            max_ticks: 2000,
            spread: None,
        }
    }
}

impl ScenarioConfig {
    pub fn starts(&self) -> Vec<Cell> {
        self.agents.iter().map(|a| a.start).collect()
    }

    /// Checks the scenario against `grid` and returns the resolved task cells.
    pub fn validate(&self, grid: &GridWorld) -> Result<Vec<Cell>> {
        if self.agents.is_empty() {
            return Err(PlanError::invalid("at least one agent is required"));
        }
        if self.max_horizon == 0 {
            return Err(PlanError::invalid("max_horizon must be positive"));
        }
        if self.hold_horizon > MAX_HOLD_HORIZON {
            return Err(PlanError::invalid(format!(
                "hold_horizon {} exceeds the limit of {MAX_HOLD_HORIZON}",
                self.hold_horizon
            )));
        }
        if let Some(spread) = self.spread {
            if self.mode != Mode::Reactive {
                return Err(PlanError::invalid("spreading tasks needs reactive mode"));
            }
            if spread.every == 0 {
                return Err(PlanError::invalid("spread interval must be positive"));
            }
        }

        let mut starts = HashSet::with_capacity(self.agents.len());
        for (i, agent) in self.agents.iter().enumerate() {
            if !grid.is_walkable(agent.start) {
                return Err(PlanError::invalid(format!(
                    "agent {i} starts on {} which is not walkable",
                    agent.start
                )));
            }
            if !starts.insert(agent.start) {
                return Err(PlanError::invalid(format!(
                    "agent {i} shares its start {} with another agent",
                    agent.start
                )));
            }
        }
        if let Some(drop) = self.drop_off {
            if !grid.is_walkable(drop) {
                return Err(PlanError::invalid(format!("drop-off {drop} is not walkable")));
            }
        }

        match &self.tasks {
            TaskPlacement::Fixed(cells) => {
                let mut seen = HashSet::with_capacity(cells.len());
                for &cell in cells {
                    if !grid.is_walkable(cell) {
                        return Err(PlanError::invalid(format!("task {cell} is not walkable")));
                    }
                    if !seen.insert(cell) {
                        return Err(PlanError::invalid(format!("task {cell} is listed twice")));
                    }
                }
                Ok(cells.clone())
            }
            TaskPlacement::Random { count, seed } => {
                let mut pool: Vec<Cell> = grid
                    .free_cells()
                    .filter(|c| !starts.contains(c) && Some(*c) != self.drop_off)
                    .collect();
                if *count > pool.len() {
                    return Err(PlanError::invalid(format!(
                        "{count} tasks requested but only {} free cells are available",
                        pool.len()
                    )));
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                let (picked, _) = pool.partial_shuffle(&mut rng, *count);
                Ok(picked.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(r: i32, col: i32) -> Cell {
        Cell::new(r, col)
    }

    fn two_agents() -> ScenarioConfig {
        ScenarioConfig {
            agents: vec![AgentSpec::new(c(1, 1)), AgentSpec::new(c(3, 3))],
            ..Default::default()
        }
    }

    #[test]
    fn random_placement_is_reproducible_and_avoids_starts() {
        let grid = GridWorld::open(3, 3).unwrap();
        let config = ScenarioConfig {
            tasks: TaskPlacement::Random { count: 5, seed: 7 },
            drop_off: Some(c(2, 2)),
            ..two_agents()
        };
        let a = config.validate(&grid).unwrap();
        let b = config.validate(&grid).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(!a.contains(&c(1, 1)) && !a.contains(&c(3, 3)) && !a.contains(&c(2, 2)));
        let distinct: HashSet<_> = a.iter().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn too_many_tasks_is_invalid() {
        let grid = GridWorld::open(3, 3).unwrap();
        let config = ScenarioConfig {
            tasks: TaskPlacement::Random { count: 8, seed: 1 },
            ..two_agents()
        };
        assert!(matches!(config.validate(&grid), Err(PlanError::InvalidConfiguration(_))));
    }

    #[test]
    fn bad_agents_are_invalid() {
        let grid = GridWorld::from_ascii("#..\n...").unwrap();
        let none = ScenarioConfig::default();
        assert!(none.validate(&grid).is_err());

        let on_wall = ScenarioConfig {
            agents: vec![AgentSpec::new(c(1, 1))],
            ..Default::default()
        };
        assert!(on_wall.validate(&grid).is_err());

        let shared = ScenarioConfig {
            agents: vec![AgentSpec::new(c(1, 2)), AgentSpec::new(c(1, 2))],
            ..Default::default()
        };
        assert!(shared.validate(&grid).is_err());
    }

    #[test]
    fn fixed_tasks_must_be_walkable_and_distinct() {
        let grid = GridWorld::from_ascii("..#\n...").unwrap();
        let mut config = two_agents();
        config.agents[1].start = c(2, 3);
        config.tasks = TaskPlacement::Fixed(vec![c(1, 3)]);
        assert!(config.validate(&grid).is_err());
        config.tasks = TaskPlacement::Fixed(vec![c(2, 1), c(2, 1)]);
        assert!(config.validate(&grid).is_err());
        config.tasks = TaskPlacement::Fixed(vec![c(2, 1), c(1, 2)]);
        assert_eq!(config.validate(&grid).unwrap(), vec![c(2, 1), c(1, 2)]);
    }

    #[test]
    fn oversized_hold_is_invalid() {
        let grid = GridWorld::open(3, 3).unwrap();
        let mut config = two_agents();
        config.hold_horizon = u32::MAX;
        assert!(matches!(config.validate(&grid), Err(PlanError::InvalidConfiguration(_))));
        config.hold_horizon = MAX_HOLD_HORIZON;
        assert!(config.validate(&grid).is_ok());
    }

    #[test]
    fn spread_needs_reactive_mode() {
        let grid = GridWorld::open(3, 3).unwrap();
        let mut config = two_agents();
        config.spread = Some(Spread { every: 4, limit: 3 });
        assert!(config.validate(&grid).is_err());
        config.mode = Mode::Reactive;
        assert!(config.validate(&grid).is_ok());
        config.spread = Some(Spread { every: 0, limit: 3 });
        assert!(config.validate(&grid).is_err());
    }

    #[test]
    fn mode_parses() {
        assert_eq!("reactive".parse(), Ok(Mode::Reactive));
        assert_eq!("Planned".parse(), Ok(Mode::Planned));
        assert!("swarm".parse::<Mode>().is_err());
    }
}
