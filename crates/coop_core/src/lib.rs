//! Cooperative multi-agent planning on 4-connected grids.
//!
//! Layers, leaf first: [`grid`] holds the static map, [`search`] runs
//! best-first searches over it, [`reservation`] turns those into
//! collision-free space-time paths, [`allocation`] and [`territory`] decide
//! who does what, and [`simulation`] drives everything tick by tick.

pub mod agent;
pub mod allocation;
pub mod config;
pub mod error;
pub mod grid;
pub mod reservation;
pub mod search;
pub mod simulation;
pub mod tasks;
pub mod territory;

pub use agent::{Agent, AgentId, AgentPosition};
pub use allocation::{AgentPlan, AssignmentPlan, Bidder, TaskAllocator};
pub use config::{AgentSpec, Mode, ScenarioConfig, Spread, TaskPlacement, MAX_HOLD_HORIZON};
pub use error::{PlanError, Result};
pub use grid::{Cell, Direction, GridWorld};
pub use reservation::{
    find_conflicts, CommittedPath, Conflict, PlanRequest, ReservationPlanner, ReservationTable,
    SharedReservations, SpaceTimePath,
};
pub use search::{PriorityRule, Route, SearchStats};
pub use simulation::{Outcome, RunCounters, Simulation, SimulationReport, TickSnapshot};
pub use tasks::{TaskBoard, TaskId, TaskState};
pub use territory::{Territories, TerritoryPartitioner, TieBreak};
