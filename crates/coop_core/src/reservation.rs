//! Space-time A* over `(time, cell)` states with vertex and edge reservations.
//!
//! Agents are planned one at a time in a fixed priority order. Each committed
//! path is written into the [`ReservationTable`] before the next agent plans,
//! so an earlier (higher priority) agent always has right-of-way over a later
//! one. No joint multi-agent search is attempted.
//!
//! Occupancy contract used by both the planner and [`find_conflicts`]: an
//! agent occupies `cells[t]` for every `t` of its path, then keeps its final
//! cell for `hold` more ticks, after which it no longer occupies the grid.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::agent::AgentId;
use crate::error::{PlanError, Result};
use crate::grid::{Cell, GridWorld};
use crate::search::{best_first, shortest_path, PriorityRule, SearchSpace, SearchStats};

/// Time-indexed vertex and directed-edge reservations.
///
/// Append-only: entries are never removed within a planning session.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    vertices: HashMap<u32, HashSet<Cell>>,
    /// `edges[t]` holds `(from, to)` for moves made between `t` and `t + 1`.
    edges: HashMap<u32, HashSet<(Cell, Cell)>>,
    /// Cells taken for good from the given time on.
    parked: HashMap<Cell, u32>,
    horizon: u32,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_vertex_reserved(&self, cell: Cell, t: u32) -> bool {
        self.parked.get(&cell).is_some_and(|&from| t >= from)
            || self.vertices.get(&t).is_some_and(|s| s.contains(&cell))
    }

    #[inline]
    pub fn is_edge_reserved(&self, t: u32, from: Cell, to: Cell) -> bool {
        self.edges.get(&t).is_some_and(|s| s.contains(&(from, to)))
    }

    /// True if `cell` carries no vertex reservation anywhere in `[from, to]`.
    pub fn is_free_during(&self, cell: Cell, from: u32, to: u32) -> bool {
        (from..=to).all(|t| !self.is_vertex_reserved(cell, t))
    }

    /// Last timestep carrying any reservation.
    #[inline]
    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.values().map(HashSet::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashSet::len).sum()
    }

    fn reserve_vertex(&mut self, cell: Cell, t: u32) {
        self.vertices.entry(t).or_default().insert(cell);
        self.horizon = self.horizon.max(t);
    }

    /// Reserves `cell` from `from` onwards with no end.
    pub fn park(&mut self, cell: Cell, from: u32) {
        let entry = self.parked.entry(cell).or_insert(from);
        *entry = (*entry).min(from);
    }

    /// Reserves a path whose first cell is occupied at `start_time`, plus the
    /// final cell for `hold` ticks after arrival.
    pub fn commit(&mut self, cells: &[Cell], start_time: u32, hold: u32) {
        let Some(&last) = cells.last() else {
            return;
        };
        for (i, &cell) in cells.iter().enumerate() {
            let t = start_time + i as u32;
            self.reserve_vertex(cell, t);
            if i > 0 {
                self.edges.entry(t - 1).or_default().insert((cells[i - 1], cell));
            }
        }
        let arrival = start_time + cells.len() as u32 - 1;
        for t in arrival.saturating_add(1)..=arrival.saturating_add(hold) {
            self.reserve_vertex(last, t);
        }
    }
}

/// A collision-free path produced against a reservation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpaceTimePath {
    /// `cells[i]` is occupied at `start_time + i`.
    pub cells: Vec<Cell>,
    pub start_time: u32,
    /// Arrival time at each requested waypoint, in order.
    pub arrivals: Vec<u32>,
    #[serde(skip)]
    pub stats: SearchStats,
}

impl SpaceTimePath {
    /// Cell occupied at absolute time `t`, while the path is active.
    pub fn at(&self, t: u32) -> Option<Cell> {
        t.checked_sub(self.start_time)
            .and_then(|i| self.cells.get(i as usize).copied())
    }

    #[inline]
    pub fn end_time(&self) -> u32 {
        self.start_time + self.cells.len().saturating_sub(1) as u32
    }

    /// Moves made, waits excluded.
    pub fn distance(&self) -> u32 {
        self.cells.windows(2).filter(|w| w[0] != w[1]).count() as u32
    }
}

struct TimeExpanded<'a> {
    grid: &'a GridWorld,
    table: &'a ReservationTable,
    goal: Cell,
    deadline: u32,
    /// Set on the final leg: the goal must stay free while the agent parks.
    park_for: Option<u32>,
}

impl SearchSpace for TimeExpanded<'_> {
    type State = (u32, Cell);

    fn successors(&self, (t, cell): (u32, Cell), out: &mut Vec<(u32, Cell)>) {
        if t >= self.deadline {
            return;
        }
        let next_t = t + 1;
        for next in self.grid.neighbors(cell).chain(std::iter::once(cell)) {
            if self.table.is_vertex_reserved(next, next_t) {
                continue;
            }
            // Someone moving next -> cell over the same step would swap with us.
            if next != cell && self.table.is_edge_reserved(t, next, cell) {
                continue;
            }
            out.push((next_t, next));
        }
    }

    fn heuristic(&self, (_, cell): (u32, Cell)) -> u32 {
        cell.manhattan(self.goal)
    }

    fn is_goal(&self, (t, cell): (u32, Cell)) -> bool {
        cell == self.goal
            && self
                .park_for
                .map_or(true, |hold| self.table.is_free_during(cell, t, t.saturating_add(hold)))
    }
}

/// Sequential space-time planner. `max_horizon` bounds each leg's duration;
/// `hold_horizon` is how long a parked agent keeps its final cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationPlanner {
    pub max_horizon: u32,
    pub hold_horizon: u32,
}

impl Default for ReservationPlanner {
    fn default() -> Self {
        Self {
            max_horizon: 200,
            hold_horizon: 20,
        }
    }
}

/// One agent's request for [`ReservationPlanner::plan_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub agent: AgentId,
    pub start: Cell,
    /// Visited in order; the last one is where the agent parks.
    pub waypoints: Vec<Cell>,
    /// Lower ranks plan first. `None` sorts after every explicit rank.
    pub priority: Option<u32>,
}

/// A path written into the reservation table on behalf of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedPath {
    pub agent: AgentId,
    #[serde(flatten)]
    pub path: SpaceTimePath,
}

impl ReservationPlanner {
    pub fn new(max_horizon: u32, hold_horizon: u32) -> Self {
        Self {
            max_horizon,
            hold_horizon,
        }
    }

    /// Plans through `waypoints` starting at `(start_time, start)` without
    /// touching the table.
    pub fn plan(
        &self,
        grid: &GridWorld,
        table: &ReservationTable,
        start: Cell,
        start_time: u32,
        waypoints: &[Cell],
    ) -> Result<SpaceTimePath> {
        let mut cells = vec![start];
        let mut arrivals = Vec::with_capacity(waypoints.len());
        let mut stats = SearchStats::default();
        let (mut t, mut at) = (start_time, start);

        for (leg, &goal) in waypoints.iter().enumerate() {
            // Static reachability separates "impossible" from "not within the horizon".
            shortest_path(grid, at, goal, PriorityRule::AStar)?;

            let space = TimeExpanded {
                grid,
                table,
                goal,
                deadline: t.saturating_add(self.max_horizon),
                park_for: (leg + 1 == waypoints.len()).then_some(self.hold_horizon),
            };
            let found = best_first(&space, (t, at), PriorityRule::AStar).map_err(|exhausted| {
                tracing::debug!(
                    from = %at,
                    to = %goal,
                    start_time = t,
                    expanded = exhausted.expanded,
                    "space-time search hit its horizon"
                );
                PlanError::HorizonExceeded {
                    from: at,
                    horizon: self.max_horizon,
                }
            })?;
            stats += found.stats;
            cells.extend(found.path.iter().skip(1).map(|&(_, c)| c));
            (t, at) = found.path[found.path.len() - 1];
            arrivals.push(t);
        }

        Ok(SpaceTimePath {
            cells,
            start_time,
            arrivals,
            stats,
        })
    }

    /// Plans and commits every request in priority order. Paths come back in
    /// request order. The first failure aborts the session.
    pub fn plan_all(
        &self,
        grid: &GridWorld,
        table: &mut ReservationTable,
        requests: &[PlanRequest],
    ) -> Result<Vec<CommittedPath>> {
        let mut order: Vec<usize> = (0..requests.len()).collect();
        // Stable sort keeps request order among equal ranks.
        order.sort_by_key(|&i| (requests[i].priority.is_none(), requests[i].priority));

        // Agents with nothing to do stay put for the whole session.
        for req in requests.iter().filter(|r| r.waypoints.is_empty()) {
            table.park(req.start, 0);
        }

        let mut planned: Vec<Option<CommittedPath>> = vec![None; requests.len()];
        for i in order {
            let req = &requests[i];
            if req.waypoints.is_empty() {
                planned[i] = Some(CommittedPath {
                    agent: req.agent,
                    path: SpaceTimePath {
                        cells: vec![req.start],
                        start_time: 0,
                        arrivals: Vec::new(),
                        stats: SearchStats::default(),
                    },
                });
                continue;
            }
            let path = self.plan(grid, table, req.start, 0, &req.waypoints)?;
            table.commit(&path.cells, path.start_time, self.hold_horizon);
            tracing::debug!(
                agent = req.agent,
                steps = path.cells.len() - 1,
                expanded = path.stats.expanded,
                "committed space-time path"
            );
            planned[i] = Some(CommittedPath {
                agent: req.agent,
                path,
            });
        }
        Ok(planned.into_iter().flatten().collect())
    }
}

/// A reservation table shared between planners on different threads.
///
/// `plan_and_commit` holds the lock across search and commit, so planners
/// serialize and every plan sees all previously committed paths.
#[derive(Debug, Clone, Default)]
pub struct SharedReservations {
    inner: Arc<Mutex<ReservationTable>>,
}

impl SharedReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_and_commit(
        &self,
        planner: &ReservationPlanner,
        grid: &GridWorld,
        start: Cell,
        waypoints: &[Cell],
    ) -> Result<SpaceTimePath> {
        let mut table = self.inner.lock();
        let path = planner.plan(grid, &table, start, 0, waypoints)?;
        table.commit(&path.cells, path.start_time, planner.hold_horizon);
        Ok(path)
    }

    pub fn snapshot(&self) -> ReservationTable {
        self.inner.lock().clone()
    }
}

/// A collision between two committed paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    Vertex {
        t: u32,
        cell: Cell,
        a: AgentId,
        b: AgentId,
    },
    /// `a` and `b` traded places between `t` and `t + 1`.
    Swap {
        t: u32,
        a: AgentId,
        b: AgentId,
    },
}

fn occupancy(path: &SpaceTimePath, t: u32, hold: u32) -> Option<Cell> {
    if t < path.start_time {
        return None;
    }
    path.at(t)
        .or_else(|| (t <= path.end_time().saturating_add(hold)).then(|| path.cells[path.cells.len() - 1]))
}

/// Checks every pair of paths for vertex and edge-swap conflicts at every
/// timestep, using the occupancy contract of this module.
pub fn find_conflicts(paths: &[CommittedPath], hold: u32) -> Vec<Conflict> {
    let last = paths
        .iter()
        .map(|p| p.path.end_time().saturating_add(hold))
        .max()
        .unwrap_or(0);
    let mut conflicts = Vec::new();
    for t in 0..=last {
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                let (Some(a_now), Some(b_now)) = (
                    occupancy(&a.path, t, hold),
                    occupancy(&b.path, t, hold),
                ) else {
                    continue;
                };
                if a_now == b_now {
                    conflicts.push(Conflict::Vertex {
                        t,
                        cell: a_now,
                        a: a.agent,
                        b: b.agent,
                    });
                    continue;
                }
                if let (Some(a_next), Some(b_next)) = (
                    occupancy(&a.path, t + 1, hold),
                    occupancy(&b.path, t + 1, hold),
                ) {
                    if a_next == b_now && b_next == a_now {
                        conflicts.push(Conflict::Swap {
                            t,
                            a: a.agent,
                            b: b.agent,
                        });
                    }
                }
            }
        }
    }
    conflicts
}
