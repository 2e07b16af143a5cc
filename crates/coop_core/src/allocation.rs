//! Greedy finish-time task allocation.
//!
//! Every round, each (agent, task) pair is priced at the agent's virtual time
//! plus the trip to the task plus, with a drop-off, the trip back. The single
//! cheapest pair wins, the agent's virtual position and clock advance, and the
//! task leaves the pool. This is a myopic auction, not an optimal matching.

use serde::Serialize;

use crate::agent::AgentId;
use crate::error::{PlanError, Result};
use crate::grid::{Cell, GridWorld};
use crate::search::{distance_field, shortest_path, DistanceField, PriorityRule};
use crate::tasks::TaskId;
use crate::territory::Territories;

/// An agent entering allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bidder {
    pub start: Cell,
    pub rule: PriorityRule,
}

/// Tasks and route for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentPlan {
    pub agent: AgentId,
    /// Indices into the allocator's task list, in visiting order.
    pub tasks: Vec<TaskId>,
    /// Cells to visit in order: each task, followed by the drop-off if any.
    pub waypoints: Vec<Cell>,
    /// Concatenated single-agent path, start to last waypoint inclusive.
    pub path: Vec<Cell>,
    /// Moves along `path`.
    pub distance: u32,
    /// Virtual completion time of the last task (shortest-path costs).
    pub finish_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentPlan {
    pub agents: Vec<AgentPlan>,
    /// Per-task best single trip from any start, summed. See [`ideal_lower_bound`].
    pub ideal: u32,
    /// Bound that accounts for tour sharing; never above `total`.
    pub lower_bound: u32,
    pub total: u32,
    pub efficiency: f64,
    pub makespan: u32,
}

/// `ideal / actual × 100`, capped at 100. Both zero counts as perfect.
pub fn efficiency(ideal: u32, actual: u32) -> f64 {
    if actual == 0 {
        return if ideal == 0 { 100.0 } else { 0.0 };
    }
    (f64::from(ideal) / f64::from(actual) * 100.0).min(100.0)
}

#[derive(Debug, Clone, Default)]
pub struct TaskAllocator<'a> {
    drop_off: Option<Cell>,
    scope: Option<&'a Territories>,
}

impl<'a> TaskAllocator<'a> {
    pub fn new(drop_off: Option<Cell>) -> Self {
        Self {
            drop_off,
            scope: None,
        }
    }

    /// Restricts each agent to tasks inside its own territory.
    pub fn scoped(mut self, territories: &'a Territories) -> Self {
        self.scope = Some(territories);
        self
    }

    pub fn allocate(&self, grid: &GridWorld, bidders: &[Bidder], tasks: &[Cell]) -> Result<AssignmentPlan> {
        if bidders.is_empty() {
            return Err(PlanError::invalid("allocation needs at least one agent"));
        }
        let task_fields: Vec<DistanceField> = tasks.iter().map(|&t| distance_field(grid, t)).collect();
        let drop_field = self.drop_off.map(|d| distance_field(grid, d));
        let return_trip = |k: usize| match &drop_field {
            Some(field) => field.get(tasks[k]),
            None => Some(0),
        };

        let mut pos: Vec<Cell> = bidders.iter().map(|b| b.start).collect();
        let mut clock = vec![0u32; bidders.len()];
        let mut sequences: Vec<Vec<TaskId>> = vec![Vec::new(); bidders.len()];
        let mut pool: Vec<TaskId> = (0..tasks.len()).collect();

        while !pool.is_empty() {
            // (finish, agent, position in pool); tuple order is the tie-break.
            let mut best: Option<(u32, AgentId, usize)> = None;
            for agent in 0..bidders.len() {
                for (slot, &k) in pool.iter().enumerate() {
                    if let Some(scope) = self.scope {
                        if !scope.contains(grid, agent, tasks[k]) {
                            continue;
                        }
                    }
                    let (Some(to), Some(back)) = (task_fields[k].get(pos[agent]), return_trip(k)) else {
                        continue;
                    };
                    let bid = (clock[agent] + to + back, agent, slot);
                    if best.map_or(true, |b| bid < b) {
                        best = Some(bid);
                    }
                }
            }

            let Some((finish, agent, slot)) = best else {
                let stranded = tasks[pool[0]];
                tracing::debug!(task = %stranded, "no agent can reach task");
                return Err(PlanError::no_path(bidders[0].start, stranded));
            };
            let k = pool.remove(slot);
            tracing::trace!(agent, task = k, finish, "assigned task");
            clock[agent] = finish;
            pos[agent] = self.drop_off.unwrap_or(tasks[k]);
            sequences[agent].push(k);
        }

        let mut agents = Vec::with_capacity(bidders.len());
        for (agent, (bidder, seq)) in bidders.iter().zip(sequences).enumerate() {
            let waypoints: Vec<Cell> = seq
                .iter()
                .flat_map(|&k| std::iter::once(tasks[k]).chain(self.drop_off))
                .collect();
            let path = materialize(grid, bidder.start, &waypoints, bidder.rule)?;
            agents.push(AgentPlan {
                agent,
                tasks: seq,
                distance: path.len() as u32 - 1,
                waypoints,
                path,
                finish_time: clock[agent],
            });
        }

        let starts: Vec<Cell> = bidders.iter().map(|b| b.start).collect();
        let ideal = ideal_lower_bound(grid, &starts, tasks, self.drop_off);
        let lower_bound = team_lower_bound(grid, &starts, tasks, self.drop_off);
        let total = agents.iter().map(|a| a.distance).sum();
        let makespan = agents.iter().map(|a| a.finish_time).max().unwrap_or(0);
        tracing::debug!(tasks = tasks.len(), ideal, lower_bound, total, makespan, "allocation complete");

        Ok(AssignmentPlan {
            agents,
            ideal,
            lower_bound,
            total,
            efficiency: efficiency(ideal, total),
            makespan,
        })
    }
}

fn materialize(grid: &GridWorld, start: Cell, waypoints: &[Cell], rule: PriorityRule) -> Result<Vec<Cell>> {
    let mut path = vec![start];
    let mut at = start;
    for &goal in waypoints {
        let route = shortest_path(grid, at, goal, rule)?;
        path.extend_from_slice(&route.cells[1..]);
        at = goal;
    }
    Ok(path)
}

/// The "ideal" team distance: for every task, the cheapest single trip from
/// any agent's original start to the task (and on to the drop-off, if any),
/// summed over tasks.
///
/// Each term is optimal for its task in isolation. Tours that serve several
/// tasks back to back can beat it, so efficiency against this figure is
/// capped at 100 rather than read as proof of optimality. It is met exactly
/// by a lone agent whose start is the drop-off. Tasks no start can reach are
/// left out.
pub fn ideal_lower_bound(grid: &GridWorld, starts: &[Cell], tasks: &[Cell], drop_off: Option<Cell>) -> u32 {
    let drop_field = drop_off.map(|d| distance_field(grid, d));
    tasks
        .iter()
        .filter_map(|&task| {
            let field = distance_field(grid, task);
            let back = match &drop_field {
                Some(f) => f.get(task)?,
                None => 0,
            };
            let from_start = starts.iter().filter_map(|&s| field.get(s)).min()?;
            Some(from_start + back)
        })
        .sum()
}

/// Lower bound on the team's total travel to serve every task.
///
/// Each task is reached from some predecessor: an agent's start, or (with a
/// drop-off) the drop-off, or (without one) another task cell. The bound sums
/// each task's cheapest predecessor, then charges the smallest surcharge for
/// the fact that at least one task must be reached from a start. With a
/// drop-off every task also pays the trip back. Tasks no start can reach are
/// left out.
pub fn team_lower_bound(grid: &GridWorld, starts: &[Cell], tasks: &[Cell], drop_off: Option<Cell>) -> u32 {
    let drop_field = drop_off.map(|d| distance_field(grid, d));
    let mut sum = 0u32;
    let mut surcharge: Option<u32> = None;

    for (k, &task) in tasks.iter().enumerate() {
        let field = distance_field(grid, task);
        let back = match &drop_field {
            Some(f) => match f.get(task) {
                Some(d) => d,
                None => continue,
            },
            None => 0,
        };
        let Some(from_start) = starts.iter().filter_map(|&s| field.get(s)).min() else {
            continue;
        };
        let from_other = match &drop_field {
            Some(f) => f.get(task),
            None => tasks
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .filter_map(|(_, &t)| field.get(t))
                .min(),
        };
        let cheapest = from_other.map_or(from_start, |d| d.min(from_start));
        sum += cheapest + back;
        let extra = from_start - cheapest;
        surcharge = Some(surcharge.map_or(extra, |s| s.min(extra)));
    }
    sum + surcharge.unwrap_or(0)
}
