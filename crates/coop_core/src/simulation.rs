//! Tick-driven coordination loop.
//!
//! Two ways of running a scenario:
//!
//! * **Planned**: the whole task set is allocated once, each agent's waypoint
//!   list becomes a collision-free space-time path, and ticks replay those
//!   paths.
//! * **Reactive**: every tick, agents without a target search for the nearest
//!   open task (own territory first, then anywhere, then, once the team has
//!   stalled, tasks claimed by others) and take one step toward it. No
//!   space-time reservations are made in this mode. Tasks may keep arriving
//!   while the run is in progress.
//!
//! In both modes an agent completes whatever open task lies on the cell it
//! steps onto, no matter who claimed it.

use std::collections::VecDeque;

use serde::Serialize;

use crate::agent::{Agent, AgentId, AgentPosition};
use crate::allocation::{efficiency, ideal_lower_bound, team_lower_bound, AssignmentPlan, Bidder, TaskAllocator};
use crate::config::{Mode, ScenarioConfig, Spread};
use crate::error::{PlanError, Result};
use crate::grid::{Cell, GridWorld};
use crate::reservation::{CommittedPath, PlanRequest, ReservationPlanner, ReservationTable};
use crate::search::{nearest_matching, shortest_path, SearchStats};
use crate::tasks::{TaskBoard, TaskId, TaskState};
use crate::territory::{Territories, TerritoryPartitioner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub task: TaskId,
    pub cell: Cell,
    pub agent: AgentId,
}

/// State after one tick, for renderers and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSnapshot {
    pub tick: u32,
    pub positions: Vec<AgentPosition>,
    /// Cells of tasks not yet completed.
    pub remaining: Vec<Cell>,
    pub completed: Vec<Completion>,
    /// Tasks that appeared this tick.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arrived: Vec<Cell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// The tick budget ran out, or no open task was reachable.
    Partial,
}

/// Work counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub retargets: u64,
    pub fallbacks: u64,
    pub repartitions: u64,
    pub expanded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentReport {
    pub agent: AgentId,
    pub distance: u32,
    pub completed: u32,
    pub last_completion: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub outcome: Outcome,
    pub ticks: u32,
    pub agents: Vec<AgentReport>,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub ideal: u32,
    pub lower_bound: u32,
    pub total_distance: u32,
    pub efficiency: f64,
    pub makespan: u32,
    pub coverage: f64,
    pub counters: RunCounters,
}

struct PlannedRun {
    plan: AssignmentPlan,
    paths: Vec<CommittedPath>,
    /// Per agent: `(arrival tick, task)` still to complete, in visiting order.
    pending: Vec<VecDeque<(u32, TaskId)>>,
    end: u32,
}

struct ReactiveRun {
    partitioner: TerritoryPartitioner,
    territories: Territories,
    stall: u32,
    stuck: bool,
}

enum Engine {
    Planned(PlannedRun),
    Reactive(ReactiveRun),
}

pub struct Simulation {
    grid: GridWorld,
    config: ScenarioConfig,
    agents: Vec<Agent>,
    board: TaskBoard,
    tick: u32,
    ideal: u32,
    lower_bound: u32,
    spread_count: u32,
    counters: RunCounters,
    engine: Engine,
}

impl Simulation {
    /// Validates the scenario and, in planned mode, allocates and plans
    /// everything up front. Fails before the first tick.
    pub fn new(grid: GridWorld, config: ScenarioConfig) -> Result<Self> {
        let tasks = config.validate(&grid)?;
        let mut board = TaskBoard::new(&tasks)?;
        let agents: Vec<Agent> = config
            .agents
            .iter()
            .enumerate()
            .map(|(id, spec)| Agent::new(id, spec.start, spec.rule, spec.priority))
            .collect();
        let starts = config.starts();
        let partitioner = TerritoryPartitioner::new(config.repartition_every, config.tie_break);
        let mut counters = RunCounters::default();

        let (engine, ideal, lower_bound) = match config.mode {
            Mode::Planned => {
                let run = plan_up_front(&grid, &config, &tasks, &partitioner, &mut board, &mut counters)?;
                let (ideal, lower_bound) = (run.plan.ideal, run.plan.lower_bound);
                (Engine::Planned(run), ideal, lower_bound)
            }
            // Reactive agents never carry anything to the drop-off.
            Mode::Reactive => (
                Engine::Reactive(ReactiveRun {
                    partitioner,
                    territories: Territories::default(),
                    stall: 0,
                    stuck: false,
                }),
                ideal_lower_bound(&grid, &starts, &tasks, None),
                team_lower_bound(&grid, &starts, &tasks, None),
            ),
        };

        tracing::info!(
            mode = ?config.mode,
            agents = agents.len(),
            tasks = tasks.len(),
            ideal,
            "simulation ready"
        );
        Ok(Self {
            grid,
            config,
            agents,
            board,
            tick: 0,
            ideal,
            lower_bound,
            spread_count: 0,
            counters,
            engine,
        })
    }

    #[inline]
    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn grid(&self) -> &GridWorld {
        &self.grid
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// The up-front allocation, in planned mode.
    pub fn assignment(&self) -> Option<&AssignmentPlan> {
        match &self.engine {
            Engine::Planned(run) => Some(&run.plan),
            Engine::Reactive(_) => None,
        }
    }

    /// The committed space-time paths, in planned mode.
    pub fn committed_paths(&self) -> &[CommittedPath] {
        match &self.engine {
            Engine::Planned(run) => &run.paths,
            Engine::Reactive(_) => &[],
        }
    }

    /// Posts a new task into a reactive run. It joins the territory of the
    /// nearest agent at once and is repartitioned with the rest later.
    pub fn add_task(&mut self, cell: Cell) -> Result<TaskId> {
        let Engine::Reactive(run) = &mut self.engine else {
            return Err(PlanError::invalid("planned runs allocate every task up front"));
        };
        if !self.grid.is_walkable(cell) {
            return Err(PlanError::invalid(format!("task {cell} is not walkable")));
        }
        let id = self.board.add(cell)?;
        let positions: Vec<Cell> = self.agents.iter().map(|a| a.cell).collect();
        let owner = run.partitioner.assign(&self.grid, &mut run.territories, &positions, cell);

        let starts = self.config.starts();
        self.ideal += ideal_lower_bound(&self.grid, &starts, &[cell], None);
        let cells: Vec<Cell> = self.board.tasks().iter().map(|t| t.cell).collect();
        self.lower_bound = team_lower_bound(&self.grid, &starts, &cells, None);
        tracing::debug!(task = id, %cell, owner = ?owner, "task arrived");
        Ok(id)
    }

    /// Grows one task next to the earliest open task that has a free
    /// neighbour, on the configured interval.
    fn spread(&mut self, now: u32) -> Vec<Cell> {
        let Some(Spread { every, limit }) = self.config.spread else {
            return Vec::new();
        };
        if self.spread_count >= limit || every == 0 || now % every != 0 {
            return Vec::new();
        }
        let next = self.board.open().find_map(|task| {
            self.grid
                .neighbors(task.cell)
                .find(|&n| self.board.task_at(n).map_or(true, |k| self.board.is_completed(k)))
        });
        let Some(cell) = next else {
            return Vec::new();
        };
        match self.add_task(cell) {
            Ok(_) => {
                self.spread_count += 1;
                vec![cell]
            }
            Err(err) => {
                tracing::debug!(%cell, %err, "spread skipped");
                Vec::new()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        if self.tick >= self.config.max_ticks {
            return true;
        }
        match &self.engine {
            Engine::Planned(run) => self.board.all_done() && self.tick >= run.end,
            Engine::Reactive(run) => self.board.all_done() || run.stuck,
        }
    }

    /// Advances one tick. `None` once the run has terminated.
    pub fn step(&mut self) -> Option<TickSnapshot> {
        if self.is_finished() {
            return None;
        }
        let now = self.tick + 1;
        let arrived = self.spread(now);
        let completed = match self.engine {
            Engine::Planned(_) => self.step_planned(now),
            Engine::Reactive(_) => self.step_reactive(now),
        };
        self.tick = now;
        tracing::trace!(tick = now, completed = completed.len(), remaining = self.board.remaining(), "tick");
        Some(self.snapshot_with(completed, arrived))
    }

    /// Steps until termination and reports.
    pub fn run(&mut self) -> SimulationReport {
        while self.step().is_some() {}
        self.report()
    }

    /// Current state with no completions attached.
    pub fn snapshot(&self) -> TickSnapshot {
        self.snapshot_with(Vec::new(), Vec::new())
    }

    fn snapshot_with(&self, completed: Vec<Completion>, arrived: Vec<Cell>) -> TickSnapshot {
        TickSnapshot {
            tick: self.tick,
            positions: self
                .agents
                .iter()
                .map(|a| AgentPosition {
                    agent: a.id,
                    cell: a.cell,
                })
                .collect(),
            remaining: self.board.open().map(|t| t.cell).collect(),
            completed,
            arrived,
        }
    }

    fn step_planned(&mut self, now: u32) -> Vec<Completion> {
        let Engine::Planned(run) = &mut self.engine else {
            return Vec::new();
        };
        let mut completed = Vec::new();
        for (agent, committed) in self.agents.iter_mut().zip(&run.paths) {
            let path = &committed.path;
            let next = path.at(now).unwrap_or(path.cells[path.cells.len() - 1]);
            agent.move_to(next);

            let mut due = Vec::new();
            let queue = &mut run.pending[agent.id];
            while let Some(&(arrival, task)) = queue.front() {
                if arrival > now {
                    break;
                }
                queue.pop_front();
                due.push(task);
            }
            // Anything open underfoot is done too, whoever it was planned for.
            due.extend(self.board.task_at(agent.cell));

            for task in due {
                let claimant = self.board.claimant(task);
                if !self.board.complete(task, agent.id, now) {
                    continue;
                }
                if let Some(owner) = claimant.filter(|&owner| owner != agent.id) {
                    run.pending[owner].retain(|&(_, t)| t != task);
                    tracing::trace!(agent = agent.id, owner, task, "completed a task planned for another agent");
                }
                agent.record_completion(now);
                completed.push(Completion {
                    task,
                    cell: self.board.get(task).map_or(agent.cell, |t| t.cell),
                    agent: agent.id,
                });
            }
        }
        completed
    }

    fn step_reactive(&mut self, now: u32) -> Vec<Completion> {
        let Engine::Reactive(run) = &mut self.engine else {
            return Vec::new();
        };
        if run.partitioner.due(self.tick) {
            let positions: Vec<Cell> = self.agents.iter().map(|a| a.cell).collect();
            run.territories = run.partitioner.partition(
                &self.grid,
                &positions,
                self.board.unclaimed().map(|t| t.cell),
            );
            self.counters.repartitions += 1;
            tracing::debug!(tick = self.tick, sizes = ?run.territories.sizes(), "repartitioned");
        }

        let mut completed = Vec::new();
        for agent in self.agents.iter_mut() {
            if agent.target.is_some_and(|t| self.board.is_completed(t)) {
                agent.clear_target();
            }
            if agent.target.is_none() {
                retarget(
                    &self.grid,
                    &mut self.board,
                    agent,
                    &run.territories,
                    run.stall > self.config.stall_threshold,
                    &mut self.counters,
                );
            }
            agent.advance();

            if let Some(task) = self.board.task_at(agent.cell) {
                // A claimant elsewhere drops its target on its next turn.
                if self.board.complete(task, agent.id, now) {
                    agent.record_completion(now);
                    completed.push(Completion {
                        task,
                        cell: agent.cell,
                        agent: agent.id,
                    });
                }
            }
            if agent.route.is_empty() {
                agent.clear_target();
            }
        }

        run.stall = if completed.is_empty() { run.stall + 1 } else { 0 };
        // Claims only live on targets, so a team with no targets has nothing reachable left.
        run.stuck = !self.board.all_done() && self.agents.iter().all(|a| a.target.is_none()) && completed.is_empty();
        if run.stuck {
            tracing::info!(tick = now, remaining = self.board.remaining(), "no reachable tasks left");
        }
        completed
    }

    pub fn report(&self) -> SimulationReport {
        let total_distance = self.agents.iter().map(|a| a.distance).sum();
        let makespan = match &self.engine {
            Engine::Planned(run) => run.end.min(self.tick),
            Engine::Reactive(_) => self
                .agents
                .iter()
                .filter_map(|a| a.last_completion)
                .max()
                .unwrap_or(0),
        };
        let coverage = if self.board.is_empty() {
            1.0
        } else {
            self.board.completed_count() as f64 / self.board.len() as f64
        };
        SimulationReport {
            outcome: if self.board.all_done() {
                Outcome::Completed
            } else {
                Outcome::Partial
            },
            ticks: self.tick,
            agents: self
                .agents
                .iter()
                .map(|a| AgentReport {
                    agent: a.id,
                    distance: a.distance,
                    completed: a.completed,
                    last_completion: a.last_completion,
                })
                .collect(),
            tasks_total: self.board.len(),
            tasks_completed: self.board.completed_count(),
            ideal: self.ideal,
            lower_bound: self.lower_bound,
            total_distance,
            efficiency: efficiency(self.ideal, total_distance),
            makespan,
            coverage,
            counters: self.counters,
        }
    }
}

fn plan_up_front(
    grid: &GridWorld,
    config: &ScenarioConfig,
    tasks: &[Cell],
    partitioner: &TerritoryPartitioner,
    board: &mut TaskBoard,
    counters: &mut RunCounters,
) -> Result<PlannedRun> {
    let bidders: Vec<Bidder> = config
        .agents
        .iter()
        .map(|a| Bidder {
            start: a.start,
            rule: a.rule,
        })
        .collect();
    let territories = config
        .territory_scope
        .then(|| partitioner.partition(grid, &config.starts(), tasks.iter().copied()));
    let mut allocator = TaskAllocator::new(config.drop_off);
    if let Some(territories) = &territories {
        allocator = allocator.scoped(territories);
    }
    let plan = allocator.allocate(grid, &bidders, tasks)?;

    let requests: Vec<PlanRequest> = plan
        .agents
        .iter()
        .zip(&config.agents)
        .map(|(assigned, spec)| PlanRequest {
            agent: assigned.agent,
            start: spec.start,
            waypoints: assigned.waypoints.clone(),
            priority: spec.priority,
        })
        .collect();
    let planner = ReservationPlanner::new(config.max_horizon, config.hold_horizon);
    let paths = planner.plan_all(grid, &mut ReservationTable::new(), &requests)?;

    let stride = if config.drop_off.is_some() { 2 } else { 1 };
    let mut pending = Vec::with_capacity(paths.len());
    for (assigned, committed) in plan.agents.iter().zip(&paths) {
        let mut queue = VecDeque::with_capacity(assigned.tasks.len());
        for (j, &task) in assigned.tasks.iter().enumerate() {
            board.claim(task, assigned.agent);
            queue.push_back((committed.path.arrivals[j * stride], task));
        }
        pending.push(queue);
    }
    let stats = paths.iter().fold(SearchStats::default(), |mut acc, p| {
        acc += p.path.stats;
        acc
    });
    counters.expanded += stats.expanded as u64;
    let end = paths.iter().map(|p| p.path.end_time()).max().unwrap_or(0);
    tracing::debug!(end, expanded = stats.expanded, "space-time plans committed");

    Ok(PlannedRun {
        plan,
        paths,
        pending,
        end,
    })
}

/// Picks the nearest open task for `agent` and routes to it with the agent's rule.
fn retarget(
    grid: &GridWorld,
    board: &mut TaskBoard,
    agent: &mut Agent,
    territories: &Territories,
    relaxed: bool,
    counters: &mut RunCounters,
) {
    let me = agent.id;
    let available = |cell: Cell, scoped: bool| {
        board.task_at(cell).is_some_and(|k| match board.get(k).map(|t| t.state) {
            Some(TaskState::Unclaimed) => !scoped || territories.contains(grid, me, cell),
            Some(TaskState::Claimed(owner)) => owner == me && (!scoped || territories.contains(grid, me, cell)),
            _ => false,
        })
    };

    let found = nearest_matching(grid, agent.cell, |c| available(c, true))
        .or_else(|_| nearest_matching(grid, agent.cell, |c| available(c, false)))
        .ok()
        .map(|route| (route, false))
        .or_else(|| {
            if !relaxed {
                return None;
            }
            nearest_matching(grid, agent.cell, |c| {
                board.task_at(c).is_some_and(|k| !board.is_completed(k))
            })
            .ok()
            .map(|route| (route, true))
        });

    let Some((nearest, fallback)) = found else {
        return;
    };
    let goal = nearest.goal();
    let Some(task) = board.task_at(goal) else {
        return;
    };
    counters.expanded += nearest.stats.expanded as u64;

    let route = match shortest_path(grid, agent.cell, goal, agent.rule) {
        Ok(route) => route,
        Err(err) => {
            tracing::debug!(agent = me, %goal, %err, "could not route to nearest task");
            return;
        }
    };
    counters.expanded += route.stats.expanded as u64;
    counters.retargets += 1;
    if fallback {
        counters.fallbacks += 1;
        let previous = board.claimant(task);
        if let Some(owner) = previous {
            board.release(task, owner);
        }
        tracing::debug!(agent = me, %goal, previous = ?previous, "stalled, taking over a claimed task");
    }
    board.claim(task, me);
    agent.target = Some(task);
    agent.route = route.cells[1..].iter().copied().collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentSpec, TaskPlacement};
    use crate::grid::Direction;
    use crate::reservation::find_conflicts;

    fn c(r: i32, col: i32) -> Cell {
        Cell::new(r, col)
    }

    fn scenario(mode: Mode, agents: &[Cell], tasks: &[Cell]) -> ScenarioConfig {
        ScenarioConfig {
            agents: agents.iter().map(|&s| AgentSpec::new(s)).collect(),
            tasks: TaskPlacement::Fixed(tasks.to_vec()),
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn planned_run_completes_every_task_once() {
        let grid = GridWorld::open(5, 5).unwrap();
        let config = scenario(Mode::Planned, &[c(1, 1), c(5, 5)], &[c(1, 5), c(5, 1), c(3, 3)]);
        let mut sim = Simulation::new(grid, config).unwrap();
        let mut seen = Vec::new();
        while let Some(snap) = sim.step() {
            seen.extend(snap.completed.iter().map(|c| c.task));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
        let report = sim.report();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.coverage, 1.0);
        assert_eq!(report.ideal, 12);
        assert!(report.total_distance >= report.lower_bound);
        assert!(find_conflicts(sim.committed_paths(), 20).is_empty());
    }

    #[test]
    fn planned_agent_completes_a_task_it_walks_over() {
        // Agent 0 wins (2,4) in the auction, agent 1 wins (2,7). Agent 1 plans
        // first and crosses (2,4) at tick 3; agent 0 has to wait a tick to
        // get there, so agent 1 picks the task up on its way.
        let grid = GridWorld::open(5, 7).unwrap();
        let mut config = scenario(Mode::Planned, &[c(5, 4), c(2, 1)], &[c(2, 4), c(2, 7)]);
        config.agents[1] = AgentSpec::new(c(2, 1)).with_priority(0);
        config.drop_off = Some(c(1, 7));
        config.hold_horizon = 2;
        let mut sim = Simulation::new(grid, config).unwrap();

        let plan = sim.assignment().unwrap();
        assert_eq!(plan.agents[0].tasks, vec![0]);
        assert_eq!(plan.agents[1].tasks, vec![1]);
        assert_eq!(sim.committed_paths()[1].path.at(3), Some(c(2, 4)));
        assert_ne!(sim.committed_paths()[0].path.at(3), Some(c(2, 4)));

        let mut done = Vec::new();
        while let Some(snap) = sim.step() {
            done.extend(snap.completed.iter().map(|d| (snap.tick, d.task, d.agent)));
        }
        assert_eq!(done[0], (3, 0, 1));
        assert_eq!(done.iter().filter(|d| d.1 == 0).count(), 1);
        let report = sim.report();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.agents[1].completed, 2);
        assert_eq!(report.agents[0].completed, 0);
    }

    #[test]
    fn planned_agents_follow_their_committed_paths() {
        let grid = GridWorld::open(4, 4).unwrap();
        let config = scenario(Mode::Planned, &[c(1, 1)], &[c(4, 4)]);
        let mut sim = Simulation::new(grid, config).unwrap();
        let path = sim.committed_paths()[0].path.clone();
        while let Some(snap) = sim.step() {
            assert_eq!(Some(snap.positions[0].cell), path.at(snap.tick));
        }
        assert_eq!(sim.tick(), 6);
        assert_eq!(sim.report().makespan, 6);
        assert_eq!(sim.agents()[0].distance, 6);
    }

    #[test]
    fn reactive_run_cleans_a_row() {
        let grid = GridWorld::open(1, 6).unwrap();
        let config = scenario(Mode::Reactive, &[c(1, 1)], &[c(1, 3), c(1, 6)]);
        let report = Simulation::new(grid, config).unwrap().run();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.ticks, 5);
        assert_eq!(report.agents[0].distance, 5);
        // 2 + 5 from the start, though one sweep covers both.
        assert_eq!(report.ideal, 7);
        assert_eq!(report.lower_bound, 5);
        assert_eq!(report.efficiency, 100.0);
        assert_eq!(report.makespan, 5);
    }

    #[test]
    fn reactive_agents_split_work_by_territory() {
        let grid = GridWorld::open(1, 9).unwrap();
        let config = scenario(Mode::Reactive, &[c(1, 1), c(1, 9)], &[c(1, 2), c(1, 4), c(1, 8), c(1, 6)]);
        let mut sim = Simulation::new(grid, config).unwrap();
        let report = sim.run();
        assert_eq!(report.outcome, Outcome::Completed);
        let owner = |cell| match sim.board().get(sim.board().task_at(cell).unwrap()).unwrap().state {
            TaskState::Completed(a) => a,
            other => panic!("{other:?}"),
        };
        assert_eq!(owner(c(1, 2)), 0);
        assert_eq!(owner(c(1, 4)), 0);
        assert_eq!(owner(c(1, 6)), 1);
        assert_eq!(owner(c(1, 8)), 1);
        assert_eq!(report.tasks_completed, 4);
    }

    #[test]
    fn reactive_agent_completes_a_task_claimed_by_another() {
        // Agent 0 owns both tasks by distance but is walled off from row 1 and
        // has to go round the left side. Agent 1 heads for (1,5) and crosses
        // agent 0's claimed task on the way.
        let grid = GridWorld::from_ascii(".......\n.#.####\n.......")
            .unwrap()
            .with_walls([(c(2, 3), Direction::North)])
            .unwrap();
        let config = scenario(Mode::Reactive, &[c(2, 3), c(1, 1)], &[c(1, 3), c(1, 5)]);
        let mut sim = Simulation::new(grid, config).unwrap();

        let first = sim.step().unwrap();
        assert_eq!(sim.board().claimant(0), Some(0));
        assert_eq!(sim.board().claimant(1), Some(1));
        assert!(first.completed.is_empty());

        let second = sim.step().unwrap();
        assert_eq!(
            second.completed,
            vec![Completion {
                task: 0,
                cell: c(1, 3),
                agent: 1
            }]
        );
        let report = sim.run();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.ticks, 4);
        assert_eq!(report.agents[1].completed, 2);
        assert_eq!(report.agents[0].completed, 0);
    }

    #[test]
    fn spreading_tasks_join_a_reactive_run() {
        let grid = GridWorld::open(1, 8).unwrap();
        let mut config = scenario(Mode::Reactive, &[c(1, 1)], &[c(1, 8)]);
        config.spread = Some(Spread { every: 3, limit: 2 });
        let mut sim = Simulation::new(grid, config).unwrap();

        let mut arrivals = Vec::new();
        while let Some(snap) = sim.step() {
            if !snap.arrived.is_empty() {
                arrivals.push((snap.tick, snap.arrived));
            }
        }
        assert_eq!(arrivals, vec![(3, vec![c(1, 7)]), (6, vec![c(1, 6)])]);
        let report = sim.report();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.tasks_total, 3);
        assert_eq!(report.tasks_completed, 3);
        assert_eq!(report.ticks, 9);
        assert_eq!(report.ideal, 7 + 6 + 5);
    }

    #[test]
    fn tasks_posted_mid_run_are_picked_up() {
        let grid = GridWorld::open(3, 3).unwrap();
        let config = scenario(Mode::Reactive, &[c(1, 1), c(3, 3)], &[c(1, 2)]);
        let mut sim = Simulation::new(grid, config).unwrap();
        sim.step();
        assert_eq!(sim.board().remaining(), 0);
        assert!(sim.is_finished());

        assert!(sim.add_task(c(2, 2)).is_ok());
        assert!(sim.add_task(c(2, 2)).is_err());
        assert!(!sim.is_finished());
        let report = sim.run();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.tasks_total, 2);
        assert_eq!(report.ideal, 1 + 2);
    }

    #[test]
    fn planned_runs_reject_new_tasks() {
        let grid = GridWorld::open(3, 3).unwrap();
        let config = scenario(Mode::Planned, &[c(1, 1)], &[c(1, 2)]);
        let mut sim = Simulation::new(grid, config).unwrap();
        assert!(matches!(sim.add_task(c(3, 3)), Err(PlanError::InvalidConfiguration(_))));
    }

    #[test]
    fn reactive_run_stops_when_nothing_is_reachable() {
        let grid = GridWorld::from_ascii("..#.").unwrap();
        let config = scenario(Mode::Reactive, &[c(1, 1)], &[c(1, 2), c(1, 4)]);
        let report = Simulation::new(grid, config).unwrap().run();
        assert_eq!(report.outcome, Outcome::Partial);
        assert_eq!(report.tasks_completed, 1);
        assert_eq!(report.coverage, 0.5);
        assert!(report.ticks < 10);
    }

    #[test]
    fn budget_exhaustion_is_partial() {
        let grid = GridWorld::open(1, 10).unwrap();
        let mut config = scenario(Mode::Reactive, &[c(1, 1)], &[c(1, 10)]);
        config.max_ticks = 3;
        let mut sim = Simulation::new(grid, config).unwrap();
        let report = sim.run();
        assert_eq!(report.outcome, Outcome::Partial);
        assert_eq!(report.ticks, 3);
        assert!(sim.step().is_none());
    }

    #[test]
    fn stalled_agent_takes_over_a_claimed_task() {
        // Agent 0 owns the task by territory but has to walk around the wall;
        // agent 1 sits idle next to it until the stall fallback kicks in.
        let grid = GridWorld::from_ascii(".....\n####.\n.....").unwrap();
        let mut config = scenario(Mode::Reactive, &[c(3, 1), c(1, 5)], &[c(1, 1)]);
        config.stall_threshold = 2;
        let mut sim = Simulation::new(grid, config).unwrap();
        for _ in 0..4 {
            sim.step();
        }
        // The claim moves with the takeover.
        assert_eq!(sim.board().claimant(0), Some(1));
        let report = sim.run();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.counters.fallbacks, 1);
        assert_eq!(report.agents[1].completed, 1);
        assert_eq!(report.ticks, 7);
    }

    #[test]
    fn unreachable_task_fails_planned_setup() {
        let grid = GridWorld::from_ascii("..#.").unwrap();
        let config = scenario(Mode::Planned, &[c(1, 1)], &[c(1, 4)]);
        let err = Simulation::new(grid, config).err().unwrap();
        assert!(err.is_unreachable());
    }
}
