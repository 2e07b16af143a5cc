//! Generic best-first search over any [`SearchSpace`], plus grid-level helpers.
//!
//! One engine serves every strategy. The [`PriorityRule`] decides how a state's
//! cost-so-far and heuristic combine into its frontier priority:
//!
//! | rule              | priority | optimal on unit costs |
//! |-------------------|----------|-----------------------|
//! | `AStar`           | g + h    | yes (h admissible)    |
//! | `GreedyBestFirst` | h        | no                    |
//! | `BreadthFirst`    | g        | yes                   |
//!
//! Equal priorities pop in insertion order, so results are reproducible.

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::grid::{Cell, GridWorld};

/// How frontier priorities are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityRule {
    #[default]
    AStar,
    /// Expands toward the goal ignoring the cost already paid. May return a
    /// strictly longer path than A* on the same instance.
    GreedyBestFirst,
    BreadthFirst,
}

impl PriorityRule {
    #[inline]
    fn priority(self, g: u32, h: u32) -> u32 {
        match self {
            PriorityRule::AStar => g.saturating_add(h),
            PriorityRule::GreedyBestFirst => h,
            PriorityRule::BreadthFirst => g,
        }
    }
}

impl std::str::FromStr for PriorityRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "astar" | "a*" | "a_star" => Ok(Self::AStar),
            "greedy" | "greedy_best_first" => Ok(Self::GreedyBestFirst),
            "bfs" | "breadth_first" => Ok(Self::BreadthFirst),
            other => Err(format!("unknown search rule '{other}'")),
        }
    }
}

/// The capabilities a state space must provide to be searched.
///
/// Every transition costs 1.
pub trait SearchSpace {
    type State: Copy + Eq + Hash;

    /// Appends the successors of `state` to `out`, in a deterministic order.
    fn successors(&self, state: Self::State, out: &mut Vec<Self::State>);

    /// Estimated remaining cost. Must not overestimate for A* to stay optimal.
    fn heuristic(&self, state: Self::State) -> u32;

    fn is_goal(&self, state: Self::State) -> bool;
}

/// Work done by one search call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// States popped from the frontier and expanded.
    pub expanded: usize,
    /// States pushed onto the frontier.
    pub generated: usize,
}

impl std::ops::AddAssign for SearchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.expanded += rhs.expanded;
        self.generated += rhs.generated;
    }
}

/// A successful search: the state sequence from start to goal inclusive.
#[derive(Debug, Clone)]
pub struct Found<S> {
    pub path: Vec<S>,
    pub stats: SearchStats,
}

struct Node<S> {
    state: S,
    parent: Option<usize>,
    g: u32,
}

/// Runs a best-first search from `start`. `Err` carries the stats of the
/// exhausted search; callers turn it into the appropriate [`PlanError`].
pub fn best_first<P: SearchSpace>(
    space: &P,
    start: P::State,
    rule: PriorityRule,
) -> std::result::Result<Found<P::State>, SearchStats> {
    let mut stats = SearchStats::default();
    let mut nodes: Vec<Node<P::State>> = vec![Node {
        state: start,
        parent: None,
        g: 0,
    }];
    let mut best: HashMap<P::State, u32> = HashMap::from([(start, 0)]);
    // (priority, insertion sequence, node index); min-heap through Reverse.
    let mut frontier = BinaryHeap::from([Reverse((rule.priority(0, space.heuristic(start)), 0u64, 0usize))]);
    let mut seq = 1u64;
    let mut scratch = Vec::with_capacity(5);

    while let Some(Reverse((_, _, idx))) = frontier.pop() {
        let (state, g) = (nodes[idx].state, nodes[idx].g);
        // Stale entry: a cheaper route to this state was pushed later.
        if rule != PriorityRule::GreedyBestFirst && best.get(&state).is_some_and(|b| *b < g) {
            continue;
        }
        stats.expanded += 1;

        if space.is_goal(state) {
            return Ok(Found {
                path: unwind(&nodes, idx),
                stats,
            });
        }

        scratch.clear();
        space.successors(state, &mut scratch);
        let next_g = g + 1;
        for &next in &scratch {
            match best.entry(next) {
                Entry::Occupied(mut seen) => {
                    // Greedy closes states on first generation.
                    if rule == PriorityRule::GreedyBestFirst || *seen.get() <= next_g {
                        continue;
                    }
                    seen.insert(next_g);
                }
                Entry::Vacant(slot) => {
                    slot.insert(next_g);
                }
            }
            nodes.push(Node {
                state: next,
                parent: Some(idx),
                g: next_g,
            });
            frontier.push(Reverse((
                rule.priority(next_g, space.heuristic(next)),
                seq,
                nodes.len() - 1,
            )));
            seq += 1;
            stats.generated += 1;
        }
    }

    Err(stats)
}

fn unwind<S: Copy>(nodes: &[Node<S>], mut idx: usize) -> Vec<S> {
    let mut path = vec![nodes[idx].state];
    while let Some(parent) = nodes[idx].parent {
        path.push(nodes[parent].state);
        idx = parent;
    }
    path.reverse();
    path
}

/// A grid path with the search effort spent finding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Start to goal inclusive; never empty.
    pub cells: Vec<Cell>,
    pub stats: SearchStats,
}

impl Route {
    /// Number of moves.
    #[inline]
    pub fn cost(&self) -> u32 {
        self.cells.len().saturating_sub(1) as u32
    }

    #[inline]
    pub fn goal(&self) -> Cell {
        self.cells[self.cells.len() - 1]
    }
}

struct GridSpace<'g, G, H> {
    grid: &'g GridWorld,
    is_goal: G,
    heuristic: H,
}

impl<G, H> SearchSpace for GridSpace<'_, G, H>
where
    G: Fn(Cell) -> bool,
    H: Fn(Cell) -> u32,
{
    type State = Cell;

    fn successors(&self, state: Cell, out: &mut Vec<Cell>) {
        out.extend(self.grid.neighbors(state));
    }

    fn heuristic(&self, state: Cell) -> u32 {
        (self.heuristic)(state)
    }

    fn is_goal(&self, state: Cell) -> bool {
        (self.is_goal)(state)
    }
}

/// Searches `grid` from `start` until `is_goal` holds.
pub fn search<G, H>(
    grid: &GridWorld,
    start: Cell,
    is_goal: G,
    heuristic: H,
    rule: PriorityRule,
) -> Result<Route>
where
    G: Fn(Cell) -> bool,
    H: Fn(Cell) -> u32,
{
    if !grid.is_walkable(start) {
        return Err(PlanError::no_path(start, None));
    }
    let space = GridSpace {
        grid,
        is_goal,
        heuristic,
    };
    match best_first(&space, start, rule) {
        Ok(found) => {
            tracing::trace!(%start, ?rule, expanded = found.stats.expanded, "grid search succeeded");
            Ok(Route {
                cells: found.path,
                stats: found.stats,
            })
        }
        Err(stats) => {
            tracing::trace!(%start, ?rule, expanded = stats.expanded, "grid search exhausted");
            Err(PlanError::no_path(start, None))
        }
    }
}

/// Point-to-point search with the Manhattan heuristic.
pub fn shortest_path(grid: &GridWorld, start: Cell, goal: Cell, rule: PriorityRule) -> Result<Route> {
    if !grid.is_walkable(goal) {
        return Err(PlanError::no_path(start, goal));
    }
    search(grid, start, |c| c == goal, |c| c.manhattan(goal), rule)
        .map_err(|_| PlanError::no_path(start, goal))
}

/// Breadth-first search for the closest cell satisfying `accept`.
pub fn nearest_matching<F>(grid: &GridWorld, start: Cell, accept: F) -> Result<Route>
where
    F: Fn(Cell) -> bool,
{
    search(grid, start, accept, |_| 0, PriorityRule::BreadthFirst)
}

/// Exact step distances from one source to every reachable cell.
#[derive(Debug, Clone)]
pub struct DistanceField {
    source: Cell,
    dist: Vec<Option<u32>>,
    cols: i32,
    rows: i32,
}

impl DistanceField {
    #[inline]
    pub fn source(&self) -> Cell {
        self.source
    }

    /// Distance from the source, `None` if unreachable or off-grid.
    pub fn get(&self, cell: Cell) -> Option<u32> {
        if !(1..=self.rows).contains(&cell.row) || !(1..=self.cols).contains(&cell.col) {
            return None;
        }
        self.dist[(cell.row - 1) as usize * self.cols as usize + (cell.col - 1) as usize]
    }
}

/// Flood-fills breadth-first from `source`. Adjacency is symmetric, so the
/// field also gives distances *to* the source.
pub fn distance_field(grid: &GridWorld, source: Cell) -> DistanceField {
    let mut dist = vec![None; grid.len()];
    let mut queue = VecDeque::new();
    if let Some(i) = grid.index(source).filter(|_| grid.is_walkable(source)) {
        dist[i as usize] = Some(0);
        queue.push_back((source, 0u32));
    }
    while let Some((cell, d)) = queue.pop_front() {
        for next in grid.neighbors(cell) {
            // neighbors() only yields in-range cells
            let i = grid.index(next).map(|i| i as usize).unwrap_or_default();
            if dist[i].is_none() {
                dist[i] = Some(d + 1);
                queue.push_back((next, d + 1));
            }
        }
    }
    DistanceField {
        source,
        dist,
        cols: grid.cols(),
        rows: grid.rows(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(r: i32, col: i32) -> Cell {
        Cell::new(r, col)
    }

    fn assert_contiguous(path: &[Cell]) {
        for pair in path.windows(2) {
            assert_eq!(pair[0].manhattan(pair[1]), 1, "jump in {path:?}");
        }
    }

    #[test]
    fn astar_finds_manhattan_path_on_open_grid() {
        let grid = GridWorld::open(5, 5).unwrap();
        let route = shortest_path(&grid, c(1, 1), c(5, 4), PriorityRule::AStar).unwrap();
        assert_eq!(route.cost(), 7);
        assert_eq!(route.cells[0], c(1, 1));
        assert_eq!(route.goal(), c(5, 4));
        assert_contiguous(&route.cells);
    }

    #[test]
    fn start_equal_to_goal_is_a_zero_cost_success() {
        let grid = GridWorld::open(2, 2).unwrap();
        let route = shortest_path(&grid, c(2, 2), c(2, 2), PriorityRule::GreedyBestFirst).unwrap();
        assert_eq!(route.cells, vec![c(2, 2)]);
        assert_eq!(route.cost(), 0);
    }

    #[test]
    fn unreachable_goal_is_an_error_for_every_rule() {
        let grid = GridWorld::from_ascii("..#..\n..#..\n..#..").unwrap();
        for rule in [
            PriorityRule::AStar,
            PriorityRule::GreedyBestFirst,
            PriorityRule::BreadthFirst,
        ] {
            let err = shortest_path(&grid, c(1, 1), c(3, 5), rule).unwrap_err();
            assert_eq!(err, PlanError::no_path(c(1, 1), c(3, 5)));
            assert!(err.is_unreachable());
        }
    }

    #[test]
    fn greedy_is_never_shorter_than_astar() {
        let map = "\
.......
.#####.
.#...#.
.#.#.#.
...#...";
        let grid = GridWorld::from_ascii(map).unwrap();
        let (start, goal) = (c(5, 3), c(5, 5));
        let astar = shortest_path(&grid, start, goal, PriorityRule::AStar).unwrap();
        let greedy = shortest_path(&grid, start, goal, PriorityRule::GreedyBestFirst).unwrap();
        let bfs = shortest_path(&grid, start, goal, PriorityRule::BreadthFirst).unwrap();
        assert_eq!(astar.cost(), bfs.cost());
        assert!(greedy.cost() >= astar.cost());
        assert_contiguous(&greedy.cells);
    }

    #[test]
    fn equal_priorities_resolve_in_insertion_order() {
        // Every neighbour of (2,2) is a goal at the same depth; they pop in
        // Direction::ALL order, so North wins.
        let grid = GridWorld::open(3, 3).unwrap();
        let route = nearest_matching(&grid, c(2, 2), |cell| cell != c(2, 2)).unwrap();
        assert_eq!(route.cells, vec![c(2, 2), c(1, 2)]);
        let again = nearest_matching(&grid, c(2, 2), |cell| cell != c(2, 2)).unwrap();
        assert_eq!(route, again);
    }

    #[test]
    fn nearest_matching_reports_predicate_failure() {
        let grid = GridWorld::open(2, 2).unwrap();
        let err = nearest_matching(&grid, c(1, 1), |_| false).unwrap_err();
        assert_eq!(err, PlanError::no_path(c(1, 1), None));
    }

    #[test]
    fn distance_field_matches_search() {
        let grid = GridWorld::from_ascii("....\n.##.\n....").unwrap();
        let field = distance_field(&grid, c(1, 1));
        assert_eq!(field.get(c(1, 1)), Some(0));
        assert_eq!(field.get(c(3, 4)), Some(5));
        assert_eq!(field.get(c(2, 2)), None);
        assert_eq!(field.get(c(9, 9)), None);
        let route = shortest_path(&grid, c(1, 1), c(3, 3), PriorityRule::BreadthFirst).unwrap();
        assert_eq!(field.get(c(3, 3)), Some(route.cost()));
    }

    #[test]
    fn rule_parses_from_cli_names() {
        assert_eq!("astar".parse(), Ok(PriorityRule::AStar));
        assert_eq!("Greedy".parse(), Ok(PriorityRule::GreedyBestFirst));
        assert_eq!("bfs".parse(), Ok(PriorityRule::BreadthFirst));
        assert!("dijkstra".parse::<PriorityRule>().is_err());
    }
}
