//! Nearest-agent partition of open task cells.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::grid::{Cell, GridWorld};

/// How a cell equidistant from several agents is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    LowestIndex,
    /// Fewest cells assigned so far in this partition, then lowest index.
    LeastLoaded,
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lowest_index" | "index" => Ok(Self::LowestIndex),
            "least_loaded" | "load" => Ok(Self::LeastLoaded),
            other => Err(format!("unknown tie-break '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerritoryPartitioner {
    /// Repartition every `cadence` ticks. 0 partitions once, at tick 0.
    pub cadence: u32,
    pub tie_break: TieBreak,
}

impl Default for TerritoryPartitioner {
    fn default() -> Self {
        Self {
            cadence: 25,
            tie_break: TieBreak::LowestIndex,
        }
    }
}

/// Per-agent sets of grid cell indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Territories {
    per_agent: Vec<RoaringBitmap>,
}

impl Territories {
    pub fn get(&self, agent: AgentId) -> Option<&RoaringBitmap> {
        self.per_agent.get(agent)
    }

    pub fn contains(&self, grid: &GridWorld, agent: AgentId, cell: Cell) -> bool {
        match (self.per_agent.get(agent), grid.index(cell)) {
            (Some(set), Some(i)) => set.contains(i),
            _ => false,
        }
    }

    /// Agent owning `cell`, if any.
    pub fn owner(&self, grid: &GridWorld, cell: Cell) -> Option<AgentId> {
        let i = grid.index(cell)?;
        self.per_agent.iter().position(|set| set.contains(i))
    }

    pub fn sizes(&self) -> Vec<u64> {
        self.per_agent.iter().map(RoaringBitmap::len).collect()
    }
}

impl TerritoryPartitioner {
    pub fn new(cadence: u32, tie_break: TieBreak) -> Self {
        Self { cadence, tie_break }
    }

    /// Whether a repartition is scheduled at `tick`.
    #[inline]
    pub fn due(&self, tick: u32) -> bool {
        match self.cadence {
            0 => tick == 0,
            k => tick % k == 0,
        }
    }

    /// Gives every task cell to the agent nearest to it by Manhattan distance.
    ///
    /// Cells are visited in ascending grid index, so the result does not
    /// depend on the order of `tasks`. Off-grid cells are ignored.
    pub fn partition<I>(&self, grid: &GridWorld, agents: &[Cell], tasks: I) -> Territories
    where
        I: IntoIterator<Item = Cell>,
    {
        let mut per_agent = vec![RoaringBitmap::new(); agents.len()];
        if agents.is_empty() {
            return Territories { per_agent };
        }
        let cells: RoaringBitmap = tasks.into_iter().filter_map(|c| grid.index(c)).collect();

        for index in &cells {
            let Some(cell) = grid.cell_at(index) else {
                continue;
            };
            let best = self.nearest(agents, &per_agent, cell);
            per_agent[best].insert(index);
        }

        tracing::trace!(sizes = ?per_agent.iter().map(RoaringBitmap::len).collect::<Vec<_>>(), "partitioned territories");
        Territories { per_agent }
    }

    /// Adds one newly arrived task cell to an existing partition without
    /// recomputing the rest. Returns the owner.
    pub fn assign(&self, grid: &GridWorld, territories: &mut Territories, agents: &[Cell], cell: Cell) -> Option<AgentId> {
        let index = grid.index(cell)?;
        if agents.is_empty() {
            return None;
        }
        if territories.per_agent.len() < agents.len() {
            territories.per_agent.resize(agents.len(), RoaringBitmap::new());
        }
        let best = self.nearest(agents, &territories.per_agent, cell);
        territories.per_agent[best].insert(index);
        Some(best)
    }

    fn nearest(&self, agents: &[Cell], per_agent: &[RoaringBitmap], cell: Cell) -> AgentId {
        let mut best = 0;
        for candidate in 1..agents.len() {
            let d_best = agents[best].manhattan(cell);
            let d_cand = agents[candidate].manhattan(cell);
            let wins = d_cand < d_best
                || (d_cand == d_best
                    && self.tie_break == TieBreak::LeastLoaded
                    && per_agent[candidate].len() < per_agent[best].len());
            if wins {
                best = candidate;
            }
        }
        best
    }
}
