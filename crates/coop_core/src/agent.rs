use std::collections::VecDeque;

use serde::Serialize;

use crate::grid::Cell;
use crate::search::PriorityRule;
use crate::tasks::TaskId;

/// Agents are identified by their position in the scenario's agent list.
pub type AgentId = usize;

/// Runtime state of one agent inside a simulation.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub cell: Cell,
    /// Cells travelled; waiting does not count.
    pub distance: u32,
    pub priority: Option<u32>,
    pub rule: PriorityRule,
    pub completed: u32,
    pub last_completion: Option<u32>,
    pub(crate) target: Option<TaskId>,
    /// Cells still to walk, excluding the current one.
    pub(crate) route: VecDeque<Cell>,
}

impl Agent {
    pub fn new(id: AgentId, start: Cell, rule: PriorityRule, priority: Option<u32>) -> Self {
        Self {
            id,
            cell: start,
            distance: 0,
            priority,
            rule,
            completed: 0,
            last_completion: None,
            target: None,
            route: VecDeque::new(),
        }
    }

    #[inline]
    pub fn target(&self) -> Option<TaskId> {
        self.target
    }

    pub(crate) fn move_to(&mut self, next: Cell) {
        if next != self.cell {
            self.distance += 1;
            self.cell = next;
        }
    }

    /// Takes one step along the current route, if any.
    pub(crate) fn advance(&mut self) -> bool {
        match self.route.pop_front() {
            Some(next) => {
                self.move_to(next);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_target(&mut self) {
        self.target = None;
        self.route.clear();
    }

    pub(crate) fn record_completion(&mut self, tick: u32) {
        self.completed += 1;
        self.last_completion = Some(tick);
    }
}

/// Where an agent stands at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentPosition {
    pub agent: AgentId,
    pub cell: Cell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_does_not_add_distance() {
        let mut agent = Agent::new(0, Cell::new(1, 1), PriorityRule::AStar, None);
        agent.route = VecDeque::from([Cell::new(1, 2), Cell::new(1, 2), Cell::new(2, 2)]);
        while agent.advance() {}
        assert_eq!(agent.cell, Cell::new(2, 2));
        assert_eq!(agent.distance, 2);
        assert!(!agent.advance());
    }
}
