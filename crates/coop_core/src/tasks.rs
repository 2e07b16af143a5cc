//! Ownership record for tasks: who claimed what, and what is done.

use std::collections::HashMap;

use roaring::RoaringBitmap;
use serde::Serialize;

use crate::agent::AgentId;
use crate::error::{PlanError, Result};
use crate::grid::Cell;

pub type TaskId = usize;

/// `Unclaimed -> Claimed -> Completed`; the only way back is an explicit release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "agent", rename_all = "snake_case")]
pub enum TaskState {
    Unclaimed,
    Claimed(AgentId),
    Completed(AgentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub cell: Cell,
    pub state: TaskState,
    pub completed_at: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TaskBoard {
    tasks: Vec<Task>,
    by_cell: HashMap<Cell, TaskId>,
    completed: RoaringBitmap,
}

impl TaskBoard {
    /// One task per cell; duplicates are a configuration error.
    pub fn new(cells: &[Cell]) -> Result<Self> {
        let mut by_cell = HashMap::with_capacity(cells.len());
        let mut tasks = Vec::with_capacity(cells.len());
        for (id, &cell) in cells.iter().enumerate() {
            if by_cell.insert(cell, id).is_some() {
                return Err(PlanError::invalid(format!("duplicate task at {cell}")));
            }
            tasks.push(Task {
                id,
                cell,
                state: TaskState::Unclaimed,
                completed_at: None,
            });
        }
        Ok(Self {
            tasks,
            by_cell,
            completed: RoaringBitmap::new(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Most recent task placed on `cell`.
    pub fn task_at(&self, cell: Cell) -> Option<TaskId> {
        self.by_cell.get(&cell).copied()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len() as usize
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.len() - self.completed_count()
    }

    #[inline]
    pub fn all_done(&self) -> bool {
        self.remaining() == 0
    }

    pub fn is_completed(&self, id: TaskId) -> bool {
        self.completed.contains(id as u32)
    }

    pub fn claimant(&self, id: TaskId) -> Option<AgentId> {
        match self.tasks.get(id)?.state {
            TaskState::Claimed(agent) => Some(agent),
            _ => None,
        }
    }

    /// Tasks not yet completed, in input order.
    pub fn open(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks
            .iter()
            .filter(|t| !matches!(t.state, TaskState::Completed(_)))
    }

    /// Tasks neither completed nor claimed.
    pub fn unclaimed(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Unclaimed)
    }

    /// Posts a new unclaimed task. A cell whose earlier task is done may take
    /// a new one; a cell with an open task may not.
    pub fn add(&mut self, cell: Cell) -> Result<TaskId> {
        if let Some(existing) = self.task_at(cell) {
            if !self.is_completed(existing) {
                return Err(PlanError::invalid(format!("task {cell} is already open")));
            }
        }
        let id = self.tasks.len();
        self.tasks.push(Task {
            id,
            cell,
            state: TaskState::Unclaimed,
            completed_at: None,
        });
        self.by_cell.insert(cell, id);
        Ok(id)
    }

    /// True if `agent` holds the claim afterwards.
    pub fn claim(&mut self, id: TaskId, agent: AgentId) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        match task.state {
            TaskState::Unclaimed => {
                task.state = TaskState::Claimed(agent);
                true
            }
            TaskState::Claimed(owner) => owner == agent,
            TaskState::Completed(_) => false,
        }
    }

    /// Drops `agent`'s claim. Returns false if it did not hold one.
    pub fn release(&mut self, id: TaskId, agent: AgentId) -> bool {
        match self.tasks.get_mut(id) {
            Some(task) if task.state == TaskState::Claimed(agent) => {
                task.state = TaskState::Unclaimed;
                true
            }
            _ => false,
        }
    }

    /// Marks the task done by `agent`, dropping whatever claim it carried.
    /// Returns false if it was already completed.
    pub fn complete(&mut self, id: TaskId, agent: AgentId, tick: u32) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if matches!(task.state, TaskState::Completed(_)) {
            return false;
        }
        task.state = TaskState::Completed(agent);
        task.completed_at = Some(tick);
        self.completed.insert(id as u32);
        true
    }
}
