use crate::grid::Cell;

/// Failures surfaced by the planning and allocation core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The goal cannot be reached under the current obstacles or reservations.
    /// `to` is `None` when the goal was a predicate rather than a single cell.
    #[error("no path from {from}{}", target_suffix(.to))]
    NoPathFound { from: Cell, to: Option<Cell> },

    /// A space-time search ran past its time bound without reaching the goal.
    #[error("search from {from} exceeded the time horizon of {horizon} ticks")]
    HorizonExceeded { from: Cell, horizon: u32 },

    /// The scenario cannot be run as configured. Raised before the first tick.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn target_suffix(to: &Option<Cell>) -> String {
    match to {
        Some(cell) => format!(" to {cell}"),
        None => " to any matching cell".to_string(),
    }
}

impl PlanError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn no_path(from: Cell, to: impl Into<Option<Cell>>) -> Self {
        Self::NoPathFound {
            from,
            to: to.into(),
        }
    }

    /// True for both path failures, which callers handle the same way.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NoPathFound { .. } | Self::HorizonExceeded { .. })
    }
}

pub type Result<T, E = PlanError> = std::result::Result<T, E>;
