//! Error taxonomy for rota generation.
//!
//! Input and invariant failures are raised immediately. Infeasibility and
//! timeouts are expected outcomes that the planner records per unit and
//! moves past.

use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{EmployeeId, Slot};
use crate::extract::Violation;

/// Which counting bound a shortfall breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShortfallKind {
    /// More people needed in one slot than can do the work.
    Headcount,
    /// Break-window slots need more staffed hours than are left once
    /// everyone has taken their break.
    BreakCover,
    /// The day needs more hours of a task than the fatigue rule allows.
    Fatigue,
}

/// A counting bound the eligible employees cannot meet, found before solving.
///
/// `task` is `None` when the bound covers every floor task together.
/// `needed` and `available` are headcount for [`ShortfallKind::Headcount`]
/// and staffed hours otherwise.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageShortfall {
    pub task: Option<String>,
    pub kind: ShortfallKind,
    pub needed: u32,
    pub available: u32,
}

impl fmt::Display for CoverageShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.task.as_deref().unwrap_or("the floor's tasks together");
        match self.kind {
            ShortfallKind::Headcount => write!(
                f,
                "{} needs {} per slot but only {} eligible employee(s) can do it",
                scope, self.needed, self.available
            ),
            ShortfallKind::BreakCover => write!(
                f,
                "{} needs {} staffed hours across the break window but breaks leave only {}",
                scope, self.needed, self.available
            ),
            ShortfallKind::Fatigue => write!(
                f,
                "{} needs {} staffed hours but the fatigue rule allows only {}",
                scope, self.needed, self.available
            ),
        }
    }
}

/// Full solved state of one (employee, slot) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellState {
    pub employee_id: EmployeeId,
    pub slot: Slot,
    pub on_break: bool,
    pub tasks: Vec<String>,
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "employee {} at {}: break={}, tasks=[{}]",
            self.employee_id,
            self.slot,
            self.on_break,
            self.tasks.join(", ")
        )
    }
}

fn join_shortfalls(shortfalls: &[CoverageShortfall]) -> String {
    if shortfalls.is_empty() {
        return "no single task is short-staffed; constraints conflict jointly".to_string();
    }
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum RotaError {
    #[error("invalid input: {message}")]
    Input { message: String },

    #[error("unknown floor: {floor}")]
    UnknownFloor { floor: String },

    #[error("floor {floor} lists task {task} which is not in the task catalog")]
    UnknownTask { floor: String, task: String },

    #[error("no rota exists for {floor} on {date}: {}", join_shortfalls(.shortfalls))]
    Infeasible {
        floor: String,
        date: NaiveDate,
        shortfalls: Vec<CoverageShortfall>,
    },

    #[error("solver gave up on {floor} on {date} after {elapsed:?}")]
    Timeout {
        floor: String,
        date: NaiveDate,
        elapsed: Duration,
    },

    #[error("solver rejected the model for {floor} on {date}: {reason}")]
    ModelInvalid {
        floor: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("contradictory solver output for {0}")]
    InvariantViolation(CellState),

    #[error("rota for {floor} on {date} breaks {} rule(s): {}", .violations.len(), join_violations(.violations))]
    Unsound {
        floor: String,
        date: NaiveDate,
        violations: Vec<Violation>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RotaError {
    pub fn input(message: impl Into<String>) -> Self {
        RotaError::Input {
            message: message.into(),
        }
    }

    /// Only timeouts may succeed when retried with a larger budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RotaError::Timeout { .. })
    }
}

pub type RotaResult<T> = Result<T, RotaError>;
