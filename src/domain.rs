//! Domain model for floor duty rosters.
//!
//! # Overview
//!
//! - [`Employee`]s belong to a default floor and carry a capability set
//! - [`Floor`]s list the [`Task`]s that must be staffed every slot
//! - [`UnavailabilityWindow`]s remove employees from whole dates
//! - [`Assignment`]s are the hour-by-hour output, one per (employee, slot)
//!
//! Collections use ordered containers so that every derived structure is
//! built in the same order for the same input.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use crate::error::{RotaError, RotaResult};

/// Output label for an employee on their break.
pub const BREAK: &str = "Break";

/// Output label for an employee with neither a task nor a break.
pub const ROAMING: &str = "Roaming";

/// Unique employee identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub u32);

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One hour of the operating window, identified by its starting hour.
///
/// # Examples
///
/// ```
/// use chrono::NaiveTime;
/// use duty_rota::domain::Slot;
///
/// let slot = Slot(9);
/// assert_eq!(slot.start_time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
/// assert_eq!(slot.end_time(), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
/// assert_eq!(Slot(23).end_time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
/// assert_eq!(slot.to_string(), "9:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u32);

impl Slot {
    pub fn start_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.0 % 24, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn end_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt((self.0 + 1) % 24, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:00", self.0)
    }
}

/// A staff member who can be rostered onto their default floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub default_floor: String,
    /// Names of the tasks this employee may perform.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl Employee {
    pub fn new(id: u32, name: impl Into<String>, default_floor: impl Into<String>) -> Self {
        Self {
            id: EmployeeId(id),
            name: name.into(),
            default_floor: default_floor.into(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capabilities(mut self, tasks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for task in tasks {
            self.capabilities.insert(task.into());
        }
        self
    }

    pub fn can_perform(&self, task: &str) -> bool {
        self.capabilities.contains(task)
    }
}

/// A physical floor and the tasks that must be covered on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Floor {
    pub name: String,
    pub tasks: Vec<String>,
    /// Declared headcount. Only cross-checked, never enforced.
    #[serde(default)]
    pub total_employees_required: u32,
}

impl Floor {
    pub fn new(name: impl Into<String>, tasks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            tasks: tasks.into_iter().map(Into::into).collect(),
            total_employees_required: 0,
        }
    }

    pub fn with_total_required(mut self, total: u32) -> Self {
        self.total_employees_required = total;
        self
    }
}

/// A task and the number of employees it needs in every slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    pub employees_required: u32,
}

impl Task {
    pub fn new(name: impl Into<String>, employees_required: u32) -> Self {
        Self {
            name: name.into(),
            employees_required,
        }
    }
}

/// Inclusive date range during which an employee cannot be rostered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailabilityWindow {
    pub employee_id: EmployeeId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl UnavailabilityWindow {
    pub fn new(employee_id: u32, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            employee_id: EmployeeId(employee_id),
            start_date,
            end_date,
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    fn validate(&self) -> RotaResult<()> {
        if self.start_date > self.end_date {
            return Err(RotaError::input(format!(
                "unavailability for employee {} ends ({}) before it starts ({})",
                self.employee_id, self.end_date, self.start_date
            )));
        }
        Ok(())
    }
}

/// Employees unavailable on each date of a range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnavailabilityIndex {
    by_date: BTreeMap<NaiveDate, BTreeSet<EmployeeId>>,
}

impl UnavailabilityIndex {
    /// Expands windows into per-date sets for `start..=end`.
    pub fn from_windows(windows: &[UnavailabilityWindow], start: NaiveDate, end: NaiveDate) -> Self {
        let mut by_date: BTreeMap<NaiveDate, BTreeSet<EmployeeId>> = BTreeMap::new();
        for window in windows {
            let from = window.start_date.max(start);
            let to = window.end_date.min(end);
            for date in from.iter_days().take_while(|d| *d <= to) {
                by_date.entry(date).or_default().insert(window.employee_id);
            }
        }
        Self { by_date }
    }

    pub fn insert(&mut self, date: NaiveDate, employee_id: EmployeeId) {
        self.by_date.entry(date).or_default().insert(employee_id);
    }

    pub fn is_unavailable(&self, date: NaiveDate, employee_id: EmployeeId) -> bool {
        self.by_date
            .get(&date)
            .is_some_and(|ids| ids.contains(&employee_id))
    }

    /// Number of employees off on `date`.
    pub fn count_on(&self, date: NaiveDate) -> usize {
        self.by_date.get(&date).map_or(0, BTreeSet::len)
    }
}

/// What an employee does in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Duty {
    Task(String),
    Break,
    Roaming,
}

impl Duty {
    pub fn as_str(&self) -> &str {
        match self {
            Duty::Task(name) => name,
            Duty::Break => BREAK,
            Duty::Roaming => ROAMING,
        }
    }

    pub fn task(&self) -> Option<&str> {
        match self {
            Duty::Task(name) => Some(name),
            Duty::Break | Duty::Roaming => None,
        }
    }
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Duty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Duty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(match label.as_str() {
            BREAK => Duty::Break,
            ROAMING => Duty::Roaming,
            _ => Duty::Task(label),
        })
    }
}

/// One employee's duty for one slot on one floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub date: NaiveDate,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub floor: String,
    pub task: Duty,
}

/// Everything the planner reads: roster, catalogs and time off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    pub employees: Vec<Employee>,
    /// Floors in rostering order.
    pub floors: Vec<Floor>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub unavailability: Vec<UnavailabilityWindow>,
}

impl RosterSnapshot {
    /// Builds a snapshot and checks catalog consistency.
    pub fn new(
        employees: Vec<Employee>,
        floors: Vec<Floor>,
        tasks: Vec<Task>,
        unavailability: Vec<UnavailabilityWindow>,
    ) -> RotaResult<Self> {
        let snapshot = Self {
            employees,
            floors,
            tasks,
            unavailability,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn from_json_file(path: &Path) -> RotaResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn employee(&self, id: EmployeeId) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    pub fn floor(&self, name: &str) -> Option<&Floor> {
        self.floors.iter().find(|f| f.name == name)
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Records time off for an employee.
    pub fn add_time_off(&mut self, window: UnavailabilityWindow) -> RotaResult<()> {
        window.validate()?;
        if self.employee(window.employee_id).is_none() {
            return Err(RotaError::input(format!(
                "time off for unknown employee {}",
                window.employee_id
            )));
        }
        self.unavailability.push(window);
        Ok(())
    }

    pub fn unavailability_index(&self, start: NaiveDate, end: NaiveDate) -> UnavailabilityIndex {
        UnavailabilityIndex::from_windows(&self.unavailability, start, end)
    }

    pub fn validate(&self) -> RotaResult<()> {
        let mut ids = HashSet::new();
        for employee in &self.employees {
            if !ids.insert(employee.id) {
                return Err(RotaError::input(format!(
                    "duplicate employee id {}",
                    employee.id
                )));
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(RotaError::input(format!("duplicate task {}", task.name)));
            }
        }

        let mut floor_names = HashSet::new();
        for floor in &self.floors {
            if !floor_names.insert(floor.name.as_str()) {
                return Err(RotaError::input(format!("duplicate floor {}", floor.name)));
            }
            let mut seen = HashSet::new();
            for task in &floor.tasks {
                if task == BREAK || task == ROAMING {
                    return Err(RotaError::input(format!(
                        "floor {} uses reserved task name {}",
                        floor.name, task
                    )));
                }
                if !seen.insert(task.as_str()) {
                    return Err(RotaError::input(format!(
                        "floor {} lists task {} twice",
                        floor.name, task
                    )));
                }
                if !task_names.contains(task.as_str()) {
                    return Err(RotaError::UnknownTask {
                        floor: floor.name.clone(),
                        task: task.clone(),
                    });
                }
            }
        }

        for window in &self.unavailability {
            window.validate()?;
        }
        Ok(())
    }
}
