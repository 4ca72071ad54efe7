//! Operating parameters and solver budgets.
//!
//! Nothing here is global: an [`AppConfig`] is loaded once in `main` and
//! handed to the planner and API state at construction.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Slot;
use crate::error::{RotaError, RotaResult};

/// Environment variable naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "DUTY_ROTA_CONFIG";

/// Environment variable overriding the server bind address.
pub const BIND_ENV: &str = "DUTY_ROTA_BIND";

/// Default per-unit solve budget: 10 seconds.
const DEFAULT_TIME_LIMIT_SECS: u64 = 10;

/// The operating day, its break window and the fatigue rule.
///
/// Slot bounds are end-exclusive hours.
///
/// # Examples
///
/// ```
/// use duty_rota::config::OperatingWindow;
///
/// let day = OperatingWindow::default();
/// assert_eq!(day.slot_count(), 8);
/// assert_eq!(day.break_slots().count(), 4);
/// assert!(day.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatingWindow {
    pub first_slot: u32,
    pub last_slot: u32,
    pub break_start: u32,
    pub break_end: u32,
    /// Most slots of one task inside any fatigue window.
    pub max_same_task: u32,
    /// Length of the sliding window the fatigue rule is checked over.
    pub fatigue_window: u32,
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self {
            first_slot: 9,
            last_slot: 17,
            break_start: 11,
            break_end: 15,
            max_same_task: 2,
            fatigue_window: 3,
        }
    }
}

impl OperatingWindow {
    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        (self.first_slot..self.last_slot).map(Slot)
    }

    pub fn break_slots(&self) -> impl Iterator<Item = Slot> {
        (self.break_start..self.break_end).map(Slot)
    }

    pub fn slot_count(&self) -> usize {
        self.last_slot.saturating_sub(self.first_slot) as usize
    }

    pub fn is_break_slot(&self, slot: Slot) -> bool {
        (self.break_start..self.break_end).contains(&slot.0)
    }

    pub fn validate(&self) -> RotaResult<()> {
        if self.first_slot >= self.last_slot || self.last_slot > 24 {
            return Err(RotaError::input(format!(
                "operating window {}..{} must be non-empty and within one day",
                self.first_slot, self.last_slot
            )));
        }
        if self.break_start >= self.break_end
            || self.break_start < self.first_slot
            || self.break_end > self.last_slot
        {
            return Err(RotaError::input(format!(
                "break window {}..{} must be non-empty and inside {}..{}",
                self.break_start, self.break_end, self.first_slot, self.last_slot
            )));
        }
        if self.fatigue_window == 0 {
            return Err(RotaError::input("fatigue window must span at least one slot"));
        }
        Ok(())
    }
}

/// Solver budgets. Limits combine with OR logic.
///
/// Fields missing from a config file keep their defaults, so a partial
/// `solver` section still carries the 10-second time limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverConfig {
    /// Stop a unit's search after this many seconds.
    pub seconds_spent_limit: Option<u64>,
    /// Stop a unit's search after this many branching decisions.
    pub node_limit: Option<u64>,
    /// Units solved concurrently. `None` uses one worker per CPU.
    pub workers: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl SolverConfig {
    /// Creates a config with the default 10-second time limit.
    pub fn default_config() -> Self {
        Self {
            seconds_spent_limit: Some(DEFAULT_TIME_LIMIT_SECS),
            node_limit: None,
            workers: None,
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.seconds_spent_limit.map(Duration::from_secs)
    }

    /// A solve must always be able to give up, so at least one limit is required.
    pub fn validate(&self) -> RotaResult<()> {
        if self.seconds_spent_limit.is_none() && self.node_limit.is_none() {
            return Err(RotaError::Config(
                "solver needs secondsSpentLimit or nodeLimit".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(RotaError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration for the server binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub operating: OperatingWindow,
    pub solver: SolverConfig,
    /// Roster snapshot to load at startup instead of the SMALL demo.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7860".to_string(),
            operating: OperatingWindow::default(),
            solver: SolverConfig::default_config(),
            snapshot_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_json_str(raw: &str) -> RotaResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> RotaResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Loads from `DUTY_ROTA_CONFIG` if set, then applies `DUTY_ROTA_BIND`.
    pub fn from_env() -> RotaResult<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_json_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind_addr = bind;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn socket_addr(&self) -> RotaResult<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| RotaError::Config(format!("bind address {}: {}", self.bind_addr, e)))
    }

    pub fn validate(&self) -> RotaResult<()> {
        self.operating.validate()?;
        self.socket_addr()?;
        self.solver.validate()
    }
}
