//! Day and floor orchestration.
//!
//! A unit is one (floor, date) pair. Units share nothing but the read-only
//! snapshot, so a range is fanned out over a bounded rayon pool and the
//! reports are gathered back in (date, floor order).

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{OperatingWindow, SolverConfig};
use crate::domain::{Assignment, Floor, RosterSnapshot, Task, UnavailabilityIndex};
use crate::eligibility::eligible_employees;
use crate::engine::{BacktrackingSolver, SolveBudget, SolveStats, SolvingEngine};
use crate::error::{RotaError, RotaResult};
use crate::extract::{audit, extract_assignments};
use crate::model::RotaModelBuilder;

/// How a unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Solved,
    Infeasible,
    TimedOut,
    InternalError,
}

impl UnitStatus {
    /// ```
    /// use duty_rota::planner::UnitStatus;
    ///
    /// assert_eq!(UnitStatus::TimedOut.as_str(), "TIMED_OUT");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Solved => "SOLVED",
            UnitStatus::Infeasible => "INFEASIBLE",
            UnitStatus::TimedOut => "TIMED_OUT",
            UnitStatus::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Result of one (floor, date) unit. Only solved units carry records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitReport {
    pub date: NaiveDate,
    pub floor: String,
    pub status: UnitStatus,
    pub assignments: Vec<Assignment>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub nodes: u64,
}

impl UnitReport {
    pub fn is_solved(&self) -> bool {
        self.status == UnitStatus::Solved
    }
}

/// Reports for every unit of a date range, ordered by date then floor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeReport {
    pub run_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub units: Vec<UnitReport>,
}

impl RangeReport {
    /// All records of solved units, in unit order.
    pub fn assignments(&self) -> Vec<Assignment> {
        self.units
            .iter()
            .flat_map(|u| u.assignments.iter().cloned())
            .collect()
    }

    pub fn failed_units(&self) -> Vec<&UnitReport> {
        self.units.iter().filter(|u| !u.is_solved()).collect()
    }

    pub fn solved_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_solved()).count()
    }
}

/// Runs the eligibility, model, solve and extract pipeline per unit.
pub struct RotaPlanner {
    snapshot: RosterSnapshot,
    operating: OperatingWindow,
    solver: SolverConfig,
    engine: Arc<dyn SolvingEngine>,
    cancel: Arc<AtomicBool>,
    pool: Arc<rayon::ThreadPool>,
}

/// Builds the pool units are solved on. `workers: None` uses one thread per CPU.
pub fn worker_pool(solver: &SolverConfig) -> RotaResult<Arc<rayon::ThreadPool>> {
    if solver.workers == Some(0) {
        return Err(RotaError::Config("workers must be at least 1".to_string()));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(solver.workers.unwrap_or(0))
        .thread_name(|i| format!("rota-worker-{}", i))
        .build()
        .map(Arc::new)
        .map_err(|e| RotaError::Config(format!("worker pool: {}", e)))
}

impl RotaPlanner {
    /// Validates the inputs and builds a worker pool sized from `solver`.
    pub fn new(
        snapshot: RosterSnapshot,
        operating: OperatingWindow,
        solver: SolverConfig,
    ) -> RotaResult<Self> {
        let pool = worker_pool(&solver)?;
        Self::with_pool(snapshot, operating, solver, pool)
    }

    /// Like [`RotaPlanner::new`], but runs units on an existing pool so that
    /// several planners share one bound on concurrent solves.
    pub fn with_pool(
        snapshot: RosterSnapshot,
        operating: OperatingWindow,
        solver: SolverConfig,
        pool: Arc<rayon::ThreadPool>,
    ) -> RotaResult<Self> {
        snapshot.validate()?;
        operating.validate()?;
        solver.validate()?;

        Ok(Self {
            snapshot,
            operating,
            solver,
            engine: Arc::new(BacktrackingSolver::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            pool,
        })
    }

    /// Swaps in another engine.
    pub fn with_engine(mut self, engine: Arc<dyn SolvingEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn snapshot(&self) -> &RosterSnapshot {
        &self.snapshot
    }

    pub fn operating(&self) -> &OperatingWindow {
        &self.operating
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Makes in-flight and pending units stop and report `TimedOut`.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Solves one unit. Infeasible and timed-out units come back as errors.
    pub fn solve_unit(&self, floor: &str, date: NaiveDate) -> RotaResult<Vec<Assignment>> {
        let floor = self
            .snapshot
            .floor(floor)
            .ok_or_else(|| RotaError::UnknownFloor {
                floor: floor.to_string(),
            })?;
        let unavailable = self.snapshot.unavailability_index(date, date);
        self.run_unit(floor, date, &unavailable).0
    }

    /// Plans every floor for one date.
    pub fn plan_date(&self, date: NaiveDate) -> RotaResult<RangeReport> {
        self.plan_range(date, date)
    }

    /// Plans every floor for every date in `start..=end`.
    ///
    /// Only input errors fail the call; every other failure is recorded on
    /// its unit and the remaining units still run.
    pub fn plan_range(&self, start: NaiveDate, end: NaiveDate) -> RotaResult<RangeReport> {
        if start > end {
            return Err(RotaError::input(format!(
                "range ends ({}) before it starts ({})",
                end, start
            )));
        }
        let run_id = Uuid::new_v4();
        let unavailable = self.snapshot.unavailability_index(start, end);
        let units: Vec<(NaiveDate, &Floor)> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .flat_map(|date| self.snapshot.floors.iter().map(move |floor| (date, floor)))
            .collect();

        info!(
            run_id = %run_id,
            %start,
            %end,
            units = units.len(),
            engine = self.engine.name(),
            "Planning rota range"
        );

        let started = Instant::now();
        let units = self.pool.install(|| {
            units
                .par_iter()
                .map(|&(date, floor)| self.unit_report(floor, date, &unavailable))
                .collect::<RotaResult<Vec<UnitReport>>>()
        })?;

        let report = RangeReport {
            run_id,
            start,
            end,
            units,
        };
        info!(
            run_id = %run_id,
            solved = report.solved_count(),
            failed = report.failed_units().len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Rota range planned"
        );
        Ok(report)
    }

    fn unit_report(
        &self,
        floor: &Floor,
        date: NaiveDate,
        unavailable: &UnavailabilityIndex,
    ) -> RotaResult<UnitReport> {
        let started = Instant::now();
        let (result, stats) = self.run_unit(floor, date, unavailable);
        let elapsed = started.elapsed();

        let (status, assignments, error) = match result {
            Ok(records) => {
                info!(
                    floor = %floor.name,
                    %date,
                    records = records.len(),
                    nodes = stats.nodes,
                    duration_ms = elapsed.as_millis() as u64,
                    "Unit solved"
                );
                (UnitStatus::Solved, records, None)
            }
            Err(e @ RotaError::Infeasible { .. }) => {
                warn!(floor = %floor.name, %date, "{}", e);
                (UnitStatus::Infeasible, Vec::new(), Some(e.to_string()))
            }
            Err(e @ RotaError::Timeout { .. }) => {
                warn!(floor = %floor.name, %date, nodes = stats.nodes, "{}", e);
                (UnitStatus::TimedOut, Vec::new(), Some(e.to_string()))
            }
            Err(
                e @ (RotaError::InvariantViolation(_)
                | RotaError::ModelInvalid { .. }
                | RotaError::Unsound { .. }),
            ) => {
                error!(floor = %floor.name, %date, "{}", e);
                (UnitStatus::InternalError, Vec::new(), Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        Ok(UnitReport {
            date,
            floor: floor.name.clone(),
            status,
            assignments,
            error,
            elapsed_ms: elapsed.as_millis() as u64,
            nodes: stats.nodes,
        })
    }

    fn run_unit(
        &self,
        floor: &Floor,
        date: NaiveDate,
        unavailable: &UnavailabilityIndex,
    ) -> (RotaResult<Vec<Assignment>>, SolveStats) {
        if self.is_cancelled() {
            let err = RotaError::Timeout {
                floor: floor.name.clone(),
                date,
                elapsed: Duration::ZERO,
            };
            return (Err(err), SolveStats::default());
        }

        let eligible = eligible_employees(&self.snapshot.employees, &floor.name, date, unavailable);
        debug!(floor = %floor.name, %date, eligible = eligible.len(), "Eligibility resolved");

        let model = match RotaModelBuilder::new(floor, &self.snapshot.tasks, &self.operating)
            .build(&eligible)
        {
            Ok(model) => model,
            Err(e) => return (Err(e), SolveStats::default()),
        };
        if !model.shortfalls().is_empty() {
            let err = RotaError::Infeasible {
                floor: floor.name.clone(),
                date,
                shortfalls: model.shortfalls().to_vec(),
            };
            return (Err(err), SolveStats::default());
        }

        let budget = SolveBudget::from_config(&self.solver).with_cancel_flag(self.cancel.clone());
        let outcome = self.engine.solve(model.cp(), &budget);
        let stats = outcome.stats;

        let result = extract_assignments(date, &model, &eligible, &outcome).and_then(|records| {
            let floor_tasks: Vec<&Task> = floor
                .tasks
                .iter()
                .filter_map(|name| self.snapshot.task(name))
                .collect();
            let violations = audit(&records, &eligible, &floor_tasks, &self.operating);
            if violations.is_empty() {
                Ok(records)
            } else {
                Err(RotaError::Unsound {
                    floor: floor.name.clone(),
                    date,
                    violations,
                })
            }
        });
        (result, stats)
    }
}
