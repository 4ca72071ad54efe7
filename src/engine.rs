//! Solving engine for boolean feasibility models.
//!
//! [`SolvingEngine`] is the seam: anything that honours the
//! [`SolveStatus`] contract can stand in for [`BacktrackingSolver`].
//!
//! The bundled solver propagates sum bounds and implications to a fixpoint,
//! then searches depth-first with chronological backtracking. It always
//! branches on a variable of the tightest unsatisfied equality; once every
//! equality holds, the remaining open variables can all be set to 0 without
//! breaking an upper bound or an implication, so the search stops there.
//! Exhausting the tree proves infeasibility.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SolverConfig;
use crate::model::cp::{Constraint, CpModel, Relation, VarId};

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    /// A solution was found and proven best. Feasibility models have no
    /// objective, so the bundled solver never reports this.
    Optimal,
    /// A solution satisfying every constraint was found.
    Feasible,
    /// No solution exists.
    Infeasible,
    /// The budget ran out before either a solution or a proof.
    Unknown,
    /// The model itself is malformed.
    ModelInvalid,
}

impl SolveStatus {
    /// Returns the status as a SCREAMING_SNAKE_CASE string.
    ///
    /// ```
    /// use duty_rota::engine::SolveStatus;
    ///
    /// assert_eq!(SolveStatus::ModelInvalid.as_str(), "MODEL_INVALID");
    /// assert!(SolveStatus::Optimal.has_solution());
    /// assert!(!SolveStatus::Unknown.has_solution());
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unknown => "UNKNOWN",
            SolveStatus::ModelInvalid => "MODEL_INVALID",
        }
    }

    pub fn has_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

/// Limits on a single solve. Any one expiring stops the search.
#[derive(Debug, Clone, Default)]
pub struct SolveBudget {
    deadline: Option<Instant>,
    time_limit: Option<Duration>,
    node_limit: Option<u64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl SolveBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Starts the clock now.
    pub fn from_config(config: &SolverConfig) -> Self {
        let mut budget = Self::unlimited();
        if let Some(limit) = config.time_limit() {
            budget = budget.with_time_limit(limit);
        }
        if let Some(nodes) = config.node_limit {
            budget = budget.with_node_limit(nodes);
        }
        budget
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self.time_limit = Some(limit);
        self
    }

    pub fn with_node_limit(mut self, nodes: u64) -> Self {
        self.node_limit = Some(nodes);
        self
    }

    /// Stops the search once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn exhausted(&self, nodes: u64) -> bool {
        if self.node_limit.is_some_and(|limit| nodes >= limit) {
            return true;
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return true;
        }
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveStats {
    /// Branching decisions taken.
    pub nodes: u64,
    pub backtracks: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Result of a solve: status, variable values when solved, and counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    values: Option<Vec<bool>>,
    /// Why the model was rejected, for `ModelInvalid`.
    pub reason: Option<String>,
    pub stats: SolveStats,
}

impl SolveOutcome {
    pub fn solved(status: SolveStatus, values: Vec<bool>, stats: SolveStats) -> Self {
        Self {
            status,
            values: Some(values),
            reason: None,
            stats,
        }
    }

    pub fn unsolved(status: SolveStatus, stats: SolveStats) -> Self {
        Self {
            status,
            values: None,
            reason: None,
            stats,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            status: SolveStatus::ModelInvalid,
            values: None,
            reason: Some(reason.into()),
            stats: SolveStats::default(),
        }
    }

    /// Solved value of `var`. `None` when there is no solution or the id is unknown.
    pub fn value(&self, var: VarId) -> Option<bool> {
        self.values.as_ref()?.get(var.index()).copied()
    }
}

/// A constraint solver with a fixed status contract.
pub trait SolvingEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &CpModel, budget: &SolveBudget) -> SolveOutcome;
}

/// Exhaustive propagate-and-branch solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktrackingSolver;

impl BacktrackingSolver {
    pub fn new() -> Self {
        Self
    }
}

impl SolvingEngine for BacktrackingSolver {
    fn name(&self) -> &'static str {
        "backtracking"
    }

    fn solve(&self, model: &CpModel, budget: &SolveBudget) -> SolveOutcome {
        if let Err(reason) = check_model(model) {
            return SolveOutcome::invalid(reason);
        }
        let started = Instant::now();
        let mut search = Search::new(model);
        let status = search.run(budget);
        let stats = SolveStats {
            elapsed: started.elapsed(),
            ..search.stats
        };
        match status {
            SolveStatus::Feasible | SolveStatus::Optimal => {
                SolveOutcome::solved(status, search.into_values(), stats)
            }
            _ => SolveOutcome::unsolved(status, stats),
        }
    }
}

fn check_model(model: &CpModel) -> Result<(), String> {
    let count = model.var_count();
    for (i, constraint) in model.constraints().iter().enumerate() {
        let vars = constraint.vars();
        if let Some(var) = vars.iter().find(|v| v.index() >= count) {
            return Err(format!(
                "constraint {} references variable {} but the model has {}",
                i,
                var.index(),
                count
            ));
        }
        let mut seen = HashSet::with_capacity(vars.len());
        if let Some(dup) = vars.iter().find(|v| !seen.insert(**v)) {
            let label = model.var_name(*dup).unwrap_or("?");
            return Err(format!("constraint {} uses variable {} twice", i, label));
        }
    }
    Ok(())
}

struct Decision {
    var: VarId,
    trail_len: usize,
    value: bool,
    flipped: bool,
}

struct Search<'m> {
    model: &'m CpModel,
    values: Vec<Option<bool>>,
    /// Constraints touching each variable.
    watches: Vec<Vec<usize>>,
    /// Indices of equality constraints, which drive branching.
    equalities: Vec<usize>,
    trail: Vec<VarId>,
    pending: Vec<VarId>,
    decisions: Vec<Decision>,
    stats: SolveStats,
}

impl<'m> Search<'m> {
    fn new(model: &'m CpModel) -> Self {
        let mut watches = vec![Vec::new(); model.var_count()];
        let mut equalities = Vec::new();
        for (i, constraint) in model.constraints().iter().enumerate() {
            for var in constraint.vars() {
                watches[var.index()].push(i);
            }
            if matches!(constraint, Constraint::Linear { relation: Relation::Eq, .. }) {
                equalities.push(i);
            }
        }
        Self {
            model,
            values: vec![None; model.var_count()],
            watches,
            equalities,
            trail: Vec::new(),
            pending: Vec::new(),
            decisions: Vec::new(),
            stats: SolveStats::default(),
        }
    }

    fn run(&mut self, budget: &SolveBudget) -> SolveStatus {
        let root_ok = (0..self.model.constraint_count()).all(|i| self.propagate_constraint(i));
        if !root_ok || !self.propagate() {
            return SolveStatus::Infeasible;
        }

        loop {
            let Some(var) = self.pick_branch_var() else {
                return SolveStatus::Feasible;
            };
            if budget.exhausted(self.stats.nodes) {
                return SolveStatus::Unknown;
            }
            self.stats.nodes += 1;
            self.decisions.push(Decision {
                var,
                trail_len: self.trail.len(),
                value: true,
                flipped: false,
            });
            let mut consistent = self.assign(var, true) && self.propagate();

            while !consistent {
                self.stats.backtracks += 1;
                let Some(decision) = self.decisions.pop() else {
                    return SolveStatus::Infeasible;
                };
                self.undo_to(decision.trail_len);
                if !decision.flipped {
                    let value = !decision.value;
                    self.decisions.push(Decision {
                        value,
                        flipped: true,
                        ..decision
                    });
                    consistent = self.assign(decision.var, value) && self.propagate();
                }
            }
        }
    }

    /// First open variable of the unsatisfied equality with the least slack.
    fn pick_branch_var(&self) -> Option<VarId> {
        let mut best: Option<(usize, VarId)> = None;
        for &i in &self.equalities {
            let Constraint::Linear { vars, rhs, .. } = &self.model.constraints()[i] else {
                continue;
            };
            let (ones, open) = self.tally(vars);
            if ones >= *rhs as usize || open == 0 {
                continue;
            }
            let slack = open - (*rhs as usize - ones);
            if best.map_or(true, |(best_slack, _)| slack < best_slack) {
                let first_open = vars.iter().copied().find(|v| self.values[v.index()].is_none());
                if let Some(var) = first_open {
                    best = Some((slack, var));
                }
            }
        }
        best.map(|(_, var)| var)
    }

    fn tally(&self, vars: &[VarId]) -> (usize, usize) {
        vars.iter().fold((0, 0), |(ones, open), v| match self.values[v.index()] {
            Some(true) => (ones + 1, open),
            Some(false) => (ones, open),
            None => (ones, open + 1),
        })
    }

    fn assign(&mut self, var: VarId, value: bool) -> bool {
        match self.values[var.index()] {
            Some(current) => current == value,
            None => {
                self.values[var.index()] = Some(value);
                self.trail.push(var);
                self.pending.push(var);
                true
            }
        }
    }

    fn undo_to(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            if let Some(var) = self.trail.pop() {
                self.values[var.index()] = None;
            }
        }
        self.pending.clear();
    }

    /// Runs constraint propagation until nothing changes or a conflict appears.
    fn propagate(&mut self) -> bool {
        while let Some(var) = self.pending.pop() {
            for k in 0..self.watches[var.index()].len() {
                let constraint = self.watches[var.index()][k];
                if !self.propagate_constraint(constraint) {
                    self.pending.clear();
                    return false;
                }
            }
        }
        true
    }

    fn propagate_constraint(&mut self, index: usize) -> bool {
        let model = self.model;
        match &model.constraints()[index] {
            Constraint::Linear {
                vars, relation, rhs, ..
            } => {
                let rhs = *rhs as usize;
                let (ones, open) = self.tally(vars);
                if ones > rhs {
                    return false;
                }
                if *relation == Relation::Eq && ones + open < rhs {
                    return false;
                }
                let fill = if ones == rhs {
                    false
                } else if *relation == Relation::Eq && ones + open == rhs {
                    true
                } else {
                    return true;
                };
                let open: Vec<VarId> = vars
                    .iter()
                    .copied()
                    .filter(|v| self.values[v.index()].is_none())
                    .collect();
                open.into_iter().all(|v| self.assign(v, fill))
            }
            Constraint::Implication { when, forbid } => {
                match (self.values[when.index()], self.values[forbid.index()]) {
                    (Some(true), _) => self.assign(*forbid, false),
                    (_, Some(true)) => self.assign(*when, false),
                    _ => true,
                }
            }
        }
    }

    /// Open variables left after all equalities hold default to 0.
    fn into_values(self) -> Vec<bool> {
        self.values.into_iter().map(|v| v.unwrap_or(false)).collect()
    }
}
