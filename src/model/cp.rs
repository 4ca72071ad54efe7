//! Solver-agnostic boolean constraint model.
//!
//! Variables are 0/1 and identified by dense [`VarId`]s. Two constraint
//! shapes cover everything the rota needs: bounded sums and implications.

use std::fmt;

/// Dense index of a boolean decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Sum equals the right-hand side.
    Eq,
    /// Sum is at most the right-hand side.
    Le,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Eq => f.write_str("=="),
            Relation::Le => f.write_str("<="),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `sum(vars) <relation> rhs`
    Linear {
        name: String,
        vars: Vec<VarId>,
        relation: Relation,
        rhs: u32,
    },
    /// `when == 1` forces `forbid == 0`.
    Implication { when: VarId, forbid: VarId },
}

impl Constraint {
    pub fn vars(&self) -> Vec<VarId> {
        match self {
            Constraint::Linear { vars, .. } => vars.clone(),
            Constraint::Implication { when, forbid } => vec![*when, *forbid],
        }
    }
}

/// A feasibility model over boolean variables.
///
/// # Examples
///
/// ```
/// use duty_rota::model::cp::CpModel;
///
/// let mut model = CpModel::new("demo");
/// let a = model.new_bool_var("a");
/// let b = model.new_bool_var("b");
/// model.add_sum_eq("exactly one", vec![a, b], 1);
/// model.add_implication(a, b);
///
/// assert_eq!(model.var_count(), 2);
/// assert_eq!(model.constraint_count(), 2);
/// assert_eq!(model.var_name(b), Some("b"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpModel {
    name: String,
    var_names: Vec<String>,
    constraints: Vec<Constraint>,
}

impl CpModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_names: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn new_bool_var(&mut self, name: impl Into<String>) -> VarId {
        self.var_names.push(name.into());
        VarId(self.var_names.len() - 1)
    }

    pub fn add_sum_eq(&mut self, name: impl Into<String>, vars: Vec<VarId>, rhs: u32) {
        self.add_linear(name, vars, Relation::Eq, rhs);
    }

    pub fn add_sum_le(&mut self, name: impl Into<String>, vars: Vec<VarId>, rhs: u32) {
        self.add_linear(name, vars, Relation::Le, rhs);
    }

    pub fn add_linear(
        &mut self,
        name: impl Into<String>,
        vars: Vec<VarId>,
        relation: Relation,
        rhs: u32,
    ) {
        self.constraints.push(Constraint::Linear {
            name: name.into(),
            vars,
            relation,
            rhs,
        });
    }

    /// Enforces `forbid == 0` whenever `when == 1`.
    pub fn add_implication(&mut self, when: VarId, forbid: VarId) {
        self.constraints
            .push(Constraint::Implication { when, forbid });
    }

    /// Caps every contiguous run of `window` variables in `series` at `max` set.
    ///
    /// Returns the number of constraints added. Windows that cannot exceed
    /// `max` are skipped, as is a series shorter than one window.
    ///
    /// # Examples
    ///
    /// ```
    /// use duty_rota::model::cp::CpModel;
    ///
    /// let mut model = CpModel::new("fatigue");
    /// let series: Vec<_> = (0..8).map(|i| model.new_bool_var(format!("x{}", i))).collect();
    /// assert_eq!(model.add_sliding_window_limit("x", &series, 3, 2), 6);
    /// assert_eq!(model.add_sliding_window_limit("x", &series, 3, 3), 0);
    /// assert_eq!(model.add_sliding_window_limit("x", &series[..2], 3, 2), 0);
    /// ```
    pub fn add_sliding_window_limit(
        &mut self,
        name: &str,
        series: &[VarId],
        window: usize,
        max: u32,
    ) -> usize {
        if window == 0 || window <= max as usize {
            return 0;
        }
        let mut added = 0;
        for (start, run) in series.windows(window).enumerate() {
            self.add_sum_le(format!("{}_window_{}", name, start), run.to_vec(), max);
            added += 1;
        }
        added
    }

    pub fn var_count(&self) -> usize {
        self.var_names.len()
    }

    pub fn var_name(&self, var: VarId) -> Option<&str> {
        self.var_names.get(var.0).map(String::as_str)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}
