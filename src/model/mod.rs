//! Builds the constraint model for one floor on one date.
//!
//! Decision variables:
//! - `assign[e, s, t]` for every slot `s` and every floor task `t` the
//!   employee `e` is capable of
//! - `break[e, s]` for every slot `s` inside the break window
//!
//! Constraints, in the order they are added:
//! 1. coverage: `sum_e assign[e, s, t] == required(t)` for every task and slot
//! 2. fatigue: at most `max_same_task` of any `fatigue_window` consecutive slots per task
//! 3. single break: `sum_s break[e, s] == 1`
//! 4. break exclusivity: `break[e, s]` implies `assign[e, s, t] == 0`
//! 5. one task per slot: `sum_t assign[e, s, t] <= 1`
//!
//! Employees are visited in id order and tasks in floor order, so the same
//! inputs always produce an identical model.
//!
//! The builder also checks counting bounds every rota must meet (see
//! [`RotaModel::shortfalls`]). A model with shortfalls has no solution and
//! should not be searched.

pub mod cp;

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::OperatingWindow;
use crate::domain::{EmployeeId, Floor, Slot, Task};
use crate::eligibility::EligibleEmployees;
use crate::error::{CoverageShortfall, RotaError, RotaResult, ShortfallKind};

use cp::{CpModel, VarId};

/// A floor/date model plus the lookup tables needed to read a solution back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotaModel {
    floor: String,
    cp: CpModel,
    employees: Vec<EmployeeId>,
    tasks: Vec<String>,
    slots: Vec<Slot>,
    assign: BTreeMap<(EmployeeId, Slot, usize), VarId>,
    breaks: BTreeMap<(EmployeeId, Slot), VarId>,
    shortfalls: Vec<CoverageShortfall>,
}

impl RotaModel {
    pub fn floor(&self) -> &str {
        &self.floor
    }

    pub fn cp(&self) -> &CpModel {
        &self.cp
    }

    /// Eligible employees in model order.
    pub fn employees(&self) -> &[EmployeeId] {
        &self.employees
    }

    /// Floor tasks in floor order.
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// `assign[employee, slot, task]`, if the employee can do the task.
    pub fn assign_var(&self, employee: EmployeeId, slot: Slot, task: usize) -> Option<VarId> {
        self.assign.get(&(employee, slot, task)).copied()
    }

    /// `break[employee, slot]`, if the slot is in the break window.
    pub fn break_var(&self, employee: EmployeeId, slot: Slot) -> Option<VarId> {
        self.breaks.get(&(employee, slot)).copied()
    }

    /// Counting bounds the eligible employees cannot meet:
    ///
    /// - headcount: demand per slot against employees able to do the work
    /// - break cover: demand over the `B` break slots against `n * (B - 1)`,
    ///   since each of `n` employees spends one of those slots on break
    /// - fatigue: a task's demand over the day against the most slots the
    ///   fatigue rule lets each capable employee work it
    ///
    /// Each check runs per task over its capable employees, and the first
    /// two also over every floor task together when there are several.
    pub fn shortfalls(&self) -> &[CoverageShortfall] {
        &self.shortfalls
    }
}

/// Translates eligible employees and a floor's requirements into a [`RotaModel`].
pub struct RotaModelBuilder<'a> {
    floor: &'a Floor,
    task_catalog: &'a [Task],
    window: &'a OperatingWindow,
}

impl<'a> RotaModelBuilder<'a> {
    pub fn new(floor: &'a Floor, task_catalog: &'a [Task], window: &'a OperatingWindow) -> Self {
        Self {
            floor,
            task_catalog,
            window,
        }
    }

    pub fn build(&self, eligible: &EligibleEmployees<'_>) -> RotaResult<RotaModel> {
        self.window.validate()?;
        let requirements = self.requirements()?;
        self.cross_check(&requirements);

        let floor = self.floor.name.as_str();
        let slots: Vec<Slot> = self.window.slots().collect();
        let mut cp = CpModel::new(floor);
        let mut assign = BTreeMap::new();
        let mut breaks = BTreeMap::new();

        for (&id, employee) in eligible {
            for &slot in &slots {
                for (t, task) in self.floor.tasks.iter().enumerate() {
                    if employee.can_perform(task) {
                        let var = cp.new_bool_var(format!("assign_{}_{}_{}_{}", id, slot.0, floor, task));
                        assign.insert((id, slot, t), var);
                    }
                }
            }
        }
        for &id in eligible.keys() {
            for slot in self.window.break_slots() {
                let var = cp.new_bool_var(format!("break_{}_{}", id, slot.0));
                breaks.insert((id, slot), var);
            }
        }

        let employees: Vec<EmployeeId> = eligible.keys().copied().collect();
        let task_vars = |id: EmployeeId, slot: Slot| -> Vec<VarId> {
            (0..self.floor.tasks.len())
                .filter_map(|t| assign.get(&(id, slot, t)).copied())
                .collect()
        };

        for (t, (task, required)) in requirements.iter().enumerate() {
            for &slot in &slots {
                let vars: Vec<VarId> = employees
                    .iter()
                    .filter_map(|&id| assign.get(&(id, slot, t)).copied())
                    .collect();
                cp.add_sum_eq(format!("coverage_{}_{}", task, slot.0), vars, *required);
            }
        }

        for &id in &employees {
            for (t, task) in self.floor.tasks.iter().enumerate() {
                let series: Vec<VarId> = slots
                    .iter()
                    .filter_map(|&slot| assign.get(&(id, slot, t)).copied())
                    .collect();
                if series.len() == slots.len() {
                    cp.add_sliding_window_limit(
                        &format!("fatigue_{}_{}", id, task),
                        &series,
                        self.window.fatigue_window as usize,
                        self.window.max_same_task,
                    );
                }
            }
        }

        for &id in &employees {
            let vars: Vec<VarId> = self
                .window
                .break_slots()
                .filter_map(|slot| breaks.get(&(id, slot)).copied())
                .collect();
            cp.add_sum_eq(format!("one_break_{}", id), vars, 1);
        }

        for &id in &employees {
            for slot in self.window.break_slots() {
                if let Some(&on_break) = breaks.get(&(id, slot)) {
                    for var in task_vars(id, slot) {
                        cp.add_implication(on_break, var);
                    }
                }
            }
        }

        for &id in &employees {
            for &slot in &slots {
                let vars = task_vars(id, slot);
                if vars.len() > 1 {
                    cp.add_sum_le(format!("one_task_{}_{}", id, slot.0), vars, 1);
                }
            }
        }

        let shortfalls = self.shortfalls(&requirements, eligible);

        debug!(
            floor,
            employees = employees.len(),
            variables = cp.var_count(),
            constraints = cp.constraint_count(),
            "Built rota model"
        );

        Ok(RotaModel {
            floor: floor.to_string(),
            cp,
            employees,
            tasks: self.floor.tasks.clone(),
            slots,
            assign,
            breaks,
            shortfalls,
        })
    }

    /// Floor tasks paired with their per-slot headcount.
    fn requirements(&self) -> RotaResult<Vec<(String, u32)>> {
        self.floor
            .tasks
            .iter()
            .map(|name| {
                self.task_catalog
                    .iter()
                    .find(|t| &t.name == name)
                    .map(|t| (name.clone(), t.employees_required))
                    .ok_or_else(|| RotaError::UnknownTask {
                        floor: self.floor.name.clone(),
                        task: name.clone(),
                    })
            })
            .collect()
    }

    fn shortfalls(
        &self,
        requirements: &[(String, u32)],
        eligible: &EligibleEmployees<'_>,
    ) -> Vec<CoverageShortfall> {
        let mut shortfalls: Vec<CoverageShortfall> = requirements
            .iter()
            .filter_map(|(task, required)| {
                let capable = eligible.values().filter(|e| e.can_perform(task)).count() as u32;
                self.capacity_shortfall(Some(task), *required, capable)
            })
            .collect();
        if requirements.len() > 1 {
            let demand = requirements.iter().map(|(_, r)| r).sum();
            shortfalls.extend(self.capacity_shortfall(None, demand, eligible.len() as u32));
        }
        shortfalls
    }

    /// First bound `staff` employees cannot meet for `demand` per slot.
    fn capacity_shortfall(
        &self,
        task: Option<&String>,
        demand: u32,
        staff: u32,
    ) -> Option<CoverageShortfall> {
        let slots = self.window.slot_count() as u32;
        let break_slots = self.window.break_end - self.window.break_start;
        let check = |kind: ShortfallKind, needed: u32, available: u32| {
            (needed > available).then(|| CoverageShortfall {
                task: task.cloned(),
                kind,
                needed,
                available,
            })
        };

        check(ShortfallKind::Headcount, demand, staff)
            .or_else(|| {
                check(
                    ShortfallKind::BreakCover,
                    demand * break_slots,
                    staff * (break_slots - 1),
                )
            })
            .or_else(|| {
                task.and_then(|_| {
                    check(ShortfallKind::Fatigue, demand * slots, staff * self.fatigue_cap())
                })
            })
    }

    /// Most slots of one task a single employee can work in a day.
    fn fatigue_cap(&self) -> u32 {
        let slots = self.window.slot_count() as u32;
        let (window, max) = (self.window.fatigue_window, self.window.max_same_task);
        if window <= max || slots < window {
            return slots;
        }
        (slots / window) * max + (slots % window).min(max)
    }

    fn cross_check(&self, requirements: &[(String, u32)]) {
        let per_slot: u32 = requirements.iter().map(|(_, r)| r).sum();
        let declared = self.floor.total_employees_required;
        if declared > 0 && per_slot > declared {
            warn!(
                floor = %self.floor.name,
                declared,
                per_slot,
                "Floor needs more employees per slot than its declared total"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Employee;
    use cp::{Constraint, Relation};

    fn fixture() -> (Floor, Vec<Task>, Vec<Employee>) {
        let floor = Floor::new("Ground", ["Till", "Stock"]).with_total_required(3);
        let tasks = vec![Task::new("Till", 1), Task::new("Stock", 1)];
        let employees = vec![
            Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till", "Stock"]),
            Employee::new(2, "Beth Fox", "Ground").with_capabilities(["Till"]),
            Employee::new(3, "Carl Green", "Ground").with_capabilities(["Stock", "Cleaning"]),
        ];
        (floor, tasks, employees)
    }

    fn eligible(employees: &[Employee]) -> EligibleEmployees<'_> {
        employees.iter().map(|e| (e.id, e)).collect()
    }

    fn count(model: &RotaModel, prefix: &str) -> usize {
        model
            .cp()
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Linear { name, .. } if name.starts_with(prefix)))
            .count()
    }

    #[test]
    fn test_variables_only_for_capable_tasks() {
        let (floor, tasks, employees) = fixture();
        let window = OperatingWindow::default();
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();

        // 4 capable (employee, task) pairs x 8 slots + 3 employees x 4 break slots
        assert_eq!(model.cp().var_count(), 4 * 8 + 3 * 4);
        assert!(model.assign_var(EmployeeId(2), Slot(9), 1).is_none());
        assert!(model.assign_var(EmployeeId(3), Slot(9), 1).is_some());
        assert!(model.break_var(EmployeeId(1), Slot(11)).is_some());
        assert!(model.break_var(EmployeeId(1), Slot(15)).is_none());
    }

    #[test]
    fn test_constraint_families() {
        let (floor, tasks, employees) = fixture();
        let window = OperatingWindow::default();
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();

        assert_eq!(count(&model, "coverage_"), 2 * 8);
        assert_eq!(count(&model, "fatigue_"), 4 * 6);
        assert_eq!(count(&model, "one_break_"), 3);
        // only employee 1 has two floor tasks
        assert_eq!(count(&model, "one_task_"), 8);
        let implications = model
            .cp()
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Implication { .. }))
            .count();
        assert_eq!(implications, 4 * 4);
    }

    #[test]
    fn test_coverage_uses_required_count() {
        let (floor, mut tasks, employees) = fixture();
        tasks[0].employees_required = 2;
        let window = OperatingWindow::default();
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();

        let till_at_nine = model
            .cp()
            .constraints()
            .iter()
            .find_map(|c| match c {
                Constraint::Linear { name, vars, relation, rhs } if name == "coverage_Till_9" => {
                    Some((vars.len(), *relation, *rhs))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(till_at_nine, (2, Relation::Eq, 2));
        // Both Till workers need a break, leaving 6 of the 8 break-window
        // hours; across the floor three people leave 9 of the 12 needed.
        assert_eq!(
            model.shortfalls(),
            &[
                CoverageShortfall {
                    task: Some("Till".to_string()),
                    kind: ShortfallKind::BreakCover,
                    needed: 8,
                    available: 6,
                },
                CoverageShortfall {
                    task: None,
                    kind: ShortfallKind::BreakCover,
                    needed: 12,
                    available: 9,
                },
            ]
        );
    }

    #[test]
    fn test_staffable_floor_has_no_shortfalls() {
        let (floor, tasks, employees) = fixture();
        let window = OperatingWindow::default();
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();
        assert!(model.shortfalls().is_empty());
    }

    #[test]
    fn test_shortfall_reported_when_too_few_capable() {
        let (floor, mut tasks, employees) = fixture();
        tasks[1].employees_required = 3;
        let window = OperatingWindow::default();
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();

        assert_eq!(
            model.shortfalls(),
            &[
                CoverageShortfall {
                    task: Some("Stock".to_string()),
                    kind: ShortfallKind::Headcount,
                    needed: 3,
                    available: 2,
                },
                CoverageShortfall {
                    task: None,
                    kind: ShortfallKind::Headcount,
                    needed: 4,
                    available: 3,
                },
            ]
        );
    }

    #[test]
    fn test_breaks_make_full_headcount_floor_unstaffable() {
        // Five people cover five posts per slot, but someone is always on
        // break during 11-15.
        let floor = Floor::new("Ground", ["Till", "Stock", "Cleaning"]);
        let tasks = vec![
            Task::new("Till", 1),
            Task::new("Stock", 1),
            Task::new("Cleaning", 3),
        ];
        let employees: Vec<Employee> = (1..=5)
            .map(|id| {
                Employee::new(id, format!("Employee {}", id), "Ground")
                    .with_capabilities(["Till", "Stock", "Cleaning"])
            })
            .collect();
        let window = OperatingWindow::default();
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();

        assert_eq!(
            model.shortfalls(),
            &[CoverageShortfall {
                task: None,
                kind: ShortfallKind::BreakCover,
                needed: 20,
                available: 15,
            }]
        );
    }

    #[test]
    fn test_fatigue_rule_limits_hours_per_worker() {
        let floor = Floor::new("Ground", ["Till"]);
        let tasks = vec![Task::new("Till", 2)];
        let employees: Vec<Employee> = (1..=3)
            .map(|id| {
                Employee::new(id, format!("Employee {}", id), "Ground").with_capabilities(["Till"])
            })
            .collect();
        let window = OperatingWindow {
            max_same_task: 1,
            ..OperatingWindow::default()
        };
        let builder = RotaModelBuilder::new(&floor, &tasks, &window);
        // at most one Till hour in any 3: 9, 12 and 15
        assert_eq!(builder.fatigue_cap(), 3);

        let model = builder.build(&eligible(&employees)).unwrap();
        assert_eq!(
            model.shortfalls(),
            &[CoverageShortfall {
                task: Some("Till".to_string()),
                kind: ShortfallKind::Fatigue,
                needed: 16,
                available: 9,
            }]
        );
    }

    #[test]
    fn test_fatigue_cap_without_a_full_window() {
        let (floor, tasks, _) = fixture();
        let window = OperatingWindow {
            first_slot: 11,
            last_slot: 13,
            break_start: 11,
            break_end: 12,
            ..OperatingWindow::default()
        };
        assert_eq!(RotaModelBuilder::new(&floor, &tasks, &window).fatigue_cap(), 2);
    }

    #[test]
    fn test_unknown_task_is_input_error() {
        let (mut floor, tasks, employees) = fixture();
        floor.tasks.push("Security".to_string());
        let window = OperatingWindow::default();
        let result = RotaModelBuilder::new(&floor, &tasks, &window).build(&eligible(&employees));
        assert!(matches!(result, Err(RotaError::UnknownTask { .. })));
    }

    #[test]
    fn test_build_is_deterministic() {
        let (floor, tasks, employees) = fixture();
        let window = OperatingWindow::default();
        let builder = RotaModelBuilder::new(&floor, &tasks, &window);
        let first = builder.build(&eligible(&employees)).unwrap();
        let mut reversed = employees.clone();
        reversed.reverse();
        let second = builder.build(&eligible(&reversed)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fatigue_rule_follows_window_config() {
        let (floor, tasks, employees) = fixture();
        let window = OperatingWindow {
            max_same_task: 3,
            fatigue_window: 4,
            ..OperatingWindow::default()
        };
        let model = RotaModelBuilder::new(&floor, &tasks, &window)
            .build(&eligible(&employees))
            .unwrap();
        // 5 windows of length 4 in an 8-slot day
        assert_eq!(count(&model, "fatigue_"), 4 * 5);
    }
}
