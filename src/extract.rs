//! Turns a solver outcome into assignment records.
//!
//! Every (employee, slot) cell is classified by its break value and the
//! number of task variables set:
//!
//! | break | tasks | duty |
//! |-------|-------|------|
//! | 1 | 0 | `Break` |
//! | 0 | 0 | `Roaming` |
//! | 0 | 1 | that task |
//! | 1 | ≥1 | invariant violation |
//! | 0 | ≥2 | invariant violation |
//!
//! [`audit`] re-checks a finished record set against the scheduling rules,
//! independent of whichever engine produced it.

use chrono::{NaiveDate, Timelike};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::OperatingWindow;
use crate::domain::{Assignment, Duty, EmployeeId, Slot, Task};
use crate::eligibility::EligibleEmployees;
use crate::engine::{SolveOutcome, SolveStatus};
use crate::error::{CellState, RotaError, RotaResult};
use crate::model::cp::VarId;
use crate::model::RotaModel;

/// Reads the solved model back into one record per (employee, slot),
/// ordered by employee id then slot.
pub fn extract_assignments(
    date: NaiveDate,
    model: &RotaModel,
    eligible: &EligibleEmployees<'_>,
    outcome: &SolveOutcome,
) -> RotaResult<Vec<Assignment>> {
    let floor = model.floor();
    match outcome.status {
        SolveStatus::Optimal | SolveStatus::Feasible => {}
        SolveStatus::Infeasible => {
            return Err(RotaError::Infeasible {
                floor: floor.to_string(),
                date,
                shortfalls: model.shortfalls().to_vec(),
            })
        }
        SolveStatus::Unknown => {
            return Err(RotaError::Timeout {
                floor: floor.to_string(),
                date,
                elapsed: outcome.stats.elapsed,
            })
        }
        SolveStatus::ModelInvalid => {
            return Err(RotaError::ModelInvalid {
                floor: floor.to_string(),
                date,
                reason: outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_string()),
            })
        }
    }

    let mut records = Vec::with_capacity(model.employees().len() * model.slots().len());
    for &id in model.employees() {
        let employee = eligible.get(&id).ok_or_else(|| RotaError::ModelInvalid {
            floor: floor.to_string(),
            date,
            reason: format!("model references employee {} who is not eligible", id),
        })?;

        for &slot in model.slots() {
            let on_break = match model.break_var(id, slot) {
                Some(var) => read(outcome, var, floor, date)?,
                None => false,
            };
            let mut tasks = Vec::new();
            for (t, task) in model.tasks().iter().enumerate() {
                if let Some(var) = model.assign_var(id, slot, t) {
                    if read(outcome, var, floor, date)? {
                        tasks.push(task.clone());
                    }
                }
            }

            let duty = classify(CellState {
                employee_id: id,
                slot,
                on_break,
                tasks,
            })?;
            records.push(Assignment {
                date,
                employee_id: id,
                employee_name: employee.name.clone(),
                start_time: slot.start_time(),
                end_time: slot.end_time(),
                floor: floor.to_string(),
                task: duty,
            });
        }
    }
    Ok(records)
}

fn read(
    outcome: &SolveOutcome,
    var: VarId,
    floor: &str,
    date: NaiveDate,
) -> RotaResult<bool> {
    outcome.value(var).ok_or_else(|| RotaError::ModelInvalid {
        floor: floor.to_string(),
        date,
        reason: format!(
            "solver reported {} without a value for variable {}",
            outcome.status.as_str(),
            var.index()
        ),
    })
}

/// Maps one cell to its duty. Contradictory cells are never guessed at.
pub fn classify(cell: CellState) -> RotaResult<Duty> {
    match (cell.on_break, cell.tasks.as_slice()) {
        (true, []) => Ok(Duty::Break),
        (false, []) => Ok(Duty::Roaming),
        (false, [task]) => Ok(Duty::Task(task.clone())),
        (true, [_, ..]) | (false, [_, _, ..]) => Err(RotaError::InvariantViolation(cell)),
    }
}

/// A scheduling rule broken by a finished record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A task slot staffed by the wrong number of employees.
    Coverage {
        task: String,
        slot: Slot,
        required: u32,
        assigned: u32,
    },
    /// An employee without exactly one break.
    BreakCount { employee_id: EmployeeId, breaks: u32 },
    /// A break outside the break window.
    BreakOutsideWindow { employee_id: EmployeeId, slot: Slot },
    /// Too many slots of one task inside a fatigue window.
    Fatigue {
        employee_id: EmployeeId,
        task: String,
        window_start: Slot,
        count: u32,
    },
    /// A cell with no record, or with more than one.
    CellCount {
        employee_id: EmployeeId,
        slot: Slot,
        records: u32,
    },
    /// A task the employee is not capable of, or that is not on the floor.
    Capability { employee_id: EmployeeId, task: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Coverage {
                task,
                slot,
                required,
                assigned,
            } => write!(f, "{} at {} has {} of {} required", task, slot, assigned, required),
            Violation::BreakCount { employee_id, breaks } => {
                write!(f, "employee {} has {} breaks", employee_id, breaks)
            }
            Violation::BreakOutsideWindow { employee_id, slot } => {
                write!(f, "employee {} breaks at {} outside the break window", employee_id, slot)
            }
            Violation::Fatigue {
                employee_id,
                task,
                window_start,
                count,
            } => write!(
                f,
                "employee {} does {} for {} slots of the window starting {}",
                employee_id, task, count, window_start
            ),
            Violation::CellCount {
                employee_id,
                slot,
                records,
            } => write!(f, "employee {} has {} records at {}", employee_id, records, slot),
            Violation::Capability { employee_id, task } => {
                write!(f, "employee {} was given {} which they cannot do here", employee_id, task)
            }
        }
    }
}

/// Checks a unit's records against every scheduling rule.
///
/// `floor_tasks` are the floor's tasks from the catalog, in floor order.
pub fn audit(
    records: &[Assignment],
    eligible: &EligibleEmployees<'_>,
    floor_tasks: &[&Task],
    window: &OperatingWindow,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let slots: Vec<Slot> = window.slots().collect();

    let mut cells: BTreeMap<(EmployeeId, Slot), Vec<&Duty>> = BTreeMap::new();
    for record in records {
        let slot = Slot(record.start_time.hour());
        cells.entry((record.employee_id, slot)).or_default().push(&record.task);
    }

    for &id in eligible.keys() {
        for &slot in &slots {
            let count = cells.get(&(id, slot)).map_or(0, Vec::len) as u32;
            if count != 1 {
                violations.push(Violation::CellCount {
                    employee_id: id,
                    slot,
                    records: count,
                });
            }
        }
    }
    for (&(id, slot), duties) in &cells {
        if !eligible.contains_key(&id) || !slots.contains(&slot) {
            violations.push(Violation::CellCount {
                employee_id: id,
                slot,
                records: duties.len() as u32,
            });
        }
    }

    let mut coverage: HashMap<(&str, Slot), u32> = HashMap::new();
    for (&(id, slot), duties) in &cells {
        for duty in duties {
            let Duty::Task(task) = duty else { continue };
            let on_floor = floor_tasks.iter().any(|t| &t.name == task);
            let capable = eligible.get(&id).is_some_and(|e| e.can_perform(task));
            if !on_floor || !capable {
                violations.push(Violation::Capability {
                    employee_id: id,
                    task: task.clone(),
                });
            }
            *coverage.entry((task.as_str(), slot)).or_default() += 1;
        }
    }
    for task in floor_tasks {
        for &slot in &slots {
            let assigned = coverage.get(&(task.name.as_str(), slot)).copied().unwrap_or(0);
            if assigned != task.employees_required {
                violations.push(Violation::Coverage {
                    task: task.name.clone(),
                    slot,
                    required: task.employees_required,
                    assigned,
                });
            }
        }
    }

    for &id in eligible.keys() {
        let mut breaks = 0;
        for &slot in &slots {
            let on_break = cells
                .get(&(id, slot))
                .is_some_and(|duties| duties.iter().any(|d| **d == Duty::Break));
            if on_break {
                breaks += 1;
                if !window.is_break_slot(slot) {
                    violations.push(Violation::BreakOutsideWindow {
                        employee_id: id,
                        slot,
                    });
                }
            }
        }
        if breaks != 1 {
            violations.push(Violation::BreakCount {
                employee_id: id,
                breaks,
            });
        }

        let len = window.fatigue_window as usize;
        if len == 0 || len > slots.len() {
            continue;
        }
        for task in floor_tasks {
            for run in slots.windows(len) {
                let count = run
                    .iter()
                    .filter(|slot| {
                        cells.get(&(id, **slot)).is_some_and(|duties| {
                            duties.iter().any(|d| d.task() == Some(task.name.as_str()))
                        })
                    })
                    .count() as u32;
                if count > window.max_same_task {
                    violations.push(Violation::Fatigue {
                        employee_id: id,
                        task: task.name.clone(),
                        window_start: run[0],
                        count,
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Employee, Floor};
    use crate::engine::{BacktrackingSolver, SolveBudget, SolveStats, SolvingEngine};
    use crate::model::RotaModelBuilder;

    fn cell(on_break: bool, tasks: &[&str]) -> CellState {
        CellState {
            employee_id: EmployeeId(1),
            slot: Slot(12),
            on_break,
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(cell(true, &[])).unwrap(), Duty::Break);
        assert_eq!(classify(cell(false, &[])).unwrap(), Duty::Roaming);
        assert_eq!(
            classify(cell(false, &["Till"])).unwrap(),
            Duty::Task("Till".to_string())
        );
    }

    #[test]
    fn test_classify_rejects_task_during_break() {
        let err = classify(cell(true, &["Till"])).unwrap_err();
        match err {
            RotaError::InvariantViolation(state) => {
                assert!(state.on_break);
                assert_eq!(state.tasks, vec!["Till".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_classify_rejects_two_tasks() {
        let err = classify(cell(false, &["Till", "Stock"])).unwrap_err();
        assert!(matches!(err, RotaError::InvariantViolation(ref s) if s.tasks.len() == 2));
    }

    struct Fixture {
        floor: Floor,
        tasks: Vec<Task>,
        employees: Vec<Employee>,
        window: OperatingWindow,
    }

    fn fixture() -> Fixture {
        Fixture {
            floor: Floor::new("Ground", ["Till"]),
            tasks: vec![Task::new("Till", 1)],
            employees: vec![
                Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till"]),
                Employee::new(2, "Beth Fox", "Ground").with_capabilities(["Till"]),
            ],
            window: OperatingWindow::default(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_extract_solved_unit() {
        let f = fixture();
        let eligible: EligibleEmployees = f.employees.iter().map(|e| (e.id, e)).collect();
        let model = RotaModelBuilder::new(&f.floor, &f.tasks, &f.window)
            .build(&eligible)
            .unwrap();
        let outcome = BacktrackingSolver::new().solve(model.cp(), &SolveBudget::unlimited());
        let records = extract_assignments(date(), &model, &eligible, &outcome).unwrap();

        assert_eq!(records.len(), 2 * 8);
        assert_eq!(records[0].employee_id, EmployeeId(1));
        assert_eq!(records[0].employee_name, "Amy Cole");
        assert_eq!(records[8].employee_id, EmployeeId(2));
        assert_eq!(records.iter().filter(|r| r.task == Duty::Break).count(), 2);
        let floor_tasks: Vec<&Task> = f.tasks.iter().collect();
        assert!(audit(&records, &eligible, &floor_tasks, &f.window).is_empty());
    }

    #[test]
    fn test_extract_maps_statuses_to_errors() {
        let f = fixture();
        let eligible: EligibleEmployees = f.employees.iter().map(|e| (e.id, e)).collect();
        let model = RotaModelBuilder::new(&f.floor, &f.tasks, &f.window)
            .build(&eligible)
            .unwrap();

        let infeasible = SolveOutcome::unsolved(SolveStatus::Infeasible, SolveStats::default());
        assert!(matches!(
            extract_assignments(date(), &model, &eligible, &infeasible),
            Err(RotaError::Infeasible { .. })
        ));
        let unknown = SolveOutcome::unsolved(SolveStatus::Unknown, SolveStats::default());
        assert!(matches!(
            extract_assignments(date(), &model, &eligible, &unknown),
            Err(RotaError::Timeout { .. })
        ));
        let invalid = SolveOutcome::invalid("broken");
        assert!(matches!(
            extract_assignments(date(), &model, &eligible, &invalid),
            Err(RotaError::ModelInvalid { ref reason, .. }) if reason == "broken"
        ));
    }

    #[test]
    fn test_extract_rejects_contradictory_values() {
        let f = fixture();
        let eligible: EligibleEmployees = f.employees.iter().map(|e| (e.id, e)).collect();
        let model = RotaModelBuilder::new(&f.floor, &f.tasks, &f.window)
            .build(&eligible)
            .unwrap();
        // Everything set: employee 1 works Till at 9 while on break at 11..15.
        let values = vec![true; model.cp().var_count()];
        let outcome = SolveOutcome::solved(SolveStatus::Feasible, values, SolveStats::default());

        match extract_assignments(date(), &model, &eligible, &outcome) {
            Err(RotaError::InvariantViolation(state)) => {
                assert_eq!(state.employee_id, EmployeeId(1));
                assert_eq!(state.slot, Slot(11));
                assert!(state.on_break);
            }
            other => panic!("expected invariant violation, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_rejects_missing_values() {
        let f = fixture();
        let eligible: EligibleEmployees = f.employees.iter().map(|e| (e.id, e)).collect();
        let model = RotaModelBuilder::new(&f.floor, &f.tasks, &f.window)
            .build(&eligible)
            .unwrap();
        let outcome = SolveOutcome::solved(SolveStatus::Feasible, Vec::new(), SolveStats::default());
        assert!(matches!(
            extract_assignments(date(), &model, &eligible, &outcome),
            Err(RotaError::ModelInvalid { .. })
        ));
    }

    #[test]
    fn test_audit_flags_broken_rota() {
        let f = fixture();
        let eligible: EligibleEmployees = f.employees.iter().map(|e| (e.id, e)).collect();
        let amy = &f.employees[0];
        // Amy works Till all day, Beth roams all day.
        let records: Vec<Assignment> = f
            .window
            .slots()
            .flat_map(|slot| {
                [(amy, Duty::Task("Till".to_string())), (&f.employees[1], Duty::Roaming)]
                    .into_iter()
                    .map(move |(e, duty)| Assignment {
                        date: date(),
                        employee_id: e.id,
                        employee_name: e.name.clone(),
                        start_time: slot.start_time(),
                        end_time: slot.end_time(),
                        floor: "Ground".to_string(),
                        task: duty,
                    })
            })
            .collect();
        let floor_tasks: Vec<&Task> = f.tasks.iter().collect();
        let violations = audit(&records, &eligible, &floor_tasks, &f.window);

        assert!(violations.contains(&Violation::BreakCount {
            employee_id: EmployeeId(1),
            breaks: 0
        }));
        assert!(violations.contains(&Violation::BreakCount {
            employee_id: EmployeeId(2),
            breaks: 0
        }));
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::Fatigue { employee_id: EmployeeId(1), window_start: Slot(9), count: 3, .. }
        )));
        assert!(!violations.iter().any(|v| matches!(v, Violation::Coverage { .. })));
    }
}
