//! End-to-end rota scenarios over the public API.

use chrono::{NaiveDate, Timelike};
use std::collections::{BTreeMap, HashSet};

use duty_rota::config::{OperatingWindow, SolverConfig};
use duty_rota::demo_data::{self, DemoData};
use duty_rota::domain::{
    Assignment, Duty, Employee, EmployeeId, Floor, RosterSnapshot, Task, UnavailabilityWindow,
};
use duty_rota::eligibility::eligible_employees;
use duty_rota::error::{RotaError, ShortfallKind};
use duty_rota::extract::audit;
use duty_rota::model::RotaModelBuilder;
use duty_rota::planner::{RotaPlanner, UnitStatus};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn planner(snapshot: RosterSnapshot) -> RotaPlanner {
    RotaPlanner::new(snapshot, OperatingWindow::default(), SolverConfig::default_config()).unwrap()
}

fn till_floor(employees: Vec<Employee>, required: u32) -> RosterSnapshot {
    RosterSnapshot::new(
        employees,
        vec![Floor::new("Ground", ["Till"]).with_total_required(required)],
        vec![Task::new("Till", required)],
        vec![],
    )
    .unwrap()
}

fn by_employee(records: &[Assignment]) -> BTreeMap<EmployeeId, Vec<&Assignment>> {
    let mut map: BTreeMap<EmployeeId, Vec<&Assignment>> = BTreeMap::new();
    for record in records {
        map.entry(record.employee_id).or_default().push(record);
    }
    map
}

#[test]
fn coverage_beyond_capable_staff_is_infeasible() {
    let snapshot = till_floor(
        vec![Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till"])],
        2,
    );
    let report = planner(snapshot).plan_date(date(4)).unwrap();

    assert_eq!(report.units.len(), 1);
    let unit = &report.units[0];
    assert_eq!(unit.status, UnitStatus::Infeasible);
    assert!(unit.assignments.is_empty());
    assert!(report.assignments().is_empty());
    let error = unit.error.as_deref().unwrap();
    assert!(error.contains("Till needs 2 per slot but only 1"), "{}", error);
}

#[test]
fn lone_employee_cannot_cover_a_full_day_alone() {
    // Coverage must hold in the break slot too, so one employee can never
    // staff this floor.
    let snapshot = till_floor(
        vec![Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till"])],
        1,
    );
    match planner(snapshot).solve_unit("Ground", date(4)) {
        Err(RotaError::Infeasible { shortfalls, .. }) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].kind, ShortfallKind::BreakCover);
        }
        other => panic!("expected infeasible, got {:?}", other),
    }
}

#[test]
fn full_headcount_floors_are_infeasible_not_timed_out() {
    let window = OperatingWindow::default();
    for staff in 5..=7u32 {
        let employees = (1..=staff)
            .map(|id| {
                Employee::new(id, format!("Employee {}", id), "Ground")
                    .with_capabilities(["Till", "Stock", "Cleaning"])
            })
            .collect();
        let snapshot = RosterSnapshot::new(
            employees,
            vec![Floor::new("Ground", ["Till", "Stock", "Cleaning"])],
            vec![
                Task::new("Till", 1),
                Task::new("Stock", 1),
                Task::new("Cleaning", staff - 3),
            ],
            vec![],
        )
        .unwrap();
        let solver = SolverConfig {
            seconds_spent_limit: Some(2),
            ..SolverConfig::default_config()
        };
        let report = RotaPlanner::new(snapshot, window, solver)
            .unwrap()
            .plan_date(date(4))
            .unwrap();

        let unit = &report.units[0];
        assert_eq!(unit.status, UnitStatus::Infeasible, "{} employees", staff);
        assert_eq!(unit.nodes, 0);
    }

    // Four people leave room for everyone's break.
    let employees = (1..=4)
        .map(|id| {
            Employee::new(id, format!("Employee {}", id), "Ground")
                .with_capabilities(["Till", "Stock", "Cleaning"])
        })
        .collect();
    let snapshot = RosterSnapshot::new(
        employees,
        vec![Floor::new("Ground", ["Till", "Stock", "Cleaning"])],
        vec![Task::new("Till", 1), Task::new("Stock", 1), Task::new("Cleaning", 1)],
        vec![],
    )
    .unwrap();
    let report = planner(snapshot).plan_date(date(4)).unwrap();
    assert_eq!(report.units[0].status, UnitStatus::Solved);
}

#[test]
fn pair_shares_a_single_till_with_one_break_each() {
    let snapshot = till_floor(
        vec![
            Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till"]),
            Employee::new(2, "Beth Fox", "Ground").with_capabilities(["Till"]),
        ],
        1,
    );
    let records = planner(snapshot).solve_unit("Ground", date(4)).unwrap();
    assert_eq!(records.len(), 16);

    let window = OperatingWindow::default();
    for (_, cells) in by_employee(&records) {
        assert_eq!(cells.len(), 8);
        let breaks: Vec<_> = cells.iter().filter(|a| a.task == Duty::Break).collect();
        assert_eq!(breaks.len(), 1);
        let hour = breaks[0].start_time.hour();
        assert!((window.break_start..window.break_end).contains(&hour));

        let tills: Vec<u32> = cells
            .iter()
            .filter(|a| a.task.task() == Some("Till"))
            .map(|a| a.start_time.hour())
            .collect();
        for start in 9..=14 {
            let in_window = tills.iter().filter(|h| (start..start + 3).contains(*h)).count();
            assert!(in_window <= 2, "fatigue broken from {}:00", start);
        }
    }
    for hour in 9..17 {
        let on_till = records
            .iter()
            .filter(|a| a.start_time.hour() == hour && a.task.task() == Some("Till"))
            .count();
        assert_eq!(on_till, 1, "coverage at {}:00", hour);
    }
}

#[test]
fn unavailable_employee_is_left_out_of_the_day() {
    let mut snapshot = till_floor(
        vec![
            Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till"]),
            Employee::new(2, "Beth Fox", "Ground").with_capabilities(["Till"]),
            Employee::new(3, "Carl Green", "Ground").with_capabilities(["Till"]),
        ],
        1,
    );
    snapshot
        .add_time_off(UnavailabilityWindow::new(2, date(3), date(5)))
        .unwrap();

    let index = snapshot.unavailability_index(date(4), date(4));
    let eligible = eligible_employees(&snapshot.employees, "Ground", date(4), &index);
    assert_eq!(
        eligible.keys().copied().collect::<Vec<_>>(),
        vec![EmployeeId(1), EmployeeId(3)]
    );

    let floor = snapshot.floor("Ground").unwrap();
    let window = OperatingWindow::default();
    let model = RotaModelBuilder::new(floor, &snapshot.tasks, &window)
        .build(&eligible)
        .unwrap();
    assert!(!model.employees().contains(&EmployeeId(2)));
    assert!((0..model.cp().var_count())
        .filter_map(|i| model.cp().var_name(duty_rota::model::cp::VarId(i)))
        .all(|name| !name.contains("_2_")));

    let planner = planner(snapshot);
    let records = planner.solve_unit("Ground", date(4)).unwrap();
    assert_eq!(records.len(), 16);
    assert!(records.iter().all(|a| a.employee_id != EmployeeId(2)));

    // Back the next day.
    let records = planner.solve_unit("Ground", date(6)).unwrap();
    assert_eq!(records.len(), 24);
}

#[test]
fn filter_and_builder_are_deterministic() {
    let snapshot = demo_data::generate(DemoData::Small);
    let (start, _) = DemoData::Small.planning_range();
    let window = OperatingWindow::default();
    let floor = &snapshot.floors[0];

    let build = || {
        let index = snapshot.unavailability_index(start, start);
        let eligible = eligible_employees(&snapshot.employees, &floor.name, start, &index);
        let ids: Vec<EmployeeId> = eligible.keys().copied().collect();
        let model = RotaModelBuilder::new(floor, &snapshot.tasks, &window)
            .build(&eligible)
            .unwrap();
        (ids, model)
    };

    let (ids_a, model_a) = build();
    let (ids_b, model_b) = build();
    assert_eq!(ids_a, ids_b);
    assert_eq!(model_a, model_b);
}

#[test]
fn demo_range_satisfies_every_rota_rule() {
    let snapshot = demo_data::generate(DemoData::Small);
    let (start, end) = DemoData::Small.planning_range();
    let window = OperatingWindow::default();
    let planner = planner(snapshot.clone());
    let report = planner.plan_range(start, end).unwrap();

    assert_eq!(report.units.len(), 7 * snapshot.floors.len());
    assert!(
        report.failed_units().is_empty(),
        "failed units: {:?}",
        report.failed_units()
    );

    let index = snapshot.unavailability_index(start, end);
    for unit in &report.units {
        let floor = snapshot.floor(&unit.floor).unwrap();
        let eligible = eligible_employees(&snapshot.employees, &floor.name, unit.date, &index);
        let tasks: Vec<&Task> = floor
            .tasks
            .iter()
            .map(|t| snapshot.task(t).unwrap())
            .collect();

        let violations = audit(&unit.assignments, &eligible, &tasks, &window);
        assert!(violations.is_empty(), "{} {}: {:?}", unit.date, unit.floor, violations);

        // Every eligible cell classified exactly once.
        let cells: HashSet<(EmployeeId, u32)> = unit
            .assignments
            .iter()
            .map(|a| (a.employee_id, a.start_time.hour()))
            .collect();
        assert_eq!(cells.len(), unit.assignments.len());
        assert_eq!(cells.len(), eligible.len() * window.slot_count());

        for a in &unit.assignments {
            if let Duty::Task(task) = &a.task {
                assert!(floor.tasks.contains(task));
                assert!(eligible[&a.employee_id].can_perform(task));
            }
        }
    }
}

#[test]
fn configured_window_changes_the_day() {
    let snapshot = till_floor(
        vec![
            Employee::new(1, "Amy Cole", "Ground").with_capabilities(["Till"]),
            Employee::new(2, "Beth Fox", "Ground").with_capabilities(["Till"]),
        ],
        1,
    );
    let window = OperatingWindow {
        first_slot: 8,
        last_slot: 14,
        break_start: 10,
        break_end: 12,
        ..OperatingWindow::default()
    };
    let planner = RotaPlanner::new(snapshot, window, SolverConfig::default_config()).unwrap();
    let records = planner.solve_unit("Ground", date(4)).unwrap();

    assert_eq!(records.len(), 2 * 6);
    assert_eq!(records[0].start_time.hour(), 8);
    for a in records.iter().filter(|a| a.task == Duty::Break) {
        assert!((10..12).contains(&a.start_time.hour()));
    }
}

#[test]
fn unknown_floor_is_an_input_error_not_a_unit_status() {
    let snapshot = demo_data::generate(DemoData::Small);
    let err = planner(snapshot).solve_unit("Roof", date(4)).unwrap_err();
    assert!(matches!(err, RotaError::UnknownFloor { .. }));
    assert!(!err.is_retryable());
}
