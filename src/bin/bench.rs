//! Benchmark for end-to-end unit solving throughput.
//!
//! Run with: cargo run --release --bin bench

use duty_rota::config::{OperatingWindow, SolverConfig};
use duty_rota::demo_data::{self, DemoData};
use duty_rota::extract::audit;
use duty_rota::planner::RotaPlanner;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = demo_data::generate(DemoData::Large);
    let (start, end) = DemoData::Large.planning_range();

    println!("Benchmark: Rota Planning (LARGE)");
    println!("  Floors: {}", snapshot.floors.len());
    println!("  Employees: {}", snapshot.employees.len());
    println!("  Days: {}", (end - start).num_days() + 1);
    println!();

    let operating = OperatingWindow::default();
    let planner = RotaPlanner::new(snapshot, operating, SolverConfig::default_config())?;

    let bench_start = Instant::now();
    let report = planner.plan_range(start, end)?;
    let elapsed = bench_start.elapsed();

    let units = report.units.len();
    let nodes: u64 = report.units.iter().map(|u| u.nodes).sum();
    println!("Results:");
    println!("  Units: {} ({} solved)", units, report.solved_count());
    println!("  Records: {}", report.assignments().len());
    println!("  Search nodes: {}", nodes);
    println!("  Time: {:.2?}", elapsed);
    println!("  Units/sec: {:.0}", units as f64 / elapsed.as_secs_f64());

    // Re-check every solved unit from its records alone
    let index = planner.snapshot().unavailability_index(start, end);
    let mut violations = 0;
    for unit in report.units.iter().filter(|u| u.is_solved()) {
        let Some(floor) = planner.snapshot().floor(&unit.floor) else {
            continue;
        };
        let eligible = duty_rota::eligibility::eligible_employees(
            &planner.snapshot().employees,
            &floor.name,
            unit.date,
            &index,
        );
        let tasks: Vec<_> = floor
            .tasks
            .iter()
            .filter_map(|t| planner.snapshot().task(t))
            .collect();
        violations += audit(&unit.assignments, &eligible, &tasks, &operating).len();
    }
    assert_eq!(violations, 0, "Rota audit failed!");
    println!("  Audit: {} violations (verified)", violations);
    Ok(())
}
