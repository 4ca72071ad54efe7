//! Demo roster snapshots for a department store.
//!
//! Every floor gets `2 * demand + 2` employees and every task at least
//! `2 * required + 2` capable ones, and at most one employee per floor is
//! off on any date, so every unit of a demo range is staffable.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

use crate::domain::{Employee, Floor, RosterSnapshot, Task, UnavailabilityWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Small,
    Large,
}

impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SMALL" => Ok(DemoData::Small),
            "LARGE" => Ok(DemoData::Large),
            _ => Err(()),
        }
    }
}

impl DemoData {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
        }
    }

    /// First and last date the demo's time off is spread over.
    pub fn planning_range(&self) -> (NaiveDate, NaiveDate) {
        let start = first_monday();
        (start, start + Duration::days(self.parameters().days - 1))
    }

    fn parameters(&self) -> DemoDataParameters {
        match self {
            DemoData::Small => DemoDataParameters {
                floors: vec![
                    ("Ground", vec!["Till", "Customer Service"]),
                    ("First", vec!["Stock", "Fitting Room"]),
                ],
                tasks: vec![
                    ("Till", 2),
                    ("Customer Service", 1),
                    ("Stock", 1),
                    ("Fitting Room", 1),
                ],
                days: 7,
                capability_distribution: vec![(1, 3.0), (2, 1.0)],
                time_off_distribution: vec![(0, 3.0), (1, 2.0)],
            },
            DemoData::Large => DemoDataParameters {
                floors: vec![
                    ("Ground", vec!["Till", "Customer Service", "Returns"]),
                    ("First", vec!["Stock", "Fitting Room"]),
                    ("Second", vec!["Till", "Stock"]),
                    ("Basement", vec!["Click and Collect", "Stock"]),
                ],
                tasks: vec![
                    ("Till", 2),
                    ("Customer Service", 1),
                    ("Returns", 1),
                    ("Stock", 1),
                    ("Fitting Room", 1),
                    ("Click and Collect", 1),
                ],
                days: 28,
                capability_distribution: vec![(1, 3.0), (2, 2.0), (3, 1.0)],
                time_off_distribution: vec![(0, 2.0), (1, 2.0), (2, 1.0)],
            },
        }
    }
}

struct DemoDataParameters {
    floors: Vec<(&'static str, Vec<&'static str>)>,
    tasks: Vec<(&'static str, u32)>,
    days: i64,
    capability_distribution: Vec<(usize, f64)>,
    time_off_distribution: Vec<(usize, f64)>,
}

/// List of available demo data sets.
pub fn list_demo_data() -> Vec<&'static str> {
    vec!["SMALL", "LARGE"]
}

/// Generates a demo snapshot for the given size.
pub fn generate(demo: DemoData) -> RosterSnapshot {
    let params = demo.parameters();
    let mut rng = StdRng::seed_from_u64(0);
    let name_permutations = generate_name_permutations(&mut rng);

    let tasks: Vec<Task> = params
        .tasks
        .iter()
        .map(|&(name, required)| Task::new(name, required))
        .collect();
    let required = |task: &str| {
        tasks
            .iter()
            .find(|t| t.name == task)
            .map_or(0, |t| t.employees_required)
    };

    let mut floors = Vec::new();
    let mut employees: Vec<Employee> = Vec::new();
    for (floor_name, floor_tasks) in &params.floors {
        let demand: u32 = floor_tasks.iter().map(|t| required(*t)).sum();
        let headcount = (2 * demand + 2) as usize;
        let first = employees.len();

        for _ in 0..headcount {
            let id = employees.len() as u32 + 1;
            let name = name_permutations[employees.len() % name_permutations.len()].clone();
            let count = pick_count(&mut rng, &params.capability_distribution);
            let capabilities: Vec<&str> = floor_tasks
                .choose_multiple(&mut rng, count.min(floor_tasks.len()))
                .copied()
                .collect();
            employees.push(Employee::new(id, name, *floor_name).with_capabilities(capabilities));
        }

        // Top up until each task has enough capable staff.
        let staff = &mut employees[first..];
        for task in floor_tasks {
            let target = (2 * required(*task) + 2) as usize;
            loop {
                let capable = staff.iter().filter(|e| e.can_perform(task)).count();
                if capable >= target {
                    break;
                }
                let lacking: Vec<usize> = (0..staff.len())
                    .filter(|&i| !staff[i].can_perform(task))
                    .collect();
                let Some(&pick) = lacking.choose(&mut rng) else {
                    break;
                };
                staff[pick].capabilities.insert(task.to_string());
            }
        }

        floors.push(
            Floor::new(*floor_name, floor_tasks.iter().copied()).with_total_required(demand),
        );
    }

    let start = first_monday();
    let mut absent: HashSet<(String, NaiveDate)> = HashSet::new();
    let mut unavailability = Vec::new();
    for day in 0..params.days {
        let date = start + Duration::days(day);
        let count = pick_count(&mut rng, &params.time_off_distribution);
        for _ in 0..count {
            let Some(employee) = employees.choose(&mut rng) else {
                break;
            };
            let end = date + Duration::days(rng.gen_range(0..3));
            let covered: Vec<NaiveDate> = date.iter_days().take_while(|d| *d <= end).collect();
            let floor = &employee.default_floor;
            if covered
                .iter()
                .any(|d| absent.contains(&(floor.clone(), *d)))
            {
                continue;
            }
            for d in covered {
                absent.insert((floor.clone(), d));
            }
            unavailability.push(UnavailabilityWindow::new(employee.id.0, date, end));
        }
    }

    RosterSnapshot {
        employees,
        floors,
        tasks,
        unavailability,
    }
}

fn first_monday() -> NaiveDate {
    let reference = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
    let days_until_monday = match reference.weekday() {
        Weekday::Mon => 0,
        Weekday::Tue => 6,
        Weekday::Wed => 5,
        Weekday::Thu => 4,
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        Weekday::Sun => 1,
    };
    reference + Duration::days(days_until_monday)
}

/// Pick a count based on weighted distribution.
fn pick_count(rng: &mut StdRng, distribution: &[(usize, f64)]) -> usize {
    let total_weight: f64 = distribution.iter().map(|(_, w)| w).sum();
    let mut choice = rng.gen::<f64>() * total_weight;

    for (count, weight) in distribution {
        if choice < *weight {
            return *count;
        }
        choice -= weight;
    }
    distribution.last().map(|(c, _)| *c).unwrap_or(1)
}

const FIRST_NAMES: &[&str] = &[
    "Amy", "Beth", "Carl", "Dan", "Elsa", "Flo", "Gus", "Hugo", "Ivy", "Jay",
];
const LAST_NAMES: &[&str] = &[
    "Cole", "Fox", "Green", "Jones", "King", "Li", "Poe", "Rye", "Smith", "Watt",
];

fn generate_name_permutations(rng: &mut StdRng) -> Vec<String> {
    let mut names = Vec::with_capacity(FIRST_NAMES.len() * LAST_NAMES.len());
    for first in FIRST_NAMES {
        for last in LAST_NAMES {
            names.push(format!("{} {}", first, last));
        }
    }
    names.shuffle(rng);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_generate_small() {
        let snapshot = generate(DemoData::Small);

        // Ground: 2 * 3 + 2, First: 2 * 2 + 2
        assert_eq!(snapshot.employees.len(), 14);
        assert_eq!(snapshot.floors.len(), 2);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_generate_large() {
        let snapshot = generate(DemoData::Large);

        assert_eq!(snapshot.floors.len(), 4);
        assert_eq!(snapshot.employees.len(), 10 + 6 + 8 + 6);
        assert!(snapshot.validate().is_ok());
        assert!(!snapshot.unavailability.is_empty());
    }

    #[test]
    fn test_every_task_has_spare_capable_staff() {
        for demo in [DemoData::Small, DemoData::Large] {
            let snapshot = generate(demo);
            for floor in &snapshot.floors {
                for task in &floor.tasks {
                    let required = snapshot.task(task).unwrap().employees_required;
                    let capable = snapshot
                        .employees
                        .iter()
                        .filter(|e| e.default_floor == floor.name && e.can_perform(task))
                        .count();
                    assert!(
                        capable >= (2 * required + 2) as usize,
                        "{} on {} has only {} capable",
                        task,
                        floor.name,
                        capable
                    );
                }
            }
        }
    }

    #[test]
    fn test_at_most_one_absence_per_floor_and_day() {
        let snapshot = generate(DemoData::Large);
        let (start, end) = DemoData::Large.planning_range();
        let index = snapshot.unavailability_index(start, end + Duration::days(3));
        let mut per_unit: HashMap<(&str, NaiveDate), usize> = HashMap::new();
        for date in start.iter_days().take_while(|d| *d <= end + Duration::days(3)) {
            for employee in &snapshot.employees {
                if index.is_unavailable(date, employee.id) {
                    *per_unit.entry((employee.default_floor.as_str(), date)).or_default() += 1;
                }
            }
        }
        assert!(per_unit.values().all(|&n| n == 1));
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate(DemoData::Small), generate(DemoData::Small));
    }

    #[test]
    fn test_planning_range_starts_monday() {
        let (start, end) = DemoData::Small.planning_range();
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!((end - start).num_days(), 6);
    }

    #[test]
    fn test_demo_data_from_str() {
        assert_eq!("SMALL".parse::<DemoData>(), Ok(DemoData::Small));
        assert_eq!("small".parse::<DemoData>(), Ok(DemoData::Small));
        assert_eq!("LARGE".parse::<DemoData>(), Ok(DemoData::Large));
        assert!("invalid".parse::<DemoData>().is_err());
    }
}
