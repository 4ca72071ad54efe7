//! Persistence collaborator for finished rotas.
//!
//! Writes happen a day at a time: every record for the date is dropped and
//! the new day written under a single write lock, so readers see either the
//! previous day or the new one, never a mix of runs.

use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{Assignment, EmployeeId};
use crate::error::RotaResult;
use crate::planner::RangeReport;

/// Storage for assignment records, keyed by date.
pub trait RotaStore: Send + Sync {
    /// Replaces every record of `date`, on any floor, with `records`.
    fn replace_day(&self, date: NaiveDate, records: Vec<Assignment>) -> RotaResult<()>;

    /// All records for `date`, across floors.
    fn rota_for_day(&self, date: NaiveDate) -> RotaResult<Vec<Assignment>>;

    fn rota_for_employee_and_day(
        &self,
        date: NaiveDate,
        employee: EmployeeId,
    ) -> RotaResult<Vec<Assignment>>;
}

#[derive(Debug, Default)]
pub struct InMemoryRotaStore {
    days: RwLock<BTreeMap<NaiveDate, Vec<Assignment>>>,
}

impl InMemoryRotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dates holding at least one record.
    pub fn day_count(&self) -> usize {
        self.days.read().len()
    }
}

impl RotaStore for InMemoryRotaStore {
    fn replace_day(&self, date: NaiveDate, records: Vec<Assignment>) -> RotaResult<()> {
        let mut days = self.days.write();
        let written = records.len();
        let previous = if records.is_empty() {
            days.remove(&date)
        } else {
            days.insert(date, records)
        };
        debug!(
            %date,
            written,
            replaced = previous.map_or(0, |p| p.len()),
            "Day rota replaced"
        );
        Ok(())
    }

    fn rota_for_day(&self, date: NaiveDate) -> RotaResult<Vec<Assignment>> {
        Ok(self.days.read().get(&date).cloned().unwrap_or_default())
    }

    fn rota_for_employee_and_day(
        &self,
        date: NaiveDate,
        employee: EmployeeId,
    ) -> RotaResult<Vec<Assignment>> {
        let days = self.days.read();
        Ok(days
            .get(&date)
            .map(|records| {
                records
                    .iter()
                    .filter(|a| a.employee_id == employee)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Replaces every day of `report` with the records of its solved units.
/// A day's earlier rota is dropped even on floors that failed this run.
/// Returns the number of records written.
pub fn persist(report: &RangeReport, store: &dyn RotaStore) -> RotaResult<usize> {
    let mut days: BTreeMap<NaiveDate, Vec<Assignment>> = BTreeMap::new();
    for unit in &report.units {
        let day = days.entry(unit.date).or_default();
        if unit.is_solved() {
            day.extend(unit.assignments.iter().cloned());
        }
    }

    let mut written = 0;
    for (date, records) in days {
        written += records.len();
        store.replace_day(date, records)?;
    }
    Ok(written)
}
