//! Narrows the roster to the employees who can work a floor on a date.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::{Employee, EmployeeId, UnavailabilityIndex};

/// Employees eligible for one unit, keyed (and therefore ordered) by id.
pub type EligibleEmployees<'a> = BTreeMap<EmployeeId, &'a Employee>;

/// Returns employees whose default floor is `floor` and who are not off on `date`.
pub fn eligible_employees<'a>(
    roster: &'a [Employee],
    floor: &str,
    date: NaiveDate,
    unavailable: &UnavailabilityIndex,
) -> EligibleEmployees<'a> {
    roster
        .iter()
        .filter(|e| e.default_floor == floor)
        .filter(|e| !unavailable.is_unavailable(date, e.id))
        .map(|e| (e.id, e))
        .collect()
}
