//! DTOs for REST API requests/responses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::UnavailabilityWindow;
use crate::planner::{RangeReport, UnitReport, UnitStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub solver_engine: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of `POST /rotas`. A missing end date plans a single day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRotaRequest {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl GenerateRotaRequest {
    pub fn end(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date)
    }
}

/// Body of `POST /roster/unavailability`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOffRequest {
    pub employee_id: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl From<&TimeOffRequest> for UnavailabilityWindow {
    fn from(req: &TimeOffRequest) -> Self {
        UnavailabilityWindow::new(req.employee_id, req.start_date, req.end_date)
    }
}

/// Per-unit outcome without the records themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummaryDto {
    pub date: NaiveDate,
    pub floor: String,
    pub status: String,
    pub records: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&UnitReport> for UnitSummaryDto {
    fn from(unit: &UnitReport) -> Self {
        Self {
            date: unit.date,
            floor: unit.floor.clone(),
            status: unit.status.as_str().to_string(),
            records: unit.assignments.len(),
            elapsed_ms: unit.elapsed_ms,
            error: unit.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRotaResponse {
    pub run_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub solved: usize,
    pub failed: usize,
    pub records_written: usize,
    pub units: Vec<UnitSummaryDto>,
}

impl GenerateRotaResponse {
    pub fn from_report(report: &RangeReport, records_written: usize) -> Self {
        Self {
            run_id: report.run_id,
            start_date: report.start,
            end_date: report.end,
            solved: report.solved_count(),
            failed: report
                .units
                .iter()
                .filter(|u| u.status != UnitStatus::Solved)
                .count(),
            records_written,
            units: report.units.iter().map(UnitSummaryDto::from).collect(),
        }
    }
}
