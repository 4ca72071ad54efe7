//! REST API handlers for rota generation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::demo_data::{self, DemoData};
use crate::domain::{Assignment, EmployeeId, RosterSnapshot, UnavailabilityWindow};
use crate::dto::{
    ErrorResponse, GenerateRotaRequest, GenerateRotaResponse, HealthResponse, InfoResponse,
    TimeOffRequest,
};
use crate::engine::{BacktrackingSolver, SolvingEngine};
use crate::error::{RotaError, RotaResult};
use crate::planner::{worker_pool, RotaPlanner};
use crate::store::{persist, InMemoryRotaStore, RotaStore};

/// Application state shared across handlers.
///
/// Every rota request runs on the one worker pool held here, so concurrent
/// requests queue for the same `workers` threads.
pub struct AppState {
    config: AppConfig,
    roster: RwLock<RosterSnapshot>,
    store: Arc<InMemoryRotaStore>,
    pool: Arc<rayon::ThreadPool>,
    engine: Arc<dyn SolvingEngine>,
}

impl AppState {
    pub fn new(config: AppConfig, roster: RosterSnapshot) -> RotaResult<Self> {
        config.validate()?;
        let pool = worker_pool(&config.solver)?;
        Ok(Self {
            config,
            roster: RwLock::new(roster),
            store: Arc::new(InMemoryRotaStore::new()),
            pool,
            engine: Arc::new(BacktrackingSolver::new()),
        })
    }

    /// Plans with `engine` instead of the bundled solver.
    pub fn with_engine(mut self, engine: Arc<dyn SolvingEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn store(&self) -> &InMemoryRotaStore {
        &self.store
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: RotaError) -> ApiError {
    let status = match &err {
        RotaError::Input { .. }
        | RotaError::UnknownFloor { .. }
        | RotaError::UnknownTask { .. }
        | RotaError::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{id}", get(get_demo_data))
        // Roster
        .route("/roster", get(get_roster).put(put_roster))
        .route("/roster/unavailability", post(add_time_off))
        // Rotas
        .route("/rotas", post(generate_rota))
        .route("/rotas/{date}", get(get_rota_for_day))
        .route("/rotas/{date}/employees/{id}", get(get_rota_for_employee))
        .with_state(state)
}

/// GET /health - Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// GET /info - Application info endpoint.
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Duty Rota",
        version: env!("CARGO_PKG_VERSION"),
        solver_engine: state.engine.name(),
    })
}

/// GET /demo-data - List available demo data sets.
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(demo_data::list_demo_data())
}

/// GET /demo-data/{id} - Get a specific demo roster.
async fn get_demo_data(Path(id): Path<String>) -> Result<Json<RosterSnapshot>, StatusCode> {
    match id.parse::<DemoData>() {
        Ok(demo) => Ok(Json(demo_data::generate(demo))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /roster - The roster new rotas are planned from.
async fn get_roster(State(state): State<Arc<AppState>>) -> Json<RosterSnapshot> {
    Json(state.roster.read().clone())
}

/// PUT /roster - Replaces the roster after validating it.
async fn put_roster(
    State(state): State<Arc<AppState>>,
    Json(roster): Json<RosterSnapshot>,
) -> Result<StatusCode, ApiError> {
    roster.validate().map_err(api_error)?;
    info!(
        employees = roster.employees.len(),
        floors = roster.floors.len(),
        "Roster replaced"
    );
    *state.roster.write() = roster;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /roster/unavailability - Records time off.
async fn add_time_off(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TimeOffRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .roster
        .write()
        .add_time_off(UnavailabilityWindow::from(&req))
        .map_err(api_error)?;
    Ok(StatusCode::CREATED)
}

/// POST /rotas - Plans and stores rotas for every floor over a date range.
async fn generate_rota(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRotaRequest>,
) -> Result<Json<GenerateRotaResponse>, ApiError> {
    let snapshot = state.roster.read().clone();
    let operating = state.config.operating;
    let solver = state.config.solver.clone();
    let pool = state.pool.clone();
    let engine = state.engine.clone();
    let (start, end) = (req.start_date, req.end());

    let started = Instant::now();
    let report = tokio::task::spawn_blocking(move || {
        RotaPlanner::with_pool(snapshot, operating, solver, pool)?
            .with_engine(engine)
            .plan_range(start, end)
    })
    .await
    .map_err(|e| {
        error!("Planner task failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "planner task failed".to_string(),
            }),
        )
    })?
    .map_err(api_error)?;

    let written = persist(&report, state.store.as_ref()).map_err(api_error)?;

    #[cfg(feature = "console")]
    crate::console::print_run_summary(&report, started.elapsed());
    #[cfg(not(feature = "console"))]
    let _ = started;

    Ok(Json(GenerateRotaResponse::from_report(&report, written)))
}

/// GET /rotas/{date} - Stored rota for every floor on a date.
async fn get_rota_for_day(
    State(state): State<Arc<AppState>>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    state
        .store
        .rota_for_day(date)
        .map(Json)
        .map_err(api_error)
}

/// GET /rotas/{date}/employees/{id} - One employee's stored rota for a date.
async fn get_rota_for_employee(
    State(state): State<Arc<AppState>>,
    Path((date, id)): Path<(NaiveDate, u32)>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    state
        .store
        .rota_for_employee_and_day(date, EmployeeId(id))
        .map(Json)
        .map_err(api_error)
}
