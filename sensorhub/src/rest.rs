use crate::auth::require_user;
use crate::dashboard;
use crate::errors::Error;
use crate::ingest::{IngestError, IngestService};
use crate::model::{PublicSensorResponse, ReadingsResponse};
use crate::password::PasswordService;
use crate::repository::{GroupRepository, ReadingRepository, SensorRepository};
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;
use uuid::Uuid;

pub const DEFAULT_READINGS_LIMIT: i64 = 100;
pub const MAX_READINGS_LIMIT: i64 = 1000;

/// Handles shared by every request. Nothing in here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub sensors: Arc<dyn SensorRepository>,
    pub readings: Arc<dyn ReadingRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub passwords: Arc<dyn PasswordService>,
    pub ingest: Arc<IngestService>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        sensors: Arc<dyn SensorRepository>,
        readings: Arc<dyn ReadingRepository>,
        groups: Arc<dyn GroupRepository>,
        passwords: Arc<dyn PasswordService>,
        jwt_secret: &str,
    ) -> Self {
        let ingest = Arc::new(IngestService::new(
            sensors.clone(),
            readings.clone(),
            passwords.clone(),
        ));

        Self {
            sensors,
            readings,
            groups,
            passwords,
            ingest,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    limit: Option<i64>,
}

impl ReadingsQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_READINGS_LIMIT)
            .clamp(1, MAX_READINGS_LIMIT)
    }
}

/// `Json` body whose rejections are reported as `{ "error": ... }` with 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub fn create_router(state: AppState) -> Router {
    let dashboard_routes = Router::new()
        .route(
            "/api/sensors",
            post(dashboard::create_sensor).get(dashboard::list_sensors),
        )
        .route(
            "/api/sensors/:id",
            get(dashboard::get_sensor).patch(dashboard::update_sensor),
        )
        .route("/api/sensors/:id/readings", get(dashboard::list_readings))
        .route(
            "/api/groups",
            post(dashboard::create_group).get(dashboard::list_groups),
        )
        .route(
            "/api/groups/:id",
            get(dashboard::get_group).patch(dashboard::rename_group),
        )
        .route(
            "/api/groups/:id/sensors",
            get(dashboard::list_group_sensors).post(dashboard::add_group_sensor),
        )
        .route("/api/dashboard", get(dashboard::summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    Router::new()
        .route("/api/sensor", post(ingest_reading))
        .route("/api/public/sensors/:id", get(public_sensor))
        .route("/api/public/sensors/:id/readings", get(public_readings))
        .merge(dashboard_routes)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn ingest_reading(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.ingest.ingest(&body).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Sensor data added successfully" })),
    ))
}

async fn public_sensor(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ReadingsQuery>,
) -> Result<Json<PublicSensorResponse>, ApiError> {
    let sensor = state
        .sensors
        .get_public_sensor(id)
        .await?
        .ok_or(ApiError::NotFound("Sensor not found"))?;
    let readings = state.readings.list_readings(sensor.id, params.limit()).await?;

    Ok(Json(PublicSensorResponse { sensor, readings }))
}

async fn public_readings(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ReadingsQuery>,
) -> Result<Json<ReadingsResponse>, ApiError> {
    let sensor = state
        .sensors
        .get_public_sensor(id)
        .await?
        .ok_or(ApiError::NotFound("Sensor not found"))?;

    let limit = params.limit();
    let readings = state.readings.list_readings(sensor.id, limit).await?;

    Ok(Json(ReadingsResponse {
        total: readings.len(),
        data: readings,
        limit,
    }))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Unexpected error: handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "An unexpected error occurred" })),
    )
        .into_response()
}

#[derive(Debug)]
pub enum ApiError {
    Ingest(IngestError),
    BadRequest(String),
    Unauthorized,
    NotFound(&'static str),
    Internal(Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ingest(IngestError::Validation(details)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request body", "details": details }),
            ),
            ApiError::Ingest(IngestError::InvalidApiKey) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid API key" }),
            ),
            ApiError::Ingest(IngestError::InvalidPassword) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid password" }),
            ),
            ApiError::Ingest(IngestError::Storage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to insert sensor reading" }),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Internal(e) => {
                error!("API error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An unexpected error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self::Ingest(err)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
