//! Owner-scoped sensor, reading and group management.
//!
//! Every handler runs behind [`require_user`](crate::auth::require_user) and
//! only touches rows belonging to the [`Owner`] it attached. A row owned by
//! someone else is reported exactly like a missing one.

use crate::auth::Owner;
use crate::errors::Error;
use crate::model::{
    CreateSensorRequest, CreatedSensor, DashboardSummary, Group, GroupMemberRequest,
    GroupNameRequest, NewSensor, ReadingsResponse, Sensor, SensorUpdate,
};
use crate::password::generate_api_key;
use crate::rest::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, ReadingsQuery};
use crate::validate;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;

const SENSOR_NOT_FOUND: &str = "Sensor not found";
const GROUP_NOT_FOUND: &str = "Group not found";

pub async fn create_sensor(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiJson(req): ApiJson<CreateSensorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate::sensor_name(&req.name).map_err(ApiError::BadRequest)?;
    validate::sensor_password(&req.password).map_err(ApiError::BadRequest)?;

    let passwords = state.passwords.clone();
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || passwords.hash_password(&password))
        .await
        .map_err(|e| Error::PasswordHash(e.to_string()))??;

    let sensor = state
        .sensors
        .create_sensor(NewSensor {
            user_id: owner,
            name,
            is_public: req.is_public,
            api_key: generate_api_key(),
            password_hash,
        })
        .await?;

    info!(sensor_id = %sensor.id, user_id = %owner, "Sensor created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedSensor {
            sensor_id: sensor.id,
            api_key: sensor.api_key,
        }),
    ))
}

pub async fn list_sensors(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Result<Json<Vec<Sensor>>, ApiError> {
    Ok(Json(state.sensors.list_sensors(owner).await?))
}

pub async fn get_sensor(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Sensor>, ApiError> {
    owned_sensor(&state, owner, id).await.map(Json)
}

pub async fn update_sensor(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(mut update): ApiJson<SensorUpdate>,
) -> Result<Json<Sensor>, ApiError> {
    if let Some(name) = update.name.take() {
        update.name = Some(validate::sensor_name(&name).map_err(ApiError::BadRequest)?);
    }

    let sensor = state
        .sensors
        .update_sensor(owner, id, update)
        .await?
        .ok_or(ApiError::NotFound(SENSOR_NOT_FOUND))?;

    info!(sensor_id = %sensor.id, is_public = sensor.is_public, "Sensor updated");
    Ok(Json(sensor))
}

pub async fn list_readings(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ReadingsQuery>,
) -> Result<Json<ReadingsResponse>, ApiError> {
    let sensor = owned_sensor(&state, owner, id).await?;

    let limit = params.limit();
    let readings = state.readings.list_readings(sensor.id, limit).await?;

    Ok(Json(ReadingsResponse {
        total: readings.len(),
        data: readings,
        limit,
    }))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiJson(req): ApiJson<GroupNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate::group_name(&req.name).map_err(ApiError::BadRequest)?;
    let group = state.groups.create_group(owner, name).await?;

    info!(group_id = %group.id, user_id = %owner, "Group created");
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(state.groups.list_groups(owner).await?))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Group>, ApiError> {
    owned_group(&state, owner, id).await.map(Json)
}

pub async fn rename_group(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<GroupNameRequest>,
) -> Result<Json<Group>, ApiError> {
    let name = validate::group_name(&req.name).map_err(ApiError::BadRequest)?;

    let group = state
        .groups
        .rename_group(owner, id, name)
        .await?
        .ok_or(ApiError::NotFound(GROUP_NOT_FOUND))?;

    Ok(Json(group))
}

pub async fn list_group_sensors(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Sensor>>, ApiError> {
    let group = owned_group(&state, owner, id).await?;
    Ok(Json(state.groups.list_group_sensors(group.id).await?))
}

pub async fn add_group_sensor(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<GroupMemberRequest>,
) -> Result<StatusCode, ApiError> {
    let group = owned_group(&state, owner, id).await?;
    let sensor = owned_sensor(&state, owner, req.sensor_id).await?;

    state.groups.add_sensor(group.id, sensor.id).await?;

    info!(group_id = %group.id, sensor_id = %sensor.id, "Sensor added to group");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let (sensors, groups) = tokio::try_join!(
        state.sensors.count_sensors(owner),
        state.groups.count_groups(owner)
    )?;

    Ok(Json(DashboardSummary { sensors, groups }))
}

async fn owned_sensor(state: &AppState, owner: Uuid, id: Uuid) -> Result<Sensor, ApiError> {
    state
        .sensors
        .get_sensor(owner, id)
        .await?
        .ok_or(ApiError::NotFound(SENSOR_NOT_FOUND))
}

async fn owned_group(state: &AppState, owner: Uuid, id: Uuid) -> Result<Group, ApiError> {
    state
        .groups
        .get_group(owner, id)
        .await?
        .ok_or(ApiError::NotFound(GROUP_NOT_FOUND))
}
