use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metric name to numeric value, as submitted by a device.
pub type Metrics = BTreeMap<String, f64>;

/// A registered sensor as shown to its owner. The password hash is only
/// loaded through [`SensorCredentials`].
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Sensor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub is_public: bool,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subset of a sensor needed to authenticate an ingestion call.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SensorCredentials {
    pub id: Uuid,
    pub password_hash: String,
}

/// Public view of a sensor shared with anyone.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicSensor {
    pub id: Uuid,
    pub name: String,
}

/// One timestamped bundle of metrics for a sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub data: Metrics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A structurally valid ingestion request.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub api_key: String,
    pub password: String,
    pub data: Metrics,
}

/// Everything needed to insert a sensor row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensor {
    pub user_id: Uuid,
    pub name: String,
    pub is_public: bool,
    pub api_key: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorUpdate {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSensorRequest {
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedSensor {
    pub sensor_id: Uuid,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupNameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMemberRequest {
    pub sensor_id: Uuid,
}

/// REST response wrapper for reading queries
#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub data: Vec<SensorReading>,
    pub total: usize,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct PublicSensorResponse {
    pub sensor: PublicSensor,
    pub readings: Vec<SensorReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub sensors: i64,
    pub groups: i64,
}
