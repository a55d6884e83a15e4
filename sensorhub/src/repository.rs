use crate::errors::Result;
use crate::model::{Group, Metrics, NewSensor, PublicSensor, Sensor, SensorCredentials, SensorReading, SensorUpdate};
use async_trait::async_trait;
use uuid::Uuid;

/// Sensor storage. Every owner-taking method only sees that owner's rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorRepository: Send + Sync {
    /// Credentials of the sensor holding `api_key`, if any
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<SensorCredentials>>;

    /// Insert a sensor with its key and hash in one statement
    async fn create_sensor(&self, sensor: NewSensor) -> Result<Sensor>;

    async fn list_sensors(&self, owner: Uuid) -> Result<Vec<Sensor>>;

    async fn get_sensor(&self, owner: Uuid, id: Uuid) -> Result<Option<Sensor>>;

    /// Apply the set fields of `update`; `None` when the sensor is not the owner's
    async fn update_sensor(&self, owner: Uuid, id: Uuid, update: SensorUpdate) -> Result<Option<Sensor>>;

    /// Sensor with the public flag set; private and missing look the same
    async fn get_public_sensor(&self, id: Uuid) -> Result<Option<PublicSensor>>;

    async fn count_sensors(&self, owner: Uuid) -> Result<i64>;
}

/// Append-only reading storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    async fn insert_reading(&self, sensor_id: Uuid, data: Metrics) -> Result<SensorReading>;

    /// Latest readings first
    async fn list_readings(&self, sensor_id: Uuid, limit: i64) -> Result<Vec<SensorReading>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create_group(&self, owner: Uuid, name: String) -> Result<Group>;

    async fn list_groups(&self, owner: Uuid) -> Result<Vec<Group>>;

    async fn get_group(&self, owner: Uuid, id: Uuid) -> Result<Option<Group>>;

    async fn rename_group(&self, owner: Uuid, id: Uuid, name: String) -> Result<Option<Group>>;

    /// Idempotent: an existing membership is left as is
    async fn add_sensor(&self, group_id: Uuid, sensor_id: Uuid) -> Result<()>;

    async fn list_group_sensors(&self, group_id: Uuid) -> Result<Vec<Sensor>>;

    async fn count_groups(&self, owner: Uuid) -> Result<i64>;
}
