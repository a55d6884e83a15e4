use crate::errors::Result;
use crate::model::{Group, Metrics, NewSensor, PublicSensor, Sensor, SensorCredentials, SensorReading, SensorUpdate};
use crate::repository::{GroupRepository, ReadingRepository, SensorRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SENSOR_COLUMNS: &str = "id, user_id, name, is_public, api_key, created_at, updated_at";

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed implementation of every repository trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: Uuid,
    sensor_id: Uuid,
    data: Json<Metrics>,
    timestamp: DateTime<Utc>,
}

impl From<ReadingRow> for SensorReading {
    fn from(row: ReadingRow) -> Self {
        Self {
            id: row.id,
            sensor_id: row.sensor_id,
            data: row.data.0,
            timestamp: row.timestamp,
        }
    }
}

#[async_trait]
impl SensorRepository for PgStore {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<SensorCredentials>> {
        let credentials = sqlx::query_as::<_, SensorCredentials>(
            "SELECT id, password_hash FROM sensors WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credentials)
    }

    async fn create_sensor(&self, sensor: NewSensor) -> Result<Sensor> {
        let query = format!(
            "INSERT INTO sensors (id, user_id, name, is_public, api_key, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            SENSOR_COLUMNS
        );

        let created = sqlx::query_as::<_, Sensor>(&query)
            .bind(Uuid::new_v4())
            .bind(sensor.user_id)
            .bind(&sensor.name)
            .bind(sensor.is_public)
            .bind(&sensor.api_key)
            .bind(&sensor.password_hash)
            .fetch_one(&self.pool)
            .await?;

        debug!(sensor_id = %created.id, "Inserted sensor");
        Ok(created)
    }

    async fn list_sensors(&self, owner: Uuid) -> Result<Vec<Sensor>> {
        let query = format!(
            "SELECT {} FROM sensors WHERE user_id = $1 ORDER BY created_at DESC",
            SENSOR_COLUMNS
        );

        let sensors = sqlx::query_as::<_, Sensor>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

        Ok(sensors)
    }

    async fn get_sensor(&self, owner: Uuid, id: Uuid) -> Result<Option<Sensor>> {
        let query = format!(
            "SELECT {} FROM sensors WHERE id = $1 AND user_id = $2",
            SENSOR_COLUMNS
        );

        let sensor = sqlx::query_as::<_, Sensor>(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sensor)
    }

    async fn update_sensor(&self, owner: Uuid, id: Uuid, update: SensorUpdate) -> Result<Option<Sensor>> {
        let query = format!(
            "UPDATE sensors
             SET name = COALESCE($3, name),
                 is_public = COALESCE($4, is_public),
                 updated_at = NOW()
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            SENSOR_COLUMNS
        );

        let sensor = sqlx::query_as::<_, Sensor>(&query)
            .bind(id)
            .bind(owner)
            .bind(update.name)
            .bind(update.is_public)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sensor)
    }

    async fn get_public_sensor(&self, id: Uuid) -> Result<Option<PublicSensor>> {
        let sensor = sqlx::query_as::<_, PublicSensor>(
            "SELECT id, name FROM sensors WHERE id = $1 AND is_public",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sensor)
    }

    async fn count_sensors(&self, owner: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sensors WHERE user_id = $1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl ReadingRepository for PgStore {
    async fn insert_reading(&self, sensor_id: Uuid, data: Metrics) -> Result<SensorReading> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            INSERT INTO sensor_readings (id, sensor_id, data)
            VALUES ($1, $2, $3)
            RETURNING id, sensor_id, data, "timestamp"
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sensor_id)
        .bind(Json(&data))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_readings(&self, sensor_id: Uuid, limit: i64) -> Result<Vec<SensorReading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, sensor_id, data, "timestamp"
            FROM sensor_readings
            WHERE sensor_id = $1
            ORDER BY "timestamp" DESC
            LIMIT $2
            "#,
        )
        .bind(sensor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SensorReading::from).collect())
    }
}

#[async_trait]
impl GroupRepository for PgStore {
    async fn create_group(&self, owner: Uuid, name: String) -> Result<Group> {
        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO sensor_groups (id, user_id, name)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, name, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(group)
    }

    async fn list_groups(&self, owner: Uuid) -> Result<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT id, user_id, name, created_at, updated_at
             FROM sensor_groups WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn get_group(&self, owner: Uuid, id: Uuid) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, user_id, name, created_at, updated_at
             FROM sensor_groups WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn rename_group(&self, owner: Uuid, id: Uuid, name: String) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "UPDATE sensor_groups SET name = $3, updated_at = NOW()
             WHERE id = $1 AND user_id = $2
             RETURNING id, user_id, name, created_at, updated_at",
        )
        .bind(id)
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn add_sensor(&self, group_id: Uuid, sensor_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO sensor_group_members (group_id, sensor_id)
             VALUES ($1, $2)
             ON CONFLICT (group_id, sensor_id) DO NOTHING",
        )
        .bind(group_id)
        .bind(sensor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_group_sensors(&self, group_id: Uuid) -> Result<Vec<Sensor>> {
        let sensors = sqlx::query_as::<_, Sensor>(
            "SELECT s.id, s.user_id, s.name, s.is_public, s.api_key, s.created_at, s.updated_at
             FROM sensors s
             JOIN sensor_group_members m ON m.sensor_id = s.id
             WHERE m.group_id = $1
             ORDER BY s.created_at DESC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sensors)
    }

    async fn count_groups(&self, owner: Uuid) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sensor_groups WHERE user_id = $1")
                .bind(owner)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
