use crate::errors::Error;
use crate::metrics::{
    AUTH_FAILURES_TOTAL, INGEST_LATENCY_SECONDS, INGEST_REQUESTS_TOTAL, READINGS_STORED_TOTAL,
    STORAGE_FAILURES_TOTAL, VALIDATION_FAILURES_TOTAL,
};
use crate::model::SensorReading;
use crate::password::PasswordService;
use crate::repository::{ReadingRepository, SensorRepository};
use crate::validate::{validate_ingest_body, FieldIssue};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid request body")]
    Validation(Vec<FieldIssue>),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Failed to insert sensor reading: {0}")]
    Storage(#[source] Error),
}

/// Authenticates a device submission and appends its reading.
///
/// Each call does at most one write and never retries; devices own their
/// retry policy.
pub struct IngestService {
    sensors: Arc<dyn SensorRepository>,
    readings: Arc<dyn ReadingRepository>,
    passwords: Arc<dyn PasswordService>,
}

impl IngestService {
    pub fn new(
        sensors: Arc<dyn SensorRepository>,
        readings: Arc<dyn ReadingRepository>,
        passwords: Arc<dyn PasswordService>,
    ) -> Self {
        Self {
            sensors,
            readings,
            passwords,
        }
    }

    pub async fn ingest(&self, body: &[u8]) -> Result<SensorReading, IngestError> {
        INGEST_REQUESTS_TOTAL.inc();
        let start = Instant::now();

        let result = self.ingest_inner(body).await;

        match &result {
            Ok(_) => {
                READINGS_STORED_TOTAL.inc();
                INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
            }
            Err(IngestError::Validation(_)) => VALIDATION_FAILURES_TOTAL.inc(),
            Err(IngestError::InvalidApiKey | IngestError::InvalidPassword) => {
                AUTH_FAILURES_TOTAL.inc()
            }
            Err(IngestError::Storage(_)) => STORAGE_FAILURES_TOTAL.inc(),
        }

        result
    }

    async fn ingest_inner(&self, body: &[u8]) -> Result<SensorReading, IngestError> {
        let request = validate_ingest_body(body).map_err(IngestError::Validation)?;

        let sensor = match self.sensors.find_by_api_key(&request.api_key).await {
            Ok(Some(sensor)) => sensor,
            Ok(None) => return Err(IngestError::InvalidApiKey),
            Err(e) => {
                // Reported exactly like an unknown key.
                warn!("Sensor lookup failed: {}", e);
                return Err(IngestError::InvalidApiKey);
            }
        };

        // Argon2 is CPU-bound; keep it off the async workers.
        let passwords = self.passwords.clone();
        let attempt = request.password;
        let hash = sensor.password_hash.clone();
        let verified =
            tokio::task::spawn_blocking(move || passwords.verify_password(&attempt, &hash)).await;

        match verified {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Err(IngestError::InvalidPassword),
            Ok(Err(e)) => {
                warn!(sensor_id = %sensor.id, "Password verification failed: {}", e);
                return Err(IngestError::InvalidPassword);
            }
            Err(e) => {
                warn!(sensor_id = %sensor.id, "Password verification task failed: {}", e);
                return Err(IngestError::InvalidPassword);
            }
        }

        let reading = self
            .readings
            .insert_reading(sensor.id, request.data)
            .await
            .map_err(|e| {
                error!(sensor_id = %sensor.id, "Error inserting sensor reading: {}", e);
                IngestError::Storage(e)
            })?;

        debug!(sensor_id = %sensor.id, reading_id = %reading.id, "Stored sensor reading");
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metrics, SensorCredentials};
    use crate::password::MockPasswordService;
    use crate::repository::{MockReadingRepository, MockSensorRepository};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn valid_body() -> Vec<u8> {
        body(json!({
            "api_key": "key-1",
            "password": "secret",
            "data": { "temperature": 21.5 }
        }))
    }

    fn credentials(id: Uuid) -> SensorCredentials {
        SensorCredentials {
            id,
            password_hash: "$argon2id$stored".to_string(),
        }
    }

    fn reading(sensor_id: Uuid, data: Metrics) -> SensorReading {
        SensorReading {
            id: Uuid::new_v4(),
            sensor_id,
            data,
            timestamp: Utc::now(),
        }
    }

    fn service(
        sensors: MockSensorRepository,
        readings: MockReadingRepository,
        passwords: MockPasswordService,
    ) -> IngestService {
        IngestService::new(Arc::new(sensors), Arc::new(readings), Arc::new(passwords))
    }

    #[tokio::test]
    async fn test_ingest_success() {
        let sensor_id = Uuid::new_v4();
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();

        sensors
            .expect_find_by_api_key()
            .withf(|key: &str| key == "key-1")
            .times(1)
            .returning(move |_| Ok(Some(credentials(sensor_id))));
        passwords
            .expect_verify_password()
            .withf(|attempt: &str, hash: &str| attempt == "secret" && hash == "$argon2id$stored")
            .times(1)
            .returning(|_, _| Ok(true));
        readings
            .expect_insert_reading()
            .withf(move |id: &Uuid, data: &Metrics| {
                *id == sensor_id && data.get("temperature") == Some(&21.5)
            })
            .times(1)
            .returning(|id, data| Ok(reading(id, data)));

        let stored = service(sensors, readings, passwords)
            .ingest(&valid_body())
            .await
            .unwrap();

        assert_eq!(stored.sensor_id, sensor_id);
    }

    #[tokio::test]
    async fn test_invalid_body_touches_nothing() {
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();
        sensors.expect_find_by_api_key().never();
        passwords.expect_verify_password().never();
        readings.expect_insert_reading().never();

        let result = service(sensors, readings, passwords)
            .ingest(&body(json!({ "api_key": "key-1" })))
            .await;

        match result {
            Err(IngestError::Validation(issues)) => {
                let paths: Vec<_> = issues.iter().map(|i| i.path.join(".")).collect();
                assert_eq!(paths, vec!["password", "data"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_api_key() {
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();
        sensors.expect_find_by_api_key().returning(|_| Ok(None));
        passwords.expect_verify_password().never();
        readings.expect_insert_reading().never();

        let result = service(sensors, readings, passwords)
            .ingest(&valid_body())
            .await;

        assert!(matches!(result, Err(IngestError::InvalidApiKey)));
    }

    #[tokio::test]
    async fn test_lookup_error_looks_like_unknown_key() {
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let passwords = MockPasswordService::new();
        sensors
            .expect_find_by_api_key()
            .returning(|_| Err(Error::Database(sqlx::Error::PoolTimedOut)));
        readings.expect_insert_reading().never();

        let result = service(sensors, readings, passwords)
            .ingest(&valid_body())
            .await;

        assert!(matches!(result, Err(IngestError::InvalidApiKey)));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();
        sensors
            .expect_find_by_api_key()
            .returning(|_| Ok(Some(credentials(Uuid::new_v4()))));
        passwords.expect_verify_password().returning(|_, _| Ok(false));
        readings.expect_insert_reading().never();

        let result = service(sensors, readings, passwords)
            .ingest(&valid_body())
            .await;

        assert!(matches!(result, Err(IngestError::InvalidPassword)));
    }

    #[tokio::test]
    async fn test_verifier_error_looks_like_wrong_password() {
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();
        sensors
            .expect_find_by_api_key()
            .returning(|_| Ok(Some(credentials(Uuid::new_v4()))));
        passwords
            .expect_verify_password()
            .returning(|_, _| Err(Error::PasswordHash("unset".to_string())));
        readings.expect_insert_reading().never();

        let result = service(sensors, readings, passwords)
            .ingest(&valid_body())
            .await;

        assert!(matches!(result, Err(IngestError::InvalidPassword)));
    }

    #[tokio::test]
    async fn test_insert_failure_is_storage_error() {
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();
        sensors
            .expect_find_by_api_key()
            .returning(|_| Ok(Some(credentials(Uuid::new_v4()))));
        passwords.expect_verify_password().returning(|_, _| Ok(true));
        readings
            .expect_insert_reading()
            .times(1)
            .returning(|_, _| Err(Error::Database(sqlx::Error::PoolClosed)));

        let result = service(sensors, readings, passwords)
            .ingest(&valid_body())
            .await;

        assert!(matches!(result, Err(IngestError::Storage(_))));
    }

    #[tokio::test]
    async fn test_duplicate_submissions_insert_twice() {
        let sensor_id = Uuid::new_v4();
        let mut sensors = MockSensorRepository::new();
        let mut readings = MockReadingRepository::new();
        let mut passwords = MockPasswordService::new();
        sensors
            .expect_find_by_api_key()
            .times(2)
            .returning(move |_| Ok(Some(credentials(sensor_id))));
        passwords
            .expect_verify_password()
            .times(2)
            .returning(|_, _| Ok(true));
        readings
            .expect_insert_reading()
            .times(2)
            .returning(|id, data| Ok(reading(id, data)));

        let service = service(sensors, readings, passwords);
        let first = service.ingest(&valid_body()).await.unwrap();
        let second = service.ingest(&valid_body()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.data, second.data);
    }
}
