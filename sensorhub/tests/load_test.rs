use reqwest::StatusCode;
use serde_json::json;
use std::env;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Target instance and a registered sensor's credentials.
struct Target {
    url: String,
    api_key: String,
    password: String,
}

impl Target {
    fn from_env() -> Self {
        Self {
            url: env::var("SENSORHUB_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/sensor".to_string()),
            api_key: env::var("SENSORHUB_API_KEY").expect("SENSORHUB_API_KEY must be set"),
            password: env::var("SENSORHUB_PASSWORD").expect("SENSORHUB_PASSWORD must be set"),
        }
    }

    fn payload(&self, i: usize) -> serde_json::Value {
        json!({
            "api_key": self.api_key,
            "password": self.password,
            "data": {
                "temperature": 15.0 + (i % 20) as f64,
                "humidity": 30.0 + (i % 50) as f64,
                "battery": 100.0 - (i % 80) as f64,
            }
        })
    }
}

#[tokio::test]
#[ignore]
async fn test_100_readings_per_second() {
    println!("\nStarting load test: 100 readings/s for 10s");

    let target = Target::from_env();
    let client = reqwest::Client::new();

    let test_duration_secs = 10;
    let target_rate = 100;
    let total = test_duration_secs * target_rate;
    let burst_size = 10;
    let delay_per_burst = Duration::from_millis((burst_size * 1000 / target_rate) as u64);

    let start = Instant::now();
    let mut created = 0;
    let mut errors = 0;

    for batch_start in (0..total).step_by(burst_size) {
        let requests = (batch_start..(batch_start + burst_size).min(total))
            .map(|i| client.post(&target.url).json(&target.payload(i)).send());

        for result in futures_join(requests).await {
            match result {
                Ok(resp) if resp.status() == StatusCode::CREATED => created += 1,
                Ok(resp) => {
                    errors += 1;
                    if errors < 10 {
                        eprintln!("Unexpected status: {}", resp.status());
                    }
                }
                Err(e) => {
                    errors += 1;
                    if errors < 10 {
                        eprintln!("Send error: {}", e);
                    }
                }
            }
        }

        sleep(delay_per_burst).await;
    }

    let duration = start.elapsed();
    let rate = created as f64 / duration.as_secs_f64();

    println!("  Created:  {}", created);
    println!("  Errors:   {}", errors);
    println!("  Duration: {:.2}s", duration.as_secs_f64());
    println!("  Rate:     {:.2} readings/s", rate);

    assert!(rate >= 80.0, "Throughput too low: {:.2} readings/s", rate);
    assert_eq!(errors, 0, "Too many errors: {}", errors);
}

#[tokio::test]
#[ignore]
async fn test_bad_password_never_stores() {
    let target = Target::from_env();
    let client = reqwest::Client::new();

    let resp = client
        .post(&target.url)
        .json(&json!({
            "api_key": target.api_key,
            "password": format!("{}-wrong", target.password),
            "data": { "temperature": 1.0 }
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid password");
}

async fn futures_join<F, T>(futures: impl Iterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}
