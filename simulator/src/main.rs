mod reading;

use anyhow::{bail, Result};
use clap::Parser;
use reading::{generate_metrics, Submission};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{error, info, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Simulated sensor device posting readings to SensorHub.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Ingestion endpoint
    #[arg(long, env = "SENSORHUB_URL", default_value = "http://localhost:8080/api/sensor")]
    url: String,

    /// API key issued when the sensor was registered
    #[arg(long, env = "SENSOR_API_KEY")]
    api_key: String,

    /// Shared ingestion password chosen at registration
    #[arg(long, env = "SENSOR_PASSWORD", hide_env_values = true)]
    password: String,

    /// Milliseconds between readings
    #[arg(long, env = "INTERVAL_MS", default_value_t = 1000)]
    interval_ms: u64,

    /// Readings to send before exiting; 0 runs forever
    #[arg(long, env = "COUNT", default_value_t = 0)]
    count: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Created,
    Rejected(StatusCode),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simulator=info".into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting sensor simulator");
    info!("Endpoint: {}, interval: {}ms", args.url, args.interval_ms);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sent = 0u64;
    let mut failures = FailureStreak::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }

        let submission = Submission {
            api_key: &args.api_key,
            password: &args.password,
            data: generate_metrics(&mut rng),
        };

        let created = match send_with_retry(&client, &args.url, &submission).await {
            Ok(Outcome::Created) => {
                sent += 1;
                if sent % 100 == 0 {
                    info!("Sent {} readings", sent);
                }
                true
            }
            Ok(Outcome::Rejected(StatusCode::UNAUTHORIZED)) => {
                bail!("Sensor credentials rejected; check the API key and password");
            }
            Ok(Outcome::Rejected(status)) => {
                warn!("Reading rejected with status {}", status);
                false
            }
            Err(e) => {
                error!("Failed to send reading after {} attempts: {}", MAX_RETRIES, e);
                false
            }
        };

        if failures.record(created) {
            bail!(
                "Giving up after {} consecutive failed readings ({} sent)",
                MAX_CONSECUTIVE_FAILURES,
                sent
            );
        }

        if args.count > 0 && sent >= args.count {
            break;
        }
    }

    info!("Simulator stopped after {} readings", sent);
    Ok(())
}

/// Run of failed readings; any success resets it.
#[derive(Debug, Default)]
struct FailureStreak(u32);

impl FailureStreak {
    /// Returns true once the run reaches `MAX_CONSECUTIVE_FAILURES`.
    fn record(&mut self, success: bool) -> bool {
        if success {
            self.0 = 0;
        } else {
            self.0 += 1;
        }
        self.0 >= MAX_CONSECUTIVE_FAILURES
    }
}

/// Post one reading, retrying server errors and transport failures with
/// exponential backoff. Client errors are returned without retrying.
async fn send_with_retry(
    client: &reqwest::Client,
    url: &str,
    submission: &Submission<'_>,
) -> Result<Outcome> {
    let mut attempt = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        let err = match client.post(url).json(submission).send().await {
            Ok(resp) if resp.status() == StatusCode::CREATED => return Ok(Outcome::Created),
            Ok(resp) if !is_retryable(resp.status()) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("Server refused reading ({}): {}", status, body);
                return Ok(Outcome::Rejected(status));
            }
            Ok(resp) => anyhow::anyhow!("server error {}", resp.status()),
            Err(e) => e.into(),
        };

        if attempt >= MAX_RETRIES {
            return Err(err);
        }

        warn!(
            "Send failed (attempt {}/{}): {}. Retrying in {}ms...",
            attempt, MAX_RETRIES, err, backoff_ms
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = next_backoff(backoff_ms);
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
}

fn next_backoff(current_ms: u64) -> u64 {
    (current_ms * 2).min(MAX_BACKOFF_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_backoff_caps() {
        assert_eq!(next_backoff(100), 200);
        assert_eq!(next_backoff(1500), MAX_BACKOFF_MS);
        assert_eq!(next_backoff(MAX_BACKOFF_MS), MAX_BACKOFF_MS);
    }

    #[test]
    fn test_failure_streak_stops_and_resets() {
        let mut streak = FailureStreak::default();
        for _ in 1..MAX_CONSECUTIVE_FAILURES {
            assert!(!streak.record(false));
        }
        assert!(!streak.record(true));

        for _ in 1..MAX_CONSECUTIVE_FAILURES {
            assert!(!streak.record(false));
        }
        assert!(streak.record(false));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "simulator",
            "--api-key",
            "abc",
            "--password",
            "pw",
            "--count",
            "5",
        ])
        .unwrap();
        assert_eq!(args.api_key, "abc");
        assert_eq!(args.count, 5);
        assert_eq!(args.interval_ms, 1000);
    }
}
