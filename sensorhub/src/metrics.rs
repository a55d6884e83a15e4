use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref INGEST_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensorhub_ingest_requests_total",
        "Total ingestion requests received"
    ))
    .unwrap();
    pub static ref READINGS_STORED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensorhub_readings_stored_total",
        "Total sensor readings stored"
    ))
    .unwrap();
    pub static ref VALIDATION_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensorhub_validation_failures_total",
        "Total ingestion requests rejected as malformed"
    ))
    .unwrap();
    pub static ref AUTH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensorhub_auth_failures_total",
        "Total ingestion requests rejected for bad API key or password"
    ))
    .unwrap();
    pub static ref STORAGE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "sensorhub_storage_failures_total",
        "Total reading inserts that failed after authentication"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "sensorhub_ingest_latency_seconds",
            "Time taken to authenticate and store one reading"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(INGEST_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_STORED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALIDATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORAGE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGEST_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
