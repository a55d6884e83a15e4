use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Body accepted by the SensorHub ingestion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Submission<'a> {
    pub api_key: &'a str,
    pub password: &'a str,
    pub data: BTreeMap<&'static str, f64>,
}

/// One plausible environment sample with occasional outliers.
pub fn generate_metrics(rng: &mut impl Rng) -> BTreeMap<&'static str, f64> {
    let temperature = if rng.gen_bool(0.05) {
        rng.gen_range(-50.0..100.0) // 5% outliers
    } else {
        rng.gen_range(15.0..35.0)
    };

    let humidity = if rng.gen_bool(0.05) {
        rng.gen_range(0.0..100.0)
    } else {
        rng.gen_range(30.0..80.0)
    };

    let battery = if rng.gen_bool(0.02) {
        rng.gen_range(0.0..20.0) // 2% low battery
    } else {
        rng.gen_range(20.0..100.0)
    };

    BTreeMap::from([
        ("temperature", round2(temperature)),
        ("humidity", round2(humidity)),
        ("battery", round2(battery)),
    ])
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
