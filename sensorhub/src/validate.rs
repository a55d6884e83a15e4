use crate::model::{IngestRequest, Metrics};
use serde::Serialize;
use serde_json::{Map, Value};

const SENSOR_NAME_MAX: usize = 100;
const GROUP_NAME_MAX: usize = 100;

/// A single violated field in a request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub code: &'static str,
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<&'static str>,
    pub message: String,
}

impl FieldIssue {
    fn invalid_type(path: Vec<String>, expected: &'static str, value: Option<&Value>) -> Self {
        let received = value.map_or("undefined", type_name);
        let message = match value {
            None => "Required".to_string(),
            Some(_) => format!("Expected {}, received {}", expected, received),
        };
        Self {
            code: "invalid_type",
            path,
            expected: Some(expected),
            received: Some(received),
            message,
        }
    }

    fn invalid_json(message: String) -> Self {
        Self {
            code: "invalid_json",
            path: Vec::new(),
            expected: None,
            received: None,
            message,
        }
    }
}

/// Parses and structurally validates an ingestion body.
///
/// Every violated field is reported, not just the first one. Unknown
/// top-level fields are ignored.
pub fn validate_ingest_body(body: &[u8]) -> Result<IngestRequest, Vec<FieldIssue>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| vec![FieldIssue::invalid_json(e.to_string())])?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(vec![FieldIssue::invalid_type(
                Vec::new(),
                "object",
                Some(&other),
            )])
        }
    };

    let mut issues = Vec::new();
    let api_key = string_field(&fields, "api_key", &mut issues);
    let password = string_field(&fields, "password", &mut issues);
    let data = metrics_field(&fields, "data", &mut issues);

    match (api_key, password, data) {
        (Some(api_key), Some(password), Some(data)) if issues.is_empty() => Ok(IngestRequest {
            api_key,
            password,
            data,
        }),
        _ => Err(issues),
    }
}

fn string_field(
    fields: &Map<String, Value>,
    name: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<String> {
    match fields.get(name) {
        Some(Value::String(s)) => Some(s.clone()),
        other => {
            issues.push(FieldIssue::invalid_type(vec![name.to_string()], "string", other));
            None
        }
    }
}

fn metrics_field(
    fields: &Map<String, Value>,
    name: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<Metrics> {
    let entries = match fields.get(name) {
        Some(Value::Object(entries)) => entries,
        other => {
            issues.push(FieldIssue::invalid_type(vec![name.to_string()], "object", other));
            return None;
        }
    };

    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut metrics = Metrics::new();
    let mut valid = true;
    for (key, value) in sorted {
        match value.as_f64() {
            Some(n) => {
                metrics.insert(key.clone(), n);
            }
            None => {
                valid = false;
                issues.push(FieldIssue::invalid_type(
                    vec![name.to_string(), key.clone()],
                    "number",
                    Some(value),
                ));
            }
        }
    }

    valid.then_some(metrics)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validates a sensor display name and returns it trimmed.
pub fn sensor_name(name: &str) -> Result<String, String> {
    display_name(name, "Sensor name", SENSOR_NAME_MAX)
}

/// Validates a group name and returns it trimmed.
pub fn group_name(name: &str) -> Result<String, String> {
    display_name(name, "Group name", GROUP_NAME_MAX)
}

fn display_name(name: &str, what: &str, max: usize) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(format!("{} cannot be empty", what));
    }
    if trimmed.chars().count() > max {
        return Err(format!("{} cannot exceed {} characters", what, max));
    }
    Ok(trimmed.to_string())
}

/// Validates the shared ingestion secret chosen at sensor creation.
pub fn sensor_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Sensor password cannot be empty".to_string());
    }
    Ok(())
}
