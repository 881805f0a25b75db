use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CrmError;

/// Outcome of one outbound HTTP attempt, kept for the diagnostic trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAttempt {
    pub ok: bool,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub url: String,
    pub base_url: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Normalized data plus every URL tried to produce it.
#[derive(Debug, Clone, Serialize)]
pub struct Lookup<T> {
    pub data: T,
    pub attempts: Vec<FetchAttempt>,
}

impl<T> Lookup<T> {
    pub fn attempted_urls(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.url.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetail {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub timezone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    /// The provider's record as received.
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomValue {
    pub id: String,
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_key: Option<String>,
}

fn text(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Pull the first array found under `keys`, or the payload itself if it is
/// an array.
fn records<'a>(payload: &'a Value, keys: &[&str], what: &str) -> Result<&'a [Value], CrmError> {
    if let Value::Array(items) = payload {
        return Ok(items);
    }
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .ok_or_else(|| {
            CrmError::Normalization(format!(
                "expected {what} under one of {keys:?}, got {}",
                kind_of(payload)
            ))
        })
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object without them",
    }
}

impl LocationSummary {
    pub fn from_json(v: &Value) -> Option<Self> {
        Some(Self {
            id: text(v, &["id", "_id"])?,
            name: text(v, &["name"]).unwrap_or_default(),
            email: text(v, &["email"]),
            phone: text(v, &["phone"]),
            city: text(v, &["city"]),
            state: text(v, &["state"]),
            country: text(v, &["country"]),
        })
    }
}

impl LocationDetail {
    pub fn from_json(v: &Value) -> Option<Self> {
        Some(Self {
            id: text(v, &["id", "_id"])?,
            name: text(v, &["name"]).unwrap_or_default(),
            email: text(v, &["email"]),
            phone: text(v, &["phone"]),
            website: text(v, &["website"]),
            timezone: text(v, &["timezone"]),
            address: text(v, &["address"]),
            city: text(v, &["city"]),
            state: text(v, &["state"]),
            postal_code: text(v, &["postalCode", "postal_code"]),
            country: text(v, &["country"]),
            raw: v.clone(),
        })
    }
}

impl CustomValue {
    pub fn from_json(v: &Value) -> Option<Self> {
        let value = match v.get("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        Some(Self {
            id: text(v, &["id", "_id"])?,
            name: text(v, &["name"]).unwrap_or_default(),
            value,
            field_key: text(v, &["fieldKey", "field_key"]),
        })
    }
}

/// An absent payload (empty or unparseable body) yields no locations.
pub fn normalize_locations(payload: Option<&Value>) -> Result<Vec<LocationSummary>, CrmError> {
    let Some(payload) = payload else {
        return Ok(Vec::new());
    };
    Ok(records(payload, &["locations"], "a location list")?
        .iter()
        .filter_map(LocationSummary::from_json)
        .collect())
}

pub fn normalize_location(payload: Option<&Value>) -> Result<Option<LocationDetail>, CrmError> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let record = match payload.get("location") {
        Some(inner @ Value::Object(_)) => inner,
        _ => payload,
    };
    if !record.is_object() {
        return Err(CrmError::Normalization(format!(
            "expected a location object, got {}",
            kind_of(record)
        )));
    }
    LocationDetail::from_json(record)
        .map(Some)
        .ok_or_else(|| CrmError::Normalization("location record has no id".to_string()))
}

pub fn normalize_custom_values(payload: Option<&Value>) -> Result<Vec<CustomValue>, CrmError> {
    let Some(payload) = payload else {
        return Ok(Vec::new());
    };
    Ok(records(
        payload,
        &["customValues", "custom_values", "values"],
        "custom values",
    )?
    .iter()
    .filter_map(CustomValue::from_json)
    .collect())
}
