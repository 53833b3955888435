use crate::error::BridgeError;
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shortcut_core::config::ParamType;

// ---------------------------------------------------------------------------
// StoreValue
// ---------------------------------------------------------------------------

/// A raw entry in the shared namespace.
///
/// Mirrors what a property-list store can hold for this protocol: text,
/// a number, or a native boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl StoreValue {
    /// Text read with numeric fallback, the way the generated intent reads it.
    pub fn as_text(&self) -> String {
        match self {
            StoreValue::Text(s) => s.clone(),
            StoreValue::Number(n) => format_number(*n),
            StoreValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        }
    }

    /// Numeric read. Booleans are 1/0, unparsable text is 0.
    pub fn as_f64(&self) -> f64 {
        match self {
            StoreValue::Number(n) => *n,
            StoreValue::Bool(b) => f64::from(u8::from(*b)),
            StoreValue::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn as_integer(&self) -> i64 {
        self.as_f64().trunc() as i64
    }

    /// Map a JSON value onto the store's encoding. `None` means "clear the key".
    ///
    /// Booleans become 1/0, numbers and strings are stored natively, any other
    /// structure is stored as its JSON text.
    pub fn from_json(value: &serde_json::Value) -> Result<Option<StoreValue>> {
        Ok(match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(StoreValue::Number(f64::from(u8::from(*b)))),
            serde_json::Value::Number(n) => n.as_f64().map(StoreValue::Number),
            serde_json::Value::String(s) => Some(StoreValue::Text(s.clone())),
            other => Some(StoreValue::Text(serde_json::to_string(other)?)),
        })
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        StoreValue::Text(s.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        StoreValue::Text(s)
    }
}

impl From<f64> for StoreValue {
    fn from(n: f64) -> Self {
        StoreValue::Number(n)
    }
}

impl From<bool> for StoreValue {
    fn from(b: bool) -> Self {
        StoreValue::Bool(b)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// ParamValue
// ---------------------------------------------------------------------------

pub const DATE_TAG: &str = "date";
pub const BOOLEAN_TAG: &str = "boolean";

/// A decoded invocation parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl ParamValue {
    /// Interpret a stored parameter using its optional type tag.
    ///
    /// The tag wins over the raw shape: a tagged `date` is epoch seconds and a
    /// tagged `boolean` may arrive as 0/1. Unknown tags are ignored.
    pub fn decode(raw: &StoreValue, tag: Option<&str>) -> ParamValue {
        match (tag, raw) {
            (Some(DATE_TAG), StoreValue::Number(secs)) => match timestamp_from_secs(*secs) {
                Some(ts) => ParamValue::Timestamp(ts),
                None => ParamValue::Number(*secs),
            },
            (Some(BOOLEAN_TAG), StoreValue::Bool(b)) => ParamValue::Boolean(*b),
            (Some(BOOLEAN_TAG), StoreValue::Number(n)) => ParamValue::Boolean(*n != 0.0),
            (Some(BOOLEAN_TAG), StoreValue::Text(s)) => {
                ParamValue::Boolean(matches!(s.as_str(), "1" | "true" | "YES"))
            }
            (_, StoreValue::Text(s)) => ParamValue::Text(s.clone()),
            (_, StoreValue::Number(n)) => ParamValue::Number(*n),
            (_, StoreValue::Bool(b)) => ParamValue::Boolean(*b),
        }
    }

    /// Raw value plus the tag to write next to it, if the type needs one.
    pub fn to_store(&self) -> (StoreValue, Option<&'static str>) {
        match self {
            ParamValue::Text(s) => (StoreValue::Text(s.clone()), None),
            ParamValue::Number(n) => (StoreValue::Number(*n), None),
            ParamValue::Boolean(b) => (StoreValue::Bool(*b), Some(BOOLEAN_TAG)),
            ParamValue::Timestamp(ts) => (
                StoreValue::Number(ts.timestamp_millis() as f64 / 1000.0),
                Some(DATE_TAG),
            ),
        }
    }

    /// Parse operator input (CLI `--param name=value`) as `ty`.
    pub fn parse_as(name: &str, text: &str, ty: ParamType) -> Result<ParamValue> {
        let mismatch = || BridgeError::ParameterType {
            name: name.to_string(),
            expected: ty.as_str().to_string(),
        };
        match ty {
            ParamType::String => Ok(ParamValue::Text(text.to_string())),
            ParamType::Number => text
                .trim()
                .parse::<f64>()
                .map(ParamValue::Number)
                .map_err(|_| mismatch()),
            ParamType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(ParamValue::Boolean(true)),
                "false" | "no" | "0" => Ok(ParamValue::Boolean(false)),
                _ => Err(mismatch()),
            },
            ParamType::Date => parse_date(text).map(ParamValue::Timestamp).ok_or_else(mismatch),
        }
    }

    /// Check that a decoded value fits the declared type.
    pub fn coerce(self, name: &str, ty: ParamType) -> Result<ParamValue> {
        match (ty, self) {
            (ParamType::String, v @ ParamValue::Text(_))
            | (ParamType::Number, v @ ParamValue::Number(_))
            | (ParamType::Boolean, v @ ParamValue::Boolean(_))
            | (ParamType::Date, v @ ParamValue::Timestamp(_)) => Ok(v),
            (ParamType::String, other) => Ok(ParamValue::Text(other.to_string())),
            (ParamType::Number, ParamValue::Text(s)) => Self::parse_as(name, &s, ty),
            (ParamType::Date, ParamValue::Number(secs)) => timestamp_from_secs(secs)
                .map(ParamValue::Timestamp)
                .ok_or_else(|| BridgeError::ParameterType {
                    name: name.to_string(),
                    expected: ty.as_str().to_string(),
                }),
            (_, _) => Err(BridgeError::ParameterType {
                name: name.to_string(),
                expected: ty.as_str().to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Number(n) => f.write_str(&format_number(*n)),
            ParamValue::Boolean(b) => write!(f, "{b}"),
            ParamValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
        }
    }
}

fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    text.parse::<f64>().ok().and_then(timestamp_from_secs)
}
