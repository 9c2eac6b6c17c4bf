use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric kind as carried in the `type` field of a wire record.
///
/// # Examples
///
/// ```
/// use tally_common::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(format!("unknown metric type: {s}")),
        }
    }
}

/// A gauge reading or a counter delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

/// Formats the bare number, as served by `GET /value/{type}/{id}` and the listing.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

/// A validated metric: an id plus exactly one payload matching its kind.
///
/// Serializes to and from the wire record shape
/// `{"id": "...", "type": "gauge"|"counter", "value"?: f64, "delta"?: i64}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricRecord", into = "MetricRecord")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// The raw JSON record, before kind/payload validation.
///
/// Used directly where the payload is absent by contract, e.g. the
/// `{id, type}` body of a value lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl MetricRecord {
    /// Parses the `type` field.
    pub fn metric_kind(&self) -> Result<MetricKind, CodecError> {
        self.kind.parse().map_err(CodecError::MalformedPayload)
    }
}

impl TryFrom<MetricRecord> for Metric {
    type Error = CodecError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        if record.id.is_empty() {
            return Err(CodecError::MalformedPayload("empty metric id".to_string()));
        }
        let value = match (record.metric_kind()?, record.value, record.delta) {
            (MetricKind::Gauge, Some(v), None) => MetricValue::Gauge(v),
            (MetricKind::Counter, None, Some(d)) => MetricValue::Counter(d),
            (kind, _, _) => {
                return Err(CodecError::MalformedPayload(format!(
                    "metric {} of type {kind} must carry exactly the {} field",
                    record.id,
                    match kind {
                        MetricKind::Gauge => "value",
                        MetricKind::Counter => "delta",
                    }
                )))
            }
        };
        Ok(Metric {
            id: record.id,
            value,
        })
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        let (value, delta) = match metric.value {
            MetricValue::Gauge(v) => (Some(v), None),
            MetricValue::Counter(d) => (None, Some(d)),
        };
        MetricRecord {
            id: metric.id,
            kind: metric.value.kind().to_string(),
            value,
            delta,
        }
    }
}
