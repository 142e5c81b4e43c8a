//! OTLP-shaped signal types and batch builders.
//!
//! Types follow the OTLP/JSON encoding (camelCase, nanosecond timestamps as
//! strings, hex trace and span IDs) so a batch can be serialized straight
//! onto the wire or into a debug stream.
//!
//! ```text
//! MetricsBuilder                         TracesBuilder
//!   resource attrs ──┐                     resource attrs ──┐
//!                    ▼                                      ▼
//!            scope attrs ──┐                        scope attrs ──┐
//!                          ▼                                      ▼
//!          (name, kind) -> [NumberDataPoint]                   [Span]
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form attribute map as written in scripts and timelines.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Stable textual fingerprint of an attribute map: `k=v|` per sorted key.
pub fn attribute_fingerprint(attrs: &Attributes) -> String {
    let mut id = String::new();
    for (k, v) in attrs {
        id.push_str(k);
        id.push('=');
        match v {
            serde_json::Value::String(s) => id.push_str(s),
            other => id.push_str(&other.to_string()),
        }
        id.push('|');
    }
    id
}

pub fn timestamp_nanos(ts: DateTime<Utc>) -> String {
    ts.timestamp_nanos_opt().unwrap_or(0).to_string()
}

// ============================================================================
// Attribute encoding
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: AnyValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
#[allow(non_snake_case)]
pub enum AnyValue {
    String { stringValue: String },
    Int { intValue: i64 },
    Bool { boolValue: bool },
    Double { doubleValue: f64 },
    Array { arrayValue: ArrayValue },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub values: Vec<AnyValue>,
}

impl AnyValue {
    pub fn string(s: impl Into<String>) -> Self {
        AnyValue::String {
            stringValue: s.into(),
        }
    }
    pub fn int(i: i64) -> Self {
        AnyValue::Int { intValue: i }
    }
    pub fn double(d: f64) -> Self {
        AnyValue::Double { doubleValue: d }
    }
    pub fn bool(b: bool) -> Self {
        AnyValue::Bool { boolValue: b }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::String { stringValue } => Some(stringValue),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnyValue::Double { doubleValue } => Some(*doubleValue),
            AnyValue::Int { intValue } => Some(*intValue as f64),
            _ => None,
        }
    }
}

impl From<&serde_json::Value> for AnyValue {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => AnyValue::string(s.clone()),
            serde_json::Value::Bool(b) => AnyValue::bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AnyValue::int(i),
                None => AnyValue::double(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::Array(items) => AnyValue::Array {
                arrayValue: ArrayValue {
                    values: items.iter().map(AnyValue::from).collect(),
                },
            },
            serde_json::Value::Null => AnyValue::string(""),
            other => AnyValue::string(other.to_string()),
        }
    }
}

pub fn key_values(attrs: &Attributes) -> Vec<KeyValue> {
    attrs
        .iter()
        .map(|(k, v)| KeyValue::new(k.clone(), AnyValue::from(v)))
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InstrumentationScope {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<KeyValue>,
}

// ============================================================================
// Metrics
// ============================================================================

/// OpenTelemetry metric point type produced by a metric producer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Sum,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Sum => "sum",
        }
    }
}

/// Cumulative, per the OTLP `AggregationTemporality` enum.
pub const AGGREGATION_TEMPORALITY_CUMULATIVE: i32 = 2;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsData {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl MetricsData {
    pub fn datapoint_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|r| &r.scope_metrics)
            .flat_map(|s| &s.metrics)
            .map(Metric::datapoint_count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoint_count() == 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScopeMetrics {
    pub scope: InstrumentationScope,
    pub metrics: Vec<Metric>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gauge: Option<Gauge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<Sum>,
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        if self.sum.is_some() {
            MetricKind::Sum
        } else {
            MetricKind::Gauge
        }
    }

    pub fn data_points(&self) -> &[NumberDataPoint] {
        match (&self.gauge, &self.sum) {
            (Some(g), _) => &g.data_points,
            (None, Some(s)) => &s.data_points,
            (None, None) => &[],
        }
    }

    pub fn datapoint_count(&self) -> usize {
        self.data_points().len()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: i32,
    pub is_monotonic: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    pub attributes: Vec<KeyValue>,
    pub time_unix_nano: String,
    pub as_double: f64,
}

#[derive(Default)]
struct ScopeBucket {
    attributes: Attributes,
    metrics: BTreeMap<(String, MetricKind), Vec<NumberDataPoint>>,
}

#[derive(Default)]
struct ResourceBucket {
    attributes: Attributes,
    scopes: BTreeMap<String, ScopeBucket>,
}

/// Accumulates datapoints for one tick and groups them into an OTLP batch.
#[derive(Default)]
pub struct MetricsBuilder {
    resources: BTreeMap<String, ResourceBucket>,
}

impl MetricsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_datapoint(
        &mut self,
        resource: &Attributes,
        scope: &Attributes,
        name: &str,
        kind: MetricKind,
        attributes: &Attributes,
        timestamp: DateTime<Utc>,
        value: f64,
    ) {
        let r = self
            .resources
            .entry(attribute_fingerprint(resource))
            .or_insert_with(|| ResourceBucket {
                attributes: resource.clone(),
                scopes: BTreeMap::new(),
            });
        let s = r
            .scopes
            .entry(attribute_fingerprint(scope))
            .or_insert_with(|| ScopeBucket {
                attributes: scope.clone(),
                metrics: BTreeMap::new(),
            });
        s.metrics
            .entry((name.to_string(), kind))
            .or_default()
            .push(NumberDataPoint {
                attributes: key_values(attributes),
                time_unix_nano: timestamp_nanos(timestamp),
                as_double: value,
            });
    }

    pub fn build(self) -> MetricsData {
        let resource_metrics = self
            .resources
            .into_values()
            .map(|r| ResourceMetrics {
                resource: Resource {
                    attributes: key_values(&r.attributes),
                },
                scope_metrics: r
                    .scopes
                    .into_values()
                    .map(|s| ScopeMetrics {
                        scope: InstrumentationScope {
                            name: String::new(),
                            attributes: key_values(&s.attributes),
                        },
                        metrics: s
                            .metrics
                            .into_iter()
                            .map(|((name, kind), data_points)| build_metric(name, kind, data_points))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        MetricsData { resource_metrics }
    }
}

fn build_metric(name: String, kind: MetricKind, data_points: Vec<NumberDataPoint>) -> Metric {
    match kind {
        MetricKind::Gauge => Metric {
            name,
            unit: "1".to_string(),
            gauge: Some(Gauge { data_points }),
            sum: None,
        },
        MetricKind::Sum => Metric {
            name,
            unit: "1".to_string(),
            gauge: None,
            sum: Some(Sum {
                data_points,
                aggregation_temporality: AGGREGATION_TEMPORALITY_CUMULATIVE,
                is_monotonic: false,
            }),
        },
    }
}

// ============================================================================
// Traces
// ============================================================================

/// OTLP `Span.SpanKind` values.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(into = "i32", try_from = "i32")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    /// Case-insensitive lookup; anything unknown is `Unspecified`.
    pub fn parse(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "internal" => SpanKind::Internal,
            "server" => SpanKind::Server,
            "client" => SpanKind::Client,
            "producer" => SpanKind::Producer,
            "consumer" => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        }
    }
}

impl From<SpanKind> for i32 {
    fn from(kind: SpanKind) -> i32 {
        match kind {
            SpanKind::Unspecified => 0,
            SpanKind::Internal => 1,
            SpanKind::Server => 2,
            SpanKind::Client => 3,
            SpanKind::Producer => 4,
            SpanKind::Consumer => 5,
        }
    }
}

impl TryFrom<i32> for SpanKind {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => SpanKind::Unspecified,
            1 => SpanKind::Internal,
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            other => return Err(format!("unknown span kind {other}")),
        })
    }
}

pub const STATUS_CODE_OK: i32 = 1;
pub const STATUS_CODE_ERROR: i32 = 2;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TracesData {
    pub resource_spans: Vec<ResourceSpans>,
}

impl TracesData {
    pub fn span_count(&self) -> usize {
        self.spans().count()
    }

    pub fn is_empty(&self) -> bool {
        self.span_count() == 0
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.resource_spans
            .iter()
            .flat_map(|r| &r.scope_spans)
            .flat_map(|s| &s.spans)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<Span>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_span_id: String,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<KeyValue>,
    pub status: Status,
}

#[derive(Default)]
struct SpanResourceBucket {
    attributes: Attributes,
    scopes: BTreeMap<String, (Attributes, Vec<Span>)>,
}

/// Accumulates spans for one tick, grouped by resource then scope.
#[derive(Default)]
pub struct TracesBuilder {
    resources: BTreeMap<String, SpanResourceBucket>,
}

impl TracesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_span(&mut self, resource: &Attributes, scope: &Attributes, span: Span) {
        let r = self
            .resources
            .entry(attribute_fingerprint(resource))
            .or_insert_with(|| SpanResourceBucket {
                attributes: resource.clone(),
                scopes: BTreeMap::new(),
            });
        r.scopes
            .entry(attribute_fingerprint(scope))
            .or_insert_with(|| (scope.clone(), Vec::new()))
            .1
            .push(span);
    }

    pub fn build(self) -> TracesData {
        let resource_spans = self
            .resources
            .into_values()
            .map(|r| ResourceSpans {
                resource: Resource {
                    attributes: key_values(&r.attributes),
                },
                scope_spans: r
                    .scopes
                    .into_values()
                    .map(|(attrs, spans)| ScopeSpans {
                        scope: InstrumentationScope {
                            name: String::new(),
                            attributes: key_values(&attrs),
                        },
                        spans,
                    })
                    .collect(),
            })
            .collect();
        TracesData { resource_spans }
    }
}

pub fn hex_id(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
