use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::debug;

use flutter_core::signal::{MetricsData, TracesData};
use flutter_core::{EmitContext, EmitError, Emitter, RunState};

use crate::config::OtlpDestination;

/// Statuses counted as delivered, 502 included.
pub fn is_accepted(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT | StatusCode::BAD_GATEWAY
    )
}

/// OTLP/HTTP exporter using the JSON encoding.
pub struct OtlpEmitter {
    client: Client,
    metrics_url: String,
    traces_url: String,
}

impl OtlpEmitter {
    pub fn new(dest: &OtlpDestination) -> Result<Self, EmitError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &dest.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| EmitError::Transport(format!("invalid header name {key:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| EmitError::Transport(format!("invalid value for header {key:?}: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(dest.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| EmitError::Transport(e.to_string()))?;

        let base = dest.endpoint.trim_end_matches('/');
        Ok(Self {
            client,
            metrics_url: format!("{base}/v1/metrics"),
            traces_url: format!("{base}/v1/traces"),
        })
    }

    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }

    pub fn traces_url(&self) -> &str {
        &self.traces_url
    }

    fn post<T: Serialize>(&self, url: &str, payload: &T) -> Result<(), EmitError> {
        let body = serde_json::to_vec(payload)?;
        let bytes = body.len();
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| EmitError::Transport(e.to_string()))?;

        let status = response.status();
        if is_accepted(status) {
            debug!(url, bytes, status = status.as_u16(), "batch exported");
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(EmitError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl Emitter for OtlpEmitter {
    fn name(&self) -> &str {
        "otlp"
    }

    fn emit_metrics(&mut self, ctx: &EmitContext, _state: &RunState, batch: &MetricsData) -> Result<(), EmitError> {
        ctx.check()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.post(&self.metrics_url, batch)
    }

    fn emit_traces(&mut self, ctx: &EmitContext, _state: &RunState, batch: &TracesData) -> Result<(), EmitError> {
        ctx.check()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.post(&self.traces_url, batch)
    }
}
