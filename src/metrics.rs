//! Prometheus metrics for the admission pipeline.
//!
//! Metrics carry an `exec_id` label (unique per process) so that several
//! pre-forked workers scraping into the same job stay distinguishable.
//! Encoded by the `/metrics` HTTP handler.

use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Mutex;
use std::time::Instant;

/// Timestamps of the previous gated call, used for the idle-fraction gauge.
#[derive(Default)]
struct GateTiming {
    last_start: Option<Instant>,
    last_end: Option<Instant>,
}

pub struct Metrics {
    registry: Registry,
    exec_id: String,

    /// Denied calls (missing, invalid or exhausted tokens).
    denied_calls: CounterVec,
    /// Every response that passed the gate, by status.
    http_responses: CounterVec,
    /// Cached call count per token description. May be used for billing.
    call_count: GaugeVec,
    /// Latency of the last admitted call per endpoint.
    request_latency: GaugeVec,
    /// Fraction of wall time the gate spent idle between calls.
    gate_idle_fraction: GaugeVec,

    timing: Mutex<GateTiming>,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let exec_id = uuid::Uuid::new_v4().to_string();

        let denied_calls = CounterVec::new(
            Opts::new(
                "tackle_denied_call_count",
                "Number of unauthorised, denied calls",
            ),
            &["exec_id", "auth_desc", "caller_name"],
        )
        .expect("failed to create tackle_denied_call_count");

        let http_responses = CounterVec::new(
            Opts::new("tackle_http_responses", "HTTP responses by status"),
            &["exec_id", "auth_desc", "caller_name", "endpoint", "status"],
        )
        .expect("failed to create tackle_http_responses");

        let call_count = GaugeVec::new(
            Opts::new("tackle_api_call_count", "API call count"),
            &["exec_id", "auth_desc", "caller_name"],
        )
        .expect("failed to create tackle_api_call_count");

        let request_latency = GaugeVec::new(
            Opts::new("tackle_request_latency_seconds", "Request latency"),
            &["exec_id", "auth_desc", "caller_name", "endpoint"],
        )
        .expect("failed to create tackle_request_latency_seconds");

        let gate_idle_fraction = GaugeVec::new(
            Opts::new("tackle_gate_idle_fraction", "Gate idle fraction"),
            &["exec_id"],
        )
        .expect("failed to create tackle_gate_idle_fraction");

        registry
            .register(Box::new(denied_calls.clone()))
            .expect("failed to register tackle_denied_call_count");
        registry
            .register(Box::new(http_responses.clone()))
            .expect("failed to register tackle_http_responses");
        registry
            .register(Box::new(call_count.clone()))
            .expect("failed to register tackle_api_call_count");
        registry
            .register(Box::new(request_latency.clone()))
            .expect("failed to register tackle_request_latency_seconds");
        registry
            .register(Box::new(gate_idle_fraction.clone()))
            .expect("failed to register tackle_gate_idle_fraction");

        Self {
            registry,
            exec_id,
            denied_calls,
            http_responses,
            call_count,
            request_latency,
            gate_idle_fraction,
            timing: Mutex::new(GateTiming::default()),
        }
    }

    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub fn denied(&self, auth_desc: &str, caller_name: &str) {
        self.denied_calls
            .with_label_values(&[&self.exec_id, auth_desc, caller_name])
            .inc();
    }

    pub fn http_response(&self, auth_desc: &str, caller_name: &str, endpoint: &str, status: u16) {
        self.http_responses
            .with_label_values(&[
                &self.exec_id,
                auth_desc,
                caller_name,
                endpoint,
                &status.to_string(),
            ])
            .inc();
    }

    pub fn set_call_count(&self, auth_desc: &str, caller_name: &str, count: i64) {
        self.call_count
            .with_label_values(&[&self.exec_id, auth_desc, caller_name])
            .set(count as f64);
    }

    pub fn observe_latency(&self, auth_desc: &str, caller_name: &str, endpoint: &str, secs: f64) {
        self.request_latency
            .with_label_values(&[&self.exec_id, auth_desc, caller_name, endpoint])
            .set(secs);
    }

    /// Called on entry to the gated section. Sets the idle-fraction gauge
    /// from the gap since the previous call ended.
    pub fn admission_started(&self) {
        let now = Instant::now();
        let mut timing = self.timing.lock().unwrap_or_else(|e| e.into_inner());

        if let (Some(start), Some(end)) = (timing.last_start, timing.last_end) {
            let idle = now.duration_since(end).as_secs_f64();
            let total = now.duration_since(start).as_secs_f64();
            if total > 0.0 {
                self.gate_idle_fraction
                    .with_label_values(&[&self.exec_id])
                    .set(idle / total);
            }
        }

        timing.last_start = Some(now);
    }

    pub fn admission_finished(&self) {
        let mut timing = self.timing.lock().unwrap_or_else(|e| e.into_inner());
        timing.last_end = Some(Instant::now());
    }

    /// Encode all registered metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
