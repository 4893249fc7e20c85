//! JSON-RPC pipeline instrumentation.
//!
//! Mirrors what the node's insight collector receives: a `requests` counter,
//! `size` and `time` events per dispatched request, plus counters for each
//! class of structural, authorization and admission rejection.

use crate::domain::error::{RejectKind, RpcReject};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Running aggregate of an instrumentation event stream.
#[derive(Debug, Default)]
pub struct Event {
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

impl Event {
    pub fn notify(&self, value: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "count": self.count(),
            "sum": self.sum(),
            "max": self.max(),
            "mean": self.mean(),
        })
    }
}

/// RPC pipeline metrics
#[derive(Debug, Default)]
pub struct RpcMetrics {
    /// Dispatched requests (passed every gate)
    pub requests: AtomicU64,
    /// Response size in bytes
    pub size: Event,
    /// Dispatch latency in milliseconds
    pub time: Event,

    pub rejected_structural: AtomicU64,
    pub rejected_authorization: AtomicU64,
    pub rejected_admission: AtomicU64,
    /// Connections refused because the port was full
    pub connections_refused: AtomicU64,
}

impl RpcMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched request.
    pub fn record_request(&self, bytes: usize, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.size.notify(bytes as u64);
        self.time
            .notify(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    }

    /// Record a pipeline rejection.
    pub fn record_reject(&self, reject: &RpcReject) {
        let counter = match reject.kind() {
            RejectKind::Structural => &self.rejected_structural,
            RejectKind::Authorization => &self.rejected_authorization,
            RejectKind::Admission => &self.rejected_admission,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": self.requests(),
            "size": self.size.to_json(),
            "time": self.time.to_json(),
            "rejected": {
                "structural": self.rejected_structural.load(Ordering::Relaxed),
                "authorization": self.rejected_authorization.load(Ordering::Relaxed),
                "admission": self.rejected_admission.load(Ordering::Relaxed),
            },
            "connections_refused": self.connections_refused.load(Ordering::Relaxed),
        })
    }

    /// Export metrics in Prometheus text format
    #[cfg(feature = "metrics")]
    pub fn to_prometheus(&self) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

        let registry = Registry::new_custom(Some("rpc_gateway".to_string()), None)?;

        let requests = IntCounter::new("requests_total", "Dispatched JSON-RPC requests")?;
        requests.inc_by(self.requests());
        registry.register(Box::new(requests))?;

        let size_bytes = IntCounter::new("response_bytes_total", "Bytes of JSON-RPC responses")?;
        size_bytes.inc_by(self.size.sum());
        registry.register(Box::new(size_bytes))?;

        let size_max = IntGauge::new("response_bytes_max", "Largest JSON-RPC response")?;
        size_max.set(i64::try_from(self.size.max()).unwrap_or(i64::MAX));
        registry.register(Box::new(size_max))?;

        let time_ms = IntCounter::new("dispatch_ms_total", "Milliseconds spent dispatching")?;
        time_ms.inc_by(self.time.sum());
        registry.register(Box::new(time_ms))?;

        let time_max = IntGauge::new("dispatch_ms_max", "Slowest dispatch in milliseconds")?;
        time_max.set(i64::try_from(self.time.max()).unwrap_or(i64::MAX));
        registry.register(Box::new(time_max))?;

        let rejected = IntCounterVec::new(
            Opts::new("rejected_total", "Requests rejected before dispatch"),
            &["class"],
        )?;
        rejected
            .with_label_values(&["structural"])
            .inc_by(self.rejected_structural.load(Ordering::Relaxed));
        rejected
            .with_label_values(&["authorization"])
            .inc_by(self.rejected_authorization.load(Ordering::Relaxed));
        rejected
            .with_label_values(&["admission"])
            .inc_by(self.rejected_admission.load(Ordering::Relaxed));
        registry.register(Box::new(rejected))?;

        let refused = IntCounter::new(
            "connections_refused_total",
            "Connections dropped at a full port",
        )?;
        refused.inc_by(self.connections_refused.load(Ordering::Relaxed));
        registry.register(Box::new(refused))?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<RpcMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<RpcMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, response_bytes: usize) {
        self.metrics
            .record_request(response_bytes, self.start.elapsed());
    }
}
