use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use parking_lot::Mutex;
use lazy_static::lazy_static;

pub const SCAN_REQUESTS: &str = "scan_requests_total";
pub const SCAN_PAGES: &str = "scan_pages_total";
pub const SCAN_FAILURES: &str = "scan_failures_total";
pub const CALLBACK_INVOCATIONS: &str = "callback_invocations_total";
pub const CALLBACK_FAILURES: &str = "callback_failures_total";
pub const SCANS_IN_FLIGHT: &str = "scans_in_flight";

/// Metrics registry (simple, Prometheus-style)
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<Mutex<BTreeMap<String, u64>>>,
    gauges: Arc<Mutex<BTreeMap<String, f64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1);
    }

    pub fn add_counter(&self, name: &str, n: u64) {
        let mut counters = self.counters.lock();
        *counters.entry(name.to_string()).or_insert(0) += n;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn add_gauge(&self, name: &str, delta: f64) {
        *self.gauges.lock().entry(name.to_string()).or_insert(0.0) += delta;
    }

    pub fn gauge(&self, name: &str) -> f64 {
        self.gauges.lock().get(name).copied().unwrap_or(0.0)
    }

    /// Raise `name` by one until the returned guard is dropped.
    pub fn track<'a>(&'a self, name: &'static str) -> GaugeGuard<'a> {
        self.add_gauge(name, 1.0);
        GaugeGuard { registry: self, name }
    }

    pub fn snapshot(&self) -> (BTreeMap<String, u64>, BTreeMap<String, f64>) {
        (self.counters.lock().clone(), self.gauges.lock().clone())
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let (counters, gauges) = self.snapshot();
        let mut out = String::new();
        for (name, v) in counters {
            let _ = writeln!(out, "# TYPE keyscan_{} counter", name);
            let _ = writeln!(out, "keyscan_{} {}", name, v);
        }
        for (name, v) in gauges {
            let _ = writeln!(out, "# TYPE keyscan_{} gauge", name);
            let _ = writeln!(out, "keyscan_{} {}", name, v);
        }
        out
    }
}

/// Undoes one `MetricsRegistry::track` on drop, including when the owning future is cancelled.
pub struct GaugeGuard<'a> {
    registry: &'a MetricsRegistry,
    name: &'static str,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.registry.add_gauge(self.name, -1.0);
    }
}

lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}
