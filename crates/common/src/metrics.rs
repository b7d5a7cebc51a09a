use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    operator_rows_out: CounterVec,
    scalar_materializations: CounterVec,
    scalar_broadcast_reads: CounterVec,
    scalar_failures: CounterVec,
    scalar_materialize_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_operator(&self, query_id: &str, operator: &str, rows_out: u64) {
        self.inner
            .operator_rows_out
            .with_label_values(&[query_id, operator])
            .inc_by(rows_out as f64);
    }

    /// One side-input subtree finished executing (whatever the outcome).
    pub fn record_scalar_materialization(&self, query_id: &str, alias: &str, secs: f64) {
        let labels = [query_id, alias];
        self.inner
            .scalar_materializations
            .with_label_values(&labels)
            .inc();
        self.inner
            .scalar_materialize_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    /// A consumer task read a frozen scalar binding.
    pub fn record_scalar_read(&self, query_id: &str, alias: &str) {
        self.inner
            .scalar_broadcast_reads
            .with_label_values(&[query_id, alias])
            .inc();
    }

    pub fn record_scalar_failure(&self, query_id: &str, alias: &str, reason: &str) {
        self.inner
            .scalar_failures
            .with_label_values(&[query_id, alias, reason])
            .inc();
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let operator_rows_out = counter_vec(
            &registry,
            "flowq_operator_rows_out_total",
            "Output rows produced per operator",
            &["query_id", "operator"],
        );
        let scalar_materializations = counter_vec(
            &registry,
            "flowq_scalar_materializations_total",
            "Scalar side-input subtrees executed",
            &["query_id", "alias"],
        );
        let scalar_broadcast_reads = counter_vec(
            &registry,
            "flowq_scalar_broadcast_reads_total",
            "Consumer task reads of a bound scalar",
            &["query_id", "alias"],
        );
        let scalar_failures = counter_vec(
            &registry,
            "flowq_scalar_failures_total",
            "Scalar side-inputs that ended in the failed state",
            &["query_id", "alias", "reason"],
        );
        let scalar_materialize_seconds = histogram_vec(
            &registry,
            "flowq_scalar_materialize_seconds",
            "Time spent materializing a scalar side-input",
            &["query_id", "alias"],
        );

        Self {
            registry,
            operator_rows_out,
            scalar_materializations,
            scalar_broadcast_reads,
            scalar_failures,
            scalar_materialize_seconds,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}
