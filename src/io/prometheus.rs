//! Prometheus text exposition for engine metrics
//!
//! Served at `GET /metrics` by the HTTP API.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", avg * count);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
///
/// Reads the lifetime histogram, so scrapes leave the periodic log report intact.
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_run_metrics(&mut output, site_id, &summary);
    write_latency_metrics(&mut output, site_id, &summary);
    write_failure_metrics(&mut output, site_id, &summary);

    output
}

fn write_run_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "roadlife_runs_total",
        "Proximity runs completed",
        MetricType::Counter,
        site,
        summary.runs_total,
    );
    write_metric(
        output,
        "roadlife_runs_failed_total",
        "Proximity runs that ended in an error",
        MetricType::Counter,
        site,
        summary.runs_failed_total,
    );
    write_metric(
        output,
        "roadlife_records_resolved_total",
        "Residence intervals measured against a road",
        MetricType::Counter,
        site,
        summary.records_resolved_total,
    );
    write_metric(
        output,
        "roadlife_records_dropped_total",
        "Residence intervals dropped as unresolved or invalid",
        MetricType::Counter,
        site,
        summary.records_dropped_total,
    );
}

fn write_latency_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_histogram(
        output,
        "roadlife_run_latency_us",
        "Proximity run latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.avg_latency_us,
    );
    write_metric(
        output,
        "roadlife_run_latency_p99_us",
        "99th percentile run latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
    write_metric(
        output,
        "roadlife_run_latency_max_us",
        "Maximum run latency",
        MetricType::Gauge,
        site,
        summary.max_latency_us,
    );
}

fn write_failure_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let name = "roadlife_run_failures_total";
    let _ = writeln!(output, "# HELP {name} Failed runs by error kind");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (kind, count) in &summary.failures_by_kind {
        let _ = writeln!(output, "{name}{{site=\"{site}\",kind=\"{kind}\"}} {count}");
    }
}
