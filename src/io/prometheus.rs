//! Prometheus text exposition for /metrics
//!
//! Counters come from `Metrics`, per-shelf gauges from the engine's pure
//! evaluation, so a scrape never appends alerts or sweeps the ledger.

use crate::infra::metrics::{Metrics, BUCKET_BOUNDS, NUM_BUCKETS};
use crate::services::engine::ShelfEngine;
use std::fmt::Write;

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

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; NUM_BUCKETS],
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Per-shelf gauge family, one sample per shelf
fn write_shelf_gauge<F>(output: &mut String, name: &str, help: &str, site: &str, engine: &ShelfEngine, value: F)
where
    F: Fn(&crate::domain::ShelfEvaluation) -> i64,
{
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    for eval in engine.evaluate_shelves() {
        let _ = writeln!(
            output,
            "{name}{{site=\"{site}\",shelf=\"{}\",product=\"{}\"}} {}",
            eval.sensor_id,
            eval.product_name.replace('"', "'"),
            value(&eval)
        );
    }
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(engine: &ShelfEngine, site_id: &str) -> String {
    let metrics: &Metrics = engine.metrics();
    let mut output = String::with_capacity(4096);

    write_counters(&mut output, site_id, metrics);
    write_metric(
        &mut output,
        "shelf_pending_sales",
        "Sales awaiting reconciliation",
        MetricType::Gauge,
        site_id,
        engine.pending_sales() as u64,
    );
    write_metric(
        &mut output,
        "shelf_flagged_thefts",
        "Retained potential theft records",
        MetricType::Gauge,
        site_id,
        engine.flagged_thefts() as u64,
    );
    write_histogram(
        &mut output,
        "shelf_http_request_latency_us",
        "HTTP request handling latency in microseconds",
        site_id,
        &metrics.request_latency_buckets(),
    );

    write_shelf_gauge(&mut output, "shelf_stock_count", "Fused item count", site_id, engine, |e| {
        i64::from(e.estimate.count)
    });
    write_shelf_gauge(
        &mut output,
        "shelf_count_from_distance",
        "Item count from the distance sensor alone",
        site_id,
        engine,
        |e| i64::from(e.count_from_distance),
    );
    write_shelf_gauge(
        &mut output,
        "shelf_count_from_weight",
        "Item count from the force sensor alone",
        site_id,
        engine,
        |e| i64::from(e.count_from_weight),
    );
    write_shelf_gauge(&mut output, "shelf_raw_distance", "Latest distance reading", site_id, engine, |e| {
        e.distance
    });
    write_shelf_gauge(&mut output, "shelf_raw_weight", "Latest force reading", site_id, engine, |e| {
        e.weight
    });

    output
}

fn write_counters(output: &mut String, site: &str, metrics: &Metrics) {
    let counters: [(&str, &str, u64); 13] = [
        ("shelf_readings_ingested_total", "Readings stored", metrics.readings_ingested()),
        ("shelf_readings_ignored_total", "Readings for unknown sensors", metrics.readings_ignored()),
        ("shelf_frames_rejected_total", "Malformed sensor frames", metrics.frames_rejected()),
        ("shelf_sales_recorded_total", "Sales accepted", metrics.sales_recorded()),
        ("shelf_sales_rejected_total", "Sales rejected by validation", metrics.sales_rejected()),
        ("shelf_thefts_flagged_total", "Sales promoted to potential theft", metrics.thefts_flagged()),
        ("shelf_alerts_high_total", "Empty shelf alerts", metrics.alerts_high()),
        ("shelf_alerts_medium_total", "Low stock alerts", metrics.alerts_medium()),
        ("shelf_status_polls_total", "Shelf status evaluations", metrics.status_polls()),
        ("shelf_theft_sweeps_total", "Theft reconciliation sweeps", metrics.theft_sweeps()),
        ("shelf_classifier_requests_total", "Misplacement checks", metrics.classifier_requests()),
        ("shelf_classifier_failures_total", "Failed misplacement checks", metrics.classifier_failures()),
        ("shelf_http_requests_total", "HTTP requests served", metrics.http_requests()),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, site, val);
    }
}
