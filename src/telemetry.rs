use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;

pub struct Metrics {
    upload_counter: Counter<u64>,
    rejected_counter: Counter<u64>,
    detection_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        // TODO: opentelemetry-prometheus is deprecated upstream; swap for an
        // OTLP exporter once a collector is available.
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .unwrap();

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("image_labeler");
        global::set_meter_provider(provider);

        let upload_counter = meter
            .u64_counter("uploads_total")
            .with_description("Total number of upload requests")
            .build();

        let rejected_counter = meter
            .u64_counter("uploads_rejected_total")
            .with_description("Uploads rejected before reaching the detection provider")
            .build();

        let detection_duration = meter
            .u64_histogram("detection_duration_ms")
            .with_boundaries(latency_boundaries(25.0, 8))
            .with_description("Duration of detection provider calls in milliseconds")
            .build();

        Metrics {
            upload_counter,
            rejected_counter,
            detection_duration,
            registry,
        }
    }

    pub fn record_upload(&self) {
        self.upload_counter.add(1, &[]);
    }

    pub fn record_rejected(&self, reason: &'static str) {
        let attributes = vec![KeyValue::new("reason", reason)];
        self.rejected_counter.add(1, &attributes);
    }

    pub fn record_detection_duration(&self, duration_ms: u64, backend: &'static str) {
        let attributes = vec![KeyValue::new("backend", backend)];
        self.detection_duration.record(duration_ms, &attributes);
    }
}

/// Doubling buckets starting at `first`: network latency spans three orders
/// of magnitude, so linear steps would waste most of the buckets.
fn latency_boundaries(first: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| first * (1u64 << i) as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_double_from_the_first_bucket() {
        let got = latency_boundaries(25.0, 6);
        let expected = vec![25.0, 50.0, 100.0, 200.0, 400.0, 800.0];

        assert_eq!(got, expected);
    }
}
