//! Prometheus counters for serialize calls and `tracing` span helpers.
//!
//! Both halves are feature gated: `metrics` for the counters, `tracing` for
//! the spans.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<FluxMetrics> = Lazy::new(FluxMetrics::init);

#[cfg(feature = "metrics")]
pub struct FluxMetrics {
    /// `None` when the Prometheus exporter could not be built
    pub provider: Option<SdkMeterProvider>,
    pub serialize_total: Counter<u64>,
    pub fetch_batches_total: Counter<u64>,
    pub entities_serialized_total: Counter<u64>,
    pub serialize_duration: Histogram<f64>,
    pub traversal_depth: Histogram<u64>,
}

#[cfg(feature = "metrics")]
impl FluxMetrics {
    pub fn init() -> Self {
        // The exporter feeds the default prometheus registry read by `gather_text`
        let provider = match opentelemetry_prometheus::exporter().build() {
            Ok(exporter) => {
                let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                global::set_meter_provider(provider.clone());
                Some(provider)
            }
            Err(e) => {
                log::warn!("Failed to build prometheus exporter: {e}");
                None
            }
        };
        let meter = global::meter("flux_serializer");

        let serialize_total = meter.u64_counter("flux_serialize_total")
            .with_description("Serialize calls completed").build();

        let fetch_batches_total = meter.u64_counter("flux_fetch_batches_total")
            .with_description("Batched per-type entity fetches").build();

        let entities_serialized_total = meter.u64_counter("flux_entities_serialized_total")
            .with_description("Entities written to normalized output").build();

        let serialize_duration = meter.f64_histogram("flux_serialize_duration_seconds")
            .with_description("Duration of discover + assemble").build();

        let traversal_depth = meter.u64_histogram("flux_traversal_depth")
            .with_description("Deepest relationship level reached per call").build();

        Self {
            provider,
            serialize_total,
            fetch_batches_total,
            entities_serialized_total,
            serialize_duration,
            traversal_depth,
        }
    }

    pub fn record_serialize(&self, elapsed: std::time::Duration, entities: usize, depth: usize) {
        self.serialize_total.add(1, &[]);
        self.serialize_duration.record(elapsed.as_secs_f64(), &[]);
        self.entities_serialized_total.add(entities as u64, &[]);
        self.traversal_depth.record(depth as u64, &[]);
    }

    pub fn record_fetch_batch(&self) {
        self.fetch_batches_total.add(1, &[]);
    }
}

/// Render the default Prometheus registry in text exposition format.
#[cfg(feature = "metrics")]
pub fn gather_text() -> Result<String, crate::error::FluxError> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| crate::error::FluxError::Configuration(format!("failed to encode metrics: {e}")))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::error::FluxError::Configuration(format!("metrics are not UTF-8: {e}")))
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn serialize_span(root: &str, ids: usize) -> Span {
        info_span!("flux.serialize", root = root, ids = ids)
    }

    pub fn discover_span(api_name: &str, level: usize, ids: usize) -> Span {
        info_span!("flux.discover", api_name = api_name, level = level, ids = ids)
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("flux.query", db.statement = query)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recording_does_not_panic() {
        METRICS.record_serialize(Duration::from_millis(3), 12, 2);
        METRICS.record_fetch_batch();
        assert!(gather_text().is_ok());
    }
}
