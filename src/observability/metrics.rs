use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};
use crate::error::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Activation metrics
    pub static ref ACTIVATIONS_REQUESTED: IntCounterVec = IntCounterVec::new(
        Opts::new("activations_requested_total", "Total number of SOS activations requested"),
        &["trigger"]
    ).expect("valid metric definition");

    pub static ref ACTIVATIONS_CANCELLED: IntCounter = IntCounter::new(
        "activations_cancelled_total",
        "Total number of activations cancelled during the countdown"
    ).expect("valid metric definition");

    pub static ref CANCELLATIONS_REJECTED: IntCounter = IntCounter::new(
        "cancellations_rejected_total",
        "Total number of cancel requests that arrived after dispatch was committed"
    ).expect("valid metric definition");

    pub static ref DISPATCHES_STARTED: IntCounter = IntCounter::new(
        "dispatches_started_total",
        "Total number of activations committed to dispatch"
    ).expect("valid metric definition");

    pub static ref ALERTS_FINALIZED: IntCounterVec = IntCounterVec::new(
        Opts::new("alerts_finalized_total", "Total number of alerts reaching a terminal dispatch status"),
        &["status"]
    ).expect("valid metric definition");

    // Channel metrics
    pub static ref CHANNEL_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("channel_attempts_total", "Total number of delivery attempts per channel"),
        &["channel", "result"]
    ).expect("valid metric definition");

    pub static ref DUPLICATE_DELIVERIES_SUPPRESSED: IntCounterVec = IntCounterVec::new(
        Opts::new("duplicate_deliveries_suppressed_total", "Repeat deliveries answered from the idempotency cache"),
        &["channel"]
    ).expect("valid metric definition");

    // Consistency metrics
    pub static ref INVARIANT_VIOLATIONS: IntCounter = IntCounter::new(
        "invariant_violations_total",
        "Total number of rejected writes that would have broken a record invariant"
    ).expect("valid metric definition");

    // Latency metrics
    pub static ref DISPATCH_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dispatch_latency_seconds",
            "Time from dispatch commit to terminal status"
        ).buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    ).expect("valid metric definition");
}

pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVATIONS_REQUESTED.clone()),
        Box::new(ACTIVATIONS_CANCELLED.clone()),
        Box::new(CANCELLATIONS_REJECTED.clone()),
        Box::new(DISPATCHES_STARTED.clone()),
        Box::new(ALERTS_FINALIZED.clone()),
        Box::new(CHANNEL_ATTEMPTS.clone()),
        Box::new(DUPLICATE_DELIVERIES_SUPPRESSED.clone()),
        Box::new(INVARIANT_VIOLATIONS.clone()),
        Box::new(DISPATCH_LATENCY.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(Error::MetricsError(e.to_string())),
        }
    }

    Ok(())
}

/// Prometheus text exposition of every registered metric.
pub fn render() -> Result<String> {
    use prometheus::Encoder;

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::MetricsError(e.to_string()))?;

    String::from_utf8(buffer).map_err(|e| Error::MetricsError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();

        ACTIVATIONS_REQUESTED.with_label_values(&["manual"]).inc();
        let text = render().unwrap();
        assert!(text.contains("activations_requested_total"));
    }
}
