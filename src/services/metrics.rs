use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    pub static ref OPERATIONS_COUNTER: CounterVec = register_counter_vec!(
        "provision_operations_total",
        "Provisioning operations by kind, zone and outcome",
        &["operation", "zone", "status"]
    ).unwrap();

    pub static ref COMPENSATIONS_COUNTER: CounterVec = register_counter_vec!(
        "provision_compensations_total",
        "Compensating statements run after a failed provisioning step",
        &["zone", "status"]
    ).unwrap();
}

/// Zone label for operations whose zone is not configured.
pub const UNKNOWN_ZONE: &str = "unknown";

pub fn record_operation(operation: &str, zone: &str, ok: bool) {
    OPERATIONS_COUNTER
        .with_label_values(&[operation, zone, status(ok)])
        .inc();
}

pub fn record_compensation(zone: &str, ok: bool) {
    COMPENSATIONS_COUNTER.with_label_values(&[zone, status(ok)]).inc();
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Prometheus text exposition of every registered metric.
pub fn gather_text() -> String {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buf) {
        tracing::warn!("encoding metrics failed: {e}");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        record_operation("create", "metrics-test", true);
        record_compensation("metrics-test", false);

        let text = gather_text();
        assert!(text.contains("provision_operations_total"));
        assert!(text.contains("provision_compensations_total"));
        assert!(
            OPERATIONS_COUNTER
                .with_label_values(&["create", "metrics-test", "ok"])
                .get()
                >= 1.0
        );
    }
}
