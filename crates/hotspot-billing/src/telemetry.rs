//! Purchase outcome counters.
//!
//! Recorded against the global `OpenTelemetry` meter when the `metrics`
//! feature is enabled; a no-op otherwise.

/// Count one purchase attempt by outcome code (`"ok"` or a
/// [`PurchaseError::code`](crate::PurchaseError::code)).
#[cfg(feature = "metrics")]
pub fn record_purchase(outcome: &'static str) {
    use std::sync::OnceLock;

    use opentelemetry::KeyValue;
    use opentelemetry::metrics::Counter;

    static PURCHASES: OnceLock<Counter<u64>> = OnceLock::new();
    PURCHASES
        .get_or_init(|| {
            opentelemetry::global::meter("hotspot-billing")
                .u64_counter("hotspot.purchases")
                .with_description("Purchase attempts by outcome")
                .build()
        })
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

#[cfg(not(feature = "metrics"))]
pub const fn record_purchase(_outcome: &'static str) {}
