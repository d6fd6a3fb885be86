//! Business counters exported in Prometheus text format at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter, TextEncoder};

lazy_static! {
    pub static ref CHECKOUTS_TOTAL: IntCounter = register_int_counter!(
        "checkouts_total",
        "Total number of successfully committed checkouts"
    )
    .expect("metric can be created");
    pub static ref CHECKOUT_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "checkout_failures_total",
        "Total number of checkout attempts that failed and rolled back"
    )
    .expect("metric can be created");
    pub static ref ORDERS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "orders_created_total",
        "Total number of per-seller orders created by checkouts"
    )
    .expect("metric can be created");
    pub static ref ORDER_TRANSITIONS_TOTAL: IntCounter = register_int_counter!(
        "order_transitions_total",
        "Total number of successful order status transitions"
    )
    .expect("metric can be created");
    pub static ref ORDER_TRANSITION_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "order_transition_failures_total",
        "Total number of rejected order status transitions"
    )
    .expect("metric can be created");
}

/// Renders the default registry in Prometheus text exposition format.
pub fn export() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&prometheus::gather())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_and_export() {
        let before = CHECKOUTS_TOTAL.get();
        CHECKOUTS_TOTAL.inc();
        assert_eq!(CHECKOUTS_TOTAL.get(), before + 1);

        let body = export().unwrap();
        assert!(body.contains("checkouts_total"));
    }
}
