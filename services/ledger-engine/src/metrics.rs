use crate::errors::LedgerError;
use crate::models::TransactionKind;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

lazy_static! {
    pub static ref LEDGER_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ledger_operations_total",
        "Credit and debit operations by outcome",
        &["kind", "outcome"]
    )
    .expect("metric can be created");

    pub static ref LEDGER_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "ledger_operation_duration_seconds",
        "Time from validation to commit or rollback",
        &["kind"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("metric can be created");

    pub static ref LEDGER_AMOUNT: HistogramVec = register_histogram_vec!(
        "ledger_amount",
        "Distribution of committed amounts",
        &["kind"],
        vec![1.0, 10.0, 100.0, 1000.0, 10000.0, 100000.0, 1000000.0]
    )
    .expect("metric can be created");
}

/// Record the outcome of one credit or debit
pub fn observe_operation<T>(
    kind: TransactionKind,
    result: &Result<T, LedgerError>,
    amount: Decimal,
    elapsed: Duration,
) {
    let outcome = match result {
        Ok(_) => "committed",
        Err(err) => err.error_type(),
    };

    LEDGER_OPERATIONS_TOTAL
        .with_label_values(&[kind.as_str(), outcome])
        .inc();
    LEDGER_OPERATION_DURATION
        .with_label_values(&[kind.as_str()])
        .observe(elapsed.as_secs_f64());

    if result.is_ok() {
        if let Some(value) = amount.to_f64() {
            LEDGER_AMOUNT.with_label_values(&[kind.as_str()]).observe(value);
        }
    }
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
