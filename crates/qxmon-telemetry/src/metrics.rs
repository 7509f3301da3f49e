//! Prometheus metrics for the finality monitor.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. Registration only
//! fails on duplicate metric names, a programming error that should crash
//! on first use rather than silently drop metrics.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec,
    register_int_gauge, Counter, CounterVec, Encoder, Gauge, HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Tasks accepted by the monitor.
pub static TASKS_REGISTERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qxmon_tasks_registered_total",
        "Monitor tasks accepted for polling",
        &["intent"]
    )
    .unwrap()
});

/// Registrations refused because the id was still pending.
pub static TASKS_DUPLICATE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "qxmon_tasks_duplicate_total",
        "Registrations rejected because the task id was still pending"
    )
    .unwrap()
});

/// Tasks that reached a terminal state.
/// Labels: outcome (resolved/expired/cancelled)
pub static TASKS_FINISHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qxmon_tasks_finished_total",
        "Monitor tasks that reached a terminal state",
        &["outcome"]
    )
    .unwrap()
});

/// Tasks currently pending.
pub static TASKS_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("qxmon_tasks_pending", "Monitor tasks currently pending").unwrap()
});

/// Poll iterations executed across all tasks.
pub static POLLS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("qxmon_polls_total", "Poll iterations executed").unwrap()
});

/// Inconclusive reads during polling.
/// Labels: source (tick/predicate), kind (error kind)
pub static READ_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qxmon_read_errors_total",
        "Ledger read failures treated as inconclusive",
        &["source", "kind"]
    )
    .unwrap()
});

/// Terminal callbacks that panicked.
pub static CALLBACK_PANICS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "qxmon_callback_panics_total",
        "Terminal callbacks that panicked"
    )
    .unwrap()
});

/// Wall-clock time from registration to terminal state, in milliseconds.
pub static TASK_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "qxmon_task_duration_ms",
        "Wall-clock time from registration to terminal state",
        &["outcome"],
        vec![500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0, 30000.0, 60000.0, 120000.0, 300000.0]
    )
    .unwrap()
});

/// Push-hint listener connection state (1 = connected).
pub static NOTIFY_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "qxmon_notify_connected",
        "Push-hint listener connection state (1=connected)"
    )
    .unwrap()
});

/// Push hints received.
/// Labels: event
pub static NOTIFY_HINTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qxmon_notify_hints_total",
        "State-changed hints received from the push channel",
        &["event"]
    )
    .unwrap()
});

/// Push-hint listener reconnections.
pub static NOTIFY_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qxmon_notify_reconnect_total",
        "Push-hint listener reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a task registration.
    pub fn task_registered(intent: &str) {
        TASKS_REGISTERED_TOTAL.with_label_values(&[intent]).inc();
        TASKS_PENDING.inc();
    }

    /// Record a rejected duplicate registration.
    pub fn task_duplicate() {
        TASKS_DUPLICATE_TOTAL.inc();
    }

    /// Record a task leaving Pending.
    pub fn task_finished(outcome: &str, elapsed_ms: f64) {
        TASKS_FINISHED_TOTAL.with_label_values(&[outcome]).inc();
        TASK_DURATION_MS
            .with_label_values(&[outcome])
            .observe(elapsed_ms);
        TASKS_PENDING.dec();
    }

    /// Record one poll iteration.
    pub fn poll() {
        POLLS_TOTAL.inc();
    }

    /// Record an inconclusive read.
    pub fn read_error(source: &str, kind: &str) {
        READ_ERRORS_TOTAL.with_label_values(&[source, kind]).inc();
    }

    /// Record a panicking callback.
    pub fn callback_panicked() {
        CALLBACK_PANICS_TOTAL.inc();
    }

    /// Record push listener connected.
    pub fn notify_connected() {
        NOTIFY_CONNECTED.set(1.0);
    }

    /// Record push listener disconnected.
    pub fn notify_disconnected() {
        NOTIFY_CONNECTED.set(0.0);
    }

    /// Record a push hint.
    pub fn notify_hint(event: &str) {
        NOTIFY_HINTS_TOTAL.with_label_values(&[event]).inc();
    }

    /// Record a push listener reconnection.
    pub fn notify_reconnect(reason: &str) {
        NOTIFY_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Render the default registry in Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
