//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by qa-forge and provides
//! functions for initializing, recording and exporting them. Recording before
//! [`init_metrics`] is a no-op.

use prometheus::{CounterVec, Encoder, Gauge, Histogram, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all qa-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Tasks that reached a terminal outcome, labeled by outcome.
pub static TASKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Tasks currently checked out by this process.
pub static TASKS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Chunks pushed to datasets, labeled by index kind.
pub static CHUNKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Tokens consumed by QA generation, labeled by model.
pub static LLM_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Duration of successful task runs in seconds.
pub static TASK_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Serializes concurrent calls to [`init_metrics`].
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once keeps the first set of metrics.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let tasks_total = CounterVec::new(
        Opts::new(
            "qa_forge_tasks_total",
            "QA training tasks that reached a terminal outcome",
        ),
        &["outcome"],
    )?;

    let tasks_in_flight = Gauge::new(
        "qa_forge_tasks_in_flight",
        "QA training tasks currently checked out by this process",
    )?;

    let chunks_total = CounterVec::new(
        Opts::new("qa_forge_chunks_total", "Training chunks pushed to datasets"),
        &["kind"],
    )?;

    let llm_tokens_total = CounterVec::new(
        Opts::new("qa_forge_llm_tokens_total", "Tokens consumed by QA generation"),
        &["model"],
    )?;

    let task_duration = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "qa_forge_task_duration_seconds",
            "Duration of successful QA task runs in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )?;

    registry.register(Box::new(tasks_total.clone()))?;
    registry.register(Box::new(tasks_in_flight.clone()))?;
    registry.register(Box::new(chunks_total.clone()))?;
    registry.register(Box::new(llm_tokens_total.clone()))?;
    registry.register(Box::new(task_duration.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = TASKS_TOTAL.set(tasks_total);
    let _ = TASKS_IN_FLIGHT.set(tasks_in_flight);
    let _ = CHUNKS_TOTAL.set(chunks_total);
    let _ = LLM_TOKENS_TOTAL.set(llm_tokens_total);
    let _ = TASK_DURATION.set(task_duration);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Counts one terminal task outcome.
pub fn record_task_outcome(outcome: &str) {
    if let Some(counter) = TASKS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Publishes the current in-flight count.
pub fn set_tasks_in_flight(count: usize) {
    if let Some(gauge) = TASKS_IN_FLIGHT.get() {
        gauge.set(count as f64);
    }
}

/// Counts pushed chunks of one index kind.
pub fn record_chunks(kind: &str, count: usize) {
    if let Some(counter) = CHUNKS_TOTAL.get() {
        counter.with_label_values(&[kind]).inc_by(count as f64);
    }
}

/// Counts tokens consumed by one model call.
pub fn record_tokens(model: &str, tokens: u32) {
    if let Some(counter) = LLM_TOKENS_TOTAL.get() {
        counter.with_label_values(&[model]).inc_by(f64::from(tokens));
    }
}

/// Observes the duration of a successful task run.
pub fn observe_task_duration(seconds: f64) {
    if let Some(histogram) = TASK_DURATION.get() {
        histogram.observe(seconds);
    }
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
