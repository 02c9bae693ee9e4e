//! Metrics module for Prometheus-based monitoring.
//!
//! Counts task outcomes, produced chunks and token usage of the QA worker,
//! and tracks how many tasks this process has checked out.
//!
//! # Example
//!
//! ```ignore
//! use qa_forge::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run the worker ...
//! let metrics_text = export_metrics();
//! ```

pub mod prometheus;

pub use prometheus::{
    export_metrics, init_metrics, observe_task_duration, record_chunks, record_task_outcome,
    record_tokens, set_tasks_in_flight,
};

pub use prometheus::{
    CHUNKS_TOTAL, LLM_TOKENS_TOTAL, REGISTRY, TASKS_IN_FLIGHT, TASKS_TOTAL, TASK_DURATION,
};
