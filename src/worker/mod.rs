//! The QA generation worker.
//!
//! - [`admission`]: process-wide cap on tasks in flight
//! - [`pipeline`]: runs one claimed task to an outcome
//! - [`classify`]: permanent versus transient failures
//! - [`supervisor`]: drain loops, triggers and the long-running supervisor

pub mod admission;
pub mod classify;
pub mod pipeline;
pub mod supervisor;

pub use admission::{AdmissionCounter, AdmissionPermit};
pub use classify::{classify, FailureClass};
pub use pipeline::{Collaborators, NextStep, QaPipeline, TaskOutcome};
pub use supervisor::{DrainSummary, QaWorker};
