//! Persistence contracts for tasks and step audit rows.
//!
//! The engine prescribes only these traits, not a storage engine; the
//! in-memory implementations back tests and single-process deployments.

mod steps;
mod tasks;

pub use steps::{InMemoryStepStore, StepStore};
pub use tasks::{InMemoryTaskStore, TaskStore};
