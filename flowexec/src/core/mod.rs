//! Core domain types: tasks, steps, and provider results.

mod result;
mod step;
mod task;

pub use result::{ProviderResult, VendorJobId, VendorJobState};
pub use step::{StepStatus, TaskStep};
pub use task::{Task, TaskOutcome, TaskStatus};
