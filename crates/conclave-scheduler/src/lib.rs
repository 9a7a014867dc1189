//! Task scheduling for Conclave.
//!
//! [`TaskScheduler`] is the single authority over task state: creation with
//! dependency validation, assignment, progress, completion fan-out, and the
//! unblock sweep. [`SchedulerService`] wraps it in a cancelable periodic
//! loop that notifies about overdue tasks and auto-assigns available work.

pub mod scheduler;
pub mod service;

pub use scheduler::{AssignOutcome, TaskScheduler, TaskSpec, SCHEDULER_SENDER};
pub use service::SchedulerService;
