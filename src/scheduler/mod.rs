//! Single-worker cooperative task scheduler.
//!
//! Any thread may hand a [`ScheduledTask`] to [`TaskScheduler::schedule`];
//! the tasks run one at a time, in the order they were accepted, on a
//! dedicated worker thread.  Event listeners that touch shared state defer
//! into this context so they never interleave.
//!
//! ```rust,no_run
//! use ami_runtime::config::SchedulerConfig;
//! use ami_runtime::scheduler::{ScheduledTask, TaskScheduler};
//!
//! let scheduler = TaskScheduler::new(&SchedulerConfig::default());
//! scheduler.start().unwrap();
//! scheduler
//!     .schedule(ScheduledTask::new("greet", async {
//!         println!("hello from the worker");
//!         Ok(())
//!     }))
//!     .unwrap();
//! scheduler.stop();
//! ```

pub mod task;
pub mod worker;

pub use task::{ScheduledTask, TaskFuture};
pub use worker::{ScheduleError, SchedulerError, TaskScheduler};
