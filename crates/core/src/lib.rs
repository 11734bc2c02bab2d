pub mod config;
pub mod error;
pub mod task;

pub use config::{ReentryPolicy, SchedulerConfig};
pub use error::*;
pub use task::*;
