//! Background scheduling for active sessions.

mod corridor;
mod service;

pub use corridor::{CorridorPoint, extract_corridor};
pub use service::{ProcessError, SchedulerHandle, SchedulerOptions, SessionScheduler, TickReport};
