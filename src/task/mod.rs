//! Background tasks
//!
//! Long-running loops (the publisher's read loop, consumer drain loops) run
//! on dedicated OS threads wrapped in a [`BackgroundTask`]. Stop requests are
//! cooperative through a [`CancelToken`] checked at loop boundaries.

pub mod cancel;
pub mod thread;

pub use cancel::CancelToken;
pub use thread::{BackgroundTask, TaskMonitor, TaskState};
