#![forbid(unsafe_code)]

pub mod model;
pub mod progress;
pub mod time;

pub use progress::{CourseProgress, completion_percent};
pub use time::Clock;
