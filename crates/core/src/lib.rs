#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod time;

pub use error::Error;
pub use time::{Clock, Countdown, TickOutcome, QUESTION_TIME_LIMIT_SECS};
