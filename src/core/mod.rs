// src/core/mod.rs

pub mod classify;
pub mod clock;
pub mod key_rotation;

pub use classify::{classify, ErrorClass};
pub use clock::{Clock, SystemClock};
pub use key_rotation::{next_healthy, next_step, FailureKind, RetryStep};
