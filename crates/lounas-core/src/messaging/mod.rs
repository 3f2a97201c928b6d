//! Chat transport abstraction. The Telegram adapter lives in `lounas-telegram`.

pub mod port;
pub mod throttled;

#[cfg(test)]
pub(crate) mod fake;

pub use port::MessagingPort;
pub use throttled::{ThrottleConfig, ThrottledMessenger};
