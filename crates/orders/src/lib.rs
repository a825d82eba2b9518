//! Order numbering domain module.
//!
//! Pure logic for per-store, per-day order numbers; the retrying sequencer
//! that persists them lives in the infrastructure layer.

pub mod number;
pub mod order;

pub use number::{MAX_DAILY_SEQUENCE, ORDER_NUMBER_PREFIX, OrderNumber, day_prefix};
pub use order::Order;
