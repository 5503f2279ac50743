#![forbid(unsafe_code)]

pub mod common;
pub mod display;
pub mod feedback_queue;
pub mod sentiment;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, UnixTimeMs, Validate};
