#![forbid(unsafe_code)]

pub mod feedback_store;
pub mod repo;
