#![forbid(unsafe_code)]

pub mod feedback_cli;
