#![forbid(unsafe_code)]

pub mod capabilities;
pub mod config;
pub mod deferred_sync;
pub mod durable_store;
pub mod feedback_drain;
pub mod presenter;
pub mod submission_gateway;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
