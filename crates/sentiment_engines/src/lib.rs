#![forbid(unsafe_code)]

pub mod sentiment_api;
