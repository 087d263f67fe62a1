//! Core translation engine module

pub mod config;
pub mod durations;
pub mod errors;
pub mod keys;
pub mod models;
pub mod notify;
pub mod queue;
pub mod sse;
pub mod storage;
pub mod transport;
pub mod usage;
