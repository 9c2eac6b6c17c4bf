//! Collector server: accepts metric updates over HTTP, keeps them in a
//! [`tally_storage::MetricStore`] and mirrors them to a file or database.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod persistence;
pub mod state;
