//! The tally agent: samples runtime and host metrics on a poll interval and
//! reports them to the collector on a report interval.

pub mod config;
pub mod handoff;
pub mod scheduler;
pub mod sender;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::AgentConfig;
pub use scheduler::Scheduler;
pub use sender::{DeliveryError, MetricSender};
