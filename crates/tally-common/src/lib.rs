//! Wire types and the transport codec shared by the tally agent and server.
//!
//! A metric travels as a JSON record (see [`types::MetricRecord`]), optionally
//! gzip-compressed and optionally signed with an HMAC-SHA256 header computed
//! over the uncompressed JSON.

pub mod codec;
pub mod error;
pub mod types;

pub use error::CodecError;
pub use types::{Metric, MetricKind, MetricRecord, MetricValue};
