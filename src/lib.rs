//! Event Tally - streaming event-type aggregation
//!
//! Decodes a stream of JSON event records, keeps a running count per event
//! `type` and produces a snapshot of every count after each record.
//!
//! [`Aggregator`] is the synchronous core. [`Pipeline`] wraps one aggregator
//! in a tokio task fed by bounded channels so that any number of producers
//! can share it while records are still processed one at a time.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod telemetry;

pub use aggregator::Aggregator;
pub use config::Config;
pub use error::{OverflowWarning, ParseError, PipelineClosed};
pub use models::{Event, Snapshot, Tally};
pub use pipeline::{Pipeline, PipelineHandle, PipelineReport, PipelineStats, RecordSender};
