//! Event-type aggregation.
//!
//! The [`Aggregator`] owns a [`Tally`] and folds events into it one at a time,
//! returning a fresh [`Snapshot`] after every update.

use crate::config::AggregatorConfig;
use crate::error::{OverflowWarning, ParseError};
use crate::models::{Event, Snapshot, Tally};
use tracing::{debug, warn};

/// Running counter of event types.
///
/// `process` takes `&mut self`; callers sharing one aggregator across
/// producers go through [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    tally: Tally,
    max_count: u64,
    events_seen: u64,
    warnings: Vec<OverflowWarning>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Create an aggregator with an empty tally and no practical bound.
    pub fn new() -> Self {
        Self::with_max_count(u64::MAX)
    }

    /// Create an aggregator whose counts saturate at `max_count`.
    pub fn with_max_count(max_count: u64) -> Self {
        Self {
            tally: Tally::new(),
            max_count,
            events_seen: 0,
            warnings: Vec::new(),
        }
    }

    /// Create an aggregator from the `[aggregator]` config section.
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self::with_max_count(config.effective_max_count())
    }

    /// Decode one raw record, count it and return the updated snapshot.
    ///
    /// A record that fails to decode leaves the tally untouched.
    pub fn process(&mut self, raw: impl AsRef<[u8]>) -> Result<Snapshot, ParseError> {
        let event = Event::decode(raw)?;
        Ok(self.apply(&event))
    }

    /// Count an already decoded event and return the updated snapshot.
    pub fn apply(&mut self, event: &Event) -> Snapshot {
        self.events_seen = self.events_seen.saturating_add(1);

        match event.kind() {
            Some(kind) => {
                if !self.tally.increment(kind, self.max_count) {
                    let warning = OverflowWarning {
                        kind: kind.to_string(),
                        max_count: self.max_count,
                    };
                    warn!("{}", warning);
                    self.warnings.push(warning);
                }
            }
            None => debug!("Event has no type, tally unchanged"),
        }

        self.tally.snapshot()
    }

    /// Drain the overflow warnings raised since the last call.
    pub fn take_warnings(&mut self) -> Vec<OverflowWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Snapshot of the current tally without processing anything.
    pub fn snapshot(&self) -> Snapshot {
        self.tally.snapshot()
    }

    /// Current count for one event type.
    pub fn count(&self, kind: &str) -> u64 {
        self.tally.get(kind)
    }

    /// Number of successfully decoded events, typed or not.
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// The bound counts saturate at.
    pub fn max_count(&self) -> u64 {
        self.max_count
    }
}
