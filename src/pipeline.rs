//! Channel pipeline around a single aggregator.
//!
//! The aggregator lives inside one spawned task. Producers feed it raw
//! records through a bounded channel and the task pushes one encoded snapshot
//! per decoded record into a second bounded channel. A snapshot is queued
//! before the next record is received, so output order matches input order.
//!
//! Both channels are bounded: a slow sink stalls the task, which in turn
//! stalls producers.

use crate::aggregator::Aggregator;
use crate::config::{Config, PipelineConfig};
use crate::error::PipelineClosed;
use crate::models::Snapshot;
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters describing one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Records that decoded and were counted.
    pub processed: u64,
    /// Records skipped because they failed to decode.
    pub rejected: u64,
    /// Increments that hit the counter bound.
    pub overflows: u64,
    /// Snapshots delivered to the output channel.
    pub emitted: u64,
}

/// What the pipeline task hands back when it stops.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Run counters.
    pub stats: PipelineStats,
    /// Tally at the moment the task stopped.
    pub final_snapshot: Snapshot,
}

/// Cloneable producer side of a pipeline.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<String>,
}

impl RecordSender {
    /// Queue one raw record, waiting while the input channel is full.
    pub async fn send(&self, record: impl Into<String>) -> Result<(), PipelineClosed> {
        self.tx.send(record.into()).await.map_err(|_| PipelineClosed)
    }

    /// Queue every record of a stream in order. Returns how many were sent.
    pub async fn send_all<S>(&self, records: S) -> Result<u64, PipelineClosed>
    where
        S: Stream<Item = String>,
    {
        let mut records = std::pin::pin!(records);
        let mut sent = 0u64;

        while let Some(record) = records.next().await {
            self.send(record).await?;
            sent += 1;
        }

        Ok(sent)
    }
}

/// Handle to a running pipeline task.
#[derive(Debug)]
pub struct PipelineHandle {
    sender: RecordSender,
    task: JoinHandle<PipelineReport>,
}

impl PipelineHandle {
    /// A new producer handle.
    pub fn sender(&self) -> RecordSender {
        self.sender.clone()
    }

    /// Close this handle's sender and wait for the task to finish.
    ///
    /// The task only stops once every other [`RecordSender`] is dropped too,
    /// or the snapshot receiver is dropped.
    pub async fn join(self) -> Result<PipelineReport> {
        let Self { sender, task } = self;
        drop(sender);
        task.await.context("Pipeline task failed")
    }
}

/// Spawns aggregator tasks.
pub struct Pipeline;

impl Pipeline {
    /// Spawn a task that owns `aggregator`.
    ///
    /// Returns the handle for producers and the receiver of encoded snapshots.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: &PipelineConfig,
        aggregator: Aggregator,
    ) -> (PipelineHandle, mpsc::Receiver<String>) {
        let (input_tx, input_rx) = mpsc::channel(config.input_capacity.max(1));
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity.max(1));

        info!(
            "Starting pipeline (input capacity {}, output capacity {})",
            config.input_capacity, config.output_capacity
        );

        let task = tokio::spawn(run(aggregator, input_rx, output_tx));

        let handle = PipelineHandle {
            sender: RecordSender { tx: input_tx },
            task,
        };

        (handle, output_rx)
    }

    /// Spawn a pipeline with both the aggregator and channels built from `config`.
    pub fn spawn_from_config(config: &Config) -> (PipelineHandle, mpsc::Receiver<String>) {
        Self::spawn(&config.pipeline, Aggregator::from_config(&config.aggregator))
    }
}

async fn run(
    mut aggregator: Aggregator,
    mut input: mpsc::Receiver<String>,
    output: mpsc::Sender<String>,
) -> PipelineReport {
    let mut stats = PipelineStats::default();

    while let Some(record) = input.recv().await {
        let snapshot = match aggregator.process(&record) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stats.rejected += 1;
                warn!("Skipping record: {}", e);
                continue;
            }
        };

        stats.processed += 1;
        stats.overflows += aggregator.take_warnings().len() as u64;

        if output.send(snapshot.encode()).await.is_err() {
            warn!("Snapshot receiver dropped, stopping pipeline");
            break;
        }
        stats.emitted += 1;
        debug!("Emitted snapshot #{}", stats.emitted);
    }

    info!(
        "Pipeline stopped: {} processed, {} rejected, {} overflows, {} emitted",
        stats.processed, stats.rejected, stats.overflows, stats.emitted
    );

    PipelineReport {
        stats,
        final_snapshot: aggregator.snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_config(capacity: usize) -> PipelineConfig {
        PipelineConfig {
            input_capacity: capacity,
            output_capacity: capacity,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            out.push(snapshot);
        }
        out
    }

    #[tokio::test]
    async fn test_emits_snapshots_in_order() {
        let (handle, rx) = Pipeline::spawn(&small_config(8), Aggregator::new());
        let sender = handle.sender();

        for record in [
            r#"{"type":"login"}"#,
            r#"{"type":"logout"}"#,
            r#"{"type":"login"}"#,
        ] {
            sender.send(record).await.unwrap();
        }
        drop(sender);

        let report = handle.join().await.unwrap();
        let snapshots = drain(rx).await;

        assert_eq!(
            snapshots,
            vec![
                r#"{"login":1}"#,
                r#"{"login":1,"logout":1}"#,
                r#"{"login":2,"logout":1}"#,
            ]
        );
        assert_eq!(report.stats.processed, 3);
        assert_eq!(report.stats.emitted, 3);
        assert_eq!(report.final_snapshot.get("login"), Some(2));
    }

    #[tokio::test]
    async fn test_bad_records_are_skipped() {
        let (handle, rx) = Pipeline::spawn(&small_config(8), Aggregator::new());
        let sender = handle.sender();

        sender.send(r#"{"type":"login"}"#).await.unwrap();
        sender.send("not json at all").await.unwrap();
        sender.send("{}").await.unwrap();
        sender.send(r#"{"type":"login"}"#).await.unwrap();
        drop(sender);

        let report = handle.join().await.unwrap();
        let snapshots = drain(rx).await;

        assert_eq!(
            snapshots,
            vec![r#"{"login":1}"#, r#"{"login":1}"#, r#"{"login":2}"#]
        );
        assert_eq!(
            report.stats,
            PipelineStats {
                processed: 3,
                rejected: 1,
                overflows: 0,
                emitted: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_producers_are_serialized() {
        let (handle, mut rx) = Pipeline::spawn(&small_config(4), Aggregator::new());

        let producers: Vec<_> = ["alpha", "beta", "gamma"]
            .into_iter()
            .map(|kind| {
                let sender = handle.sender();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        sender
                            .send(format!(r#"{{"type":"{kind}"}}"#))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();

        let consumer = tokio::spawn(async move {
            let mut totals = Vec::new();
            while let Some(raw) = rx.recv().await {
                totals.push(Snapshot::decode(raw).unwrap().total());
            }
            totals
        });

        for producer in producers {
            producer.await.unwrap();
        }
        let report = handle.join().await.unwrap();
        let totals = consumer.await.unwrap();

        // Every snapshot reflects exactly one more event than the one before.
        assert_eq!(totals, (1..=150).collect::<Vec<u64>>());
        assert_eq!(report.final_snapshot.get("alpha"), Some(50));
        assert_eq!(report.final_snapshot.get("beta"), Some(50));
        assert_eq!(report.final_snapshot.get("gamma"), Some(50));
    }

    #[tokio::test]
    async fn test_full_output_applies_backpressure() {
        let (handle, mut rx) = Pipeline::spawn(&small_config(1), Aggregator::new());
        let sender = handle.sender();
        let record = r#"{"type":"tick"}"#;

        // One snapshot parked in the output channel, one held by the task,
        // one record parked in the input channel.
        for _ in 0..3 {
            sender.send(record).await.unwrap();
        }

        let blocked = tokio::time::timeout(Duration::from_millis(50), sender.send(record)).await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"tick":1}"#));
        sender.send(record).await.unwrap();
        drop(sender);

        let rest = tokio::spawn(drain(rx));
        let report = handle.join().await.unwrap();
        assert_eq!(report.stats.processed, 4);
        assert_eq!(rest.await.unwrap().last().map(String::as_str), Some(r#"{"tick":4}"#));
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (handle, rx) = Pipeline::spawn(&small_config(2), Aggregator::new());
        let sender = handle.sender();
        drop(rx);

        sender.send(r#"{"type":"login"}"#).await.unwrap();
        let report = handle.join().await.unwrap();

        assert_eq!(report.stats.processed, 1);
        assert_eq!(report.stats.emitted, 0);
        assert_eq!(sender.send(r#"{"type":"login"}"#).await, Err(PipelineClosed));
    }

    #[tokio::test]
    async fn test_overflows_are_counted() {
        let mut config = Config::default();
        config.aggregator.max_count = Some(1);
        let (handle, rx) = Pipeline::spawn_from_config(&config);

        let records = futures::stream::iter(
            std::iter::repeat(r#"{"type":"login"}"#.to_string()).take(3),
        );
        let sent = handle.sender().send_all(records).await.unwrap();
        assert_eq!(sent, 3);

        let report = handle.join().await.unwrap();
        assert_eq!(report.stats.overflows, 2);
        assert_eq!(report.final_snapshot.get("login"), Some(1));
        assert_eq!(drain(rx).await, vec![r#"{"login":1}"#; 3]);
    }

    #[test]
    fn test_pipeline_on_blocking_runtime() {
        let report = tokio_test::block_on(async {
            let (handle, rx) = Pipeline::spawn(&small_config(2), Aggregator::new());
            handle.sender().send(r#"{"type":"boot"}"#).await.unwrap();
            let report = handle.join().await.unwrap();
            assert_eq!(drain(rx).await, vec![r#"{"boot":1}"#]);
            report
        });

        assert_eq!(report.stats.emitted, 1);
    }
}
