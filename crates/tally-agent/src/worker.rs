use crate::handoff::{HandoffError, HandoffSender};
use crate::sender::MetricSender;
use std::collections::HashMap;
use std::sync::Arc;
use tally_collector::{collect_all, Collector};
use tally_common::Metric;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Counter reported alongside every snapshot: completed collections since the last delivered report.
pub const POLL_COUNT: &str = "PollCount";

pub type Sample = HashMap<String, f64>;

#[derive(Debug)]
pub enum Job {
    Collect,
    Report(ReportJob),
}

/// Everything collected since the last delivered report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportJob {
    pub snapshot: Sample,
    pub poll_count: i64,
}

impl ReportJob {
    /// Gauges sorted by id, followed by the poll counter.
    pub fn metrics(&self) -> Vec<Metric> {
        let mut gauges: Vec<_> = self.snapshot.iter().collect();
        gauges.sort_by(|a, b| a.0.cmp(b.0));

        let mut metrics: Vec<Metric> = gauges
            .into_iter()
            .map(|(id, value)| Metric::gauge(id.clone(), *value))
            .collect();
        metrics.push(Metric::counter(POLL_COUNT, self.poll_count));
        metrics
    }
}

/// One member of the pool. Workers pull from a shared job queue, so each job
/// is handled by exactly one of them.
pub struct Worker {
    id: usize,
    collectors: Vec<Box<dyn Collector>>,
    sender: Arc<MetricSender>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    samples: HandoffSender<Sample>,
    results: HandoffSender<bool>,
    done: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        collectors: Vec<Box<dyn Collector>>,
        sender: Arc<MetricSender>,
        jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
        samples: HandoffSender<Sample>,
        results: HandoffSender<bool>,
        done: CancellationToken,
    ) -> Self {
        Self {
            id,
            collectors,
            sender,
            jobs,
            samples,
            results,
            done,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.done.cancelled() => break,
                job = next_job(&self.jobs) => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let keep_running = match job {
                Job::Collect => self.collect(),
                Job::Report(report) => self.report(report).await,
            };
            if !keep_running {
                break;
            }
        }

        self.samples.close();
        self.results.close();
        tracing::debug!(worker = self.id, "Worker stopped");
    }

    fn collect(&mut self) -> bool {
        let sample = collect_all(&mut self.collectors);
        tracing::debug!(worker = self.id, count = sample.len(), "Collected metrics");
        self.hand_off(&self.samples, sample, "sample")
    }

    async fn report(&self, report: ReportJob) -> bool {
        let outcome = tokio::select! {
            biased;
            _ = self.done.cancelled() => {
                tracing::info!(worker = self.id, "Shutdown during delivery, abandoning report");
                return false;
            }
            outcome = self.sender.send_report(&report) => outcome,
        };
        let delivered = match outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(worker = self.id, error = %e, "Report delivery failed");
                false
            }
        };
        self.hand_off(&self.results, delivered, "report result")
    }

    /// Returns `false` when the worker should stop: the channel is closed, or
    /// it is full and has just been closed so the scheduler fails.
    fn hand_off<T>(&self, channel: &HandoffSender<T>, value: T, what: &str) -> bool {
        match channel.send(value) {
            Ok(()) => true,
            Err(HandoffError::Closed) => {
                tracing::info!(worker = self.id, "{what} channel closed, stopping");
                false
            }
            Err(HandoffError::Full) => {
                // The scheduler keeps at most one job of each kind in flight,
                // so a full slot means its bookkeeping is broken.
                tracing::error!(worker = self.id, "{what} channel full, stopping worker pool");
                channel.close();
                false
            }
        }
    }
}

async fn next_job(jobs: &Mutex<mpsc::Receiver<Job>>) -> Option<Job> {
    jobs.lock().await.recv().await
}
