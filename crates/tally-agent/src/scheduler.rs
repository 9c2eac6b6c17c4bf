use crate::config::AgentConfig;
use crate::handoff::{self, HandoffReceiver};
use crate::sender::MetricSender;
use crate::worker::{Job, ReportJob, Sample, Worker};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tally_collector::{default_collectors, Collector};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Builds the collector set for one worker.
pub type CollectorFactory = Arc<dyn Fn() -> Vec<Box<dyn Collector>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("all workers exited")]
    WorkersGone,
    #[error("report result channel closed")]
    ResultChannelClosed,
}

/// Drives the worker pool from two tickers.
///
/// Poll ticks enqueue a collection; completed samples are merged into a
/// buffer and counted. Report ticks hand the buffer and the poll count to a
/// worker and wait for the delivery result: on success both are reset, on
/// failure they are kept and the next report retries with the accumulated data.
pub struct Scheduler {
    poll_interval: Duration,
    report_interval: Duration,
    workers: usize,
    sender: Arc<MetricSender>,
    collectors: CollectorFactory,
}

impl Scheduler {
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        Ok(Self {
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval(),
            workers: config.rate_limit.max(1),
            sender: Arc::new(MetricSender::new(config)?),
            collectors: Arc::new(default_collectors),
        })
    }

    pub fn with_collectors(
        mut self,
        factory: impl Fn() -> Vec<Box<dyn Collector>> + Send + Sync + 'static,
    ) -> Self {
        self.collectors = Arc::new(factory);
        self
    }

    pub fn with_intervals(mut self, poll: Duration, report: Duration) -> Self {
        self.poll_interval = poll;
        self.report_interval = report;
        self
    }

    pub fn with_sender(mut self, sender: MetricSender) -> Self {
        self.sender = Arc::new(sender);
        self
    }

    /// Runs until `done` is cancelled, then waits for every worker to exit.
    ///
    /// # Errors
    ///
    /// Fails if the workers disappear while the scheduler still needs them,
    /// which stops the agent.
    pub async fn run(self, done: CancellationToken) -> Result<(), SchedulerError> {
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (sample_tx, mut samples) = handoff::channel::<Sample>(1);
        let (result_tx, mut results) = handoff::channel::<bool>(1);
        let worker_done = done.child_token();

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let worker = Worker::new(
                id,
                (self.collectors)(),
                self.sender.clone(),
                job_rx.clone(),
                sample_tx.clone(),
                result_tx.clone(),
                worker_done.clone(),
            );
            workers.spawn(worker.run());
        }
        drop(sample_tx);
        drop(result_tx);

        tracing::info!(
            workers = self.workers,
            poll_ms = self.poll_interval.as_millis() as u64,
            report_ms = self.report_interval.as_millis() as u64,
            "Scheduler started"
        );

        let outcome = self.dispatch(&done, &job_tx, &mut samples, &mut results).await;

        worker_done.cancel();
        drop(job_tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        tracing::info!("Scheduler stopped");
        outcome
    }

    async fn dispatch(
        &self,
        done: &CancellationToken,
        jobs: &mpsc::Sender<Job>,
        samples: &mut HandoffReceiver<Sample>,
        results: &mut HandoffReceiver<bool>,
    ) -> Result<(), SchedulerError> {
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = interval(self.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first report is due one interval in.
        report.tick().await;

        let mut pending: Sample = HashMap::new();
        let mut poll_count: i64 = 0;
        let mut collecting = false;

        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => return Ok(()),
                sample = samples.recv() => match sample {
                    Some(sample) => {
                        pending.extend(sample);
                        poll_count += 1;
                        collecting = false;
                    }
                    None => return Err(SchedulerError::WorkersGone),
                },
                _ = report.tick() => {
                    if poll_count == 0 {
                        tracing::debug!("Nothing collected since last report, skipping");
                        continue;
                    }
                    let job = ReportJob {
                        snapshot: pending.clone(),
                        poll_count,
                    };
                    if jobs.send(Job::Report(job)).await.is_err() {
                        return Err(SchedulerError::WorkersGone);
                    }
                    let delivered = tokio::select! {
                        biased;
                        _ = done.cancelled() => return Ok(()),
                        delivered = results.recv() => delivered,
                    };
                    match delivered {
                        Some(true) => {
                            tracing::info!(metrics = pending.len(), poll_count, "Report delivered");
                            pending.clear();
                            poll_count = 0;
                        }
                        Some(false) => {
                            tracing::warn!(poll_count, "Report failed, keeping samples for next report");
                        }
                        None => {
                            tracing::error!("Report result channel closed, stopping");
                            return Err(SchedulerError::ResultChannelClosed);
                        }
                    }
                }
                _ = poll.tick() => {
                    if collecting {
                        tracing::debug!("Previous collection still running, skipping poll tick");
                        continue;
                    }
                    match jobs.try_send(Job::Collect) {
                        Ok(()) => collecting = true,
                        Err(TrySendError::Full(_)) => tracing::warn!("All workers busy, skipping poll tick"),
                        Err(TrySendError::Closed(_)) => return Err(SchedulerError::WorkersGone),
                    }
                }
            }
        }
    }
}
