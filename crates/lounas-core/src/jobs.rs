//! Cron-driven background jobs: cache prefetch and the daily cache sweep.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    cache::AggregationService,
    calendar::{Clock, DateOffset},
    cron::CronExpr,
    domain::Restaurant,
    Result,
};

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Warms the cache with the default restaurants before lunch.
pub struct PrefetchJob {
    aggregation: Arc<AggregationService>,
    restaurants: Vec<Restaurant>,
}

impl PrefetchJob {
    pub fn new(aggregation: Arc<AggregationService>, restaurants: Vec<Restaurant>) -> Self {
        Self {
            aggregation,
            restaurants,
        }
    }
}

#[async_trait]
impl ScheduledJob for PrefetchJob {
    fn name(&self) -> &str {
        "prefetch"
    }

    async fn run(&self) -> Result<()> {
        let snap = self
            .aggregation
            .get_menus(&self.restaurants, DateOffset::Today)
            .await;
        let failed = snap.data.iter().filter(|e| e.is_error()).count();
        info!(
            "Prefetched {} menu(s) for {}, {failed} failed",
            snap.data.len(),
            snap.date_key
        );
        Ok(())
    }
}

/// Drops yesterday's entries by clearing the whole cache.
pub struct CacheSweepJob {
    aggregation: Arc<AggregationService>,
}

impl CacheSweepJob {
    pub fn new(aggregation: Arc<AggregationService>) -> Self {
        Self { aggregation }
    }
}

#[async_trait]
impl ScheduledJob for CacheSweepJob {
    fn name(&self) -> &str {
        "cache-sweep"
    }

    async fn run(&self) -> Result<()> {
        self.aggregation.clear_cache().await;
        Ok(())
    }
}

struct JobEntry {
    expr: CronExpr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<JobsInner>,
}

struct JobsInner {
    clock: Arc<dyn Clock>,
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(JobsInner {
                clock,
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start `job` on `cron`. Replaces a running job with the same name.
    pub async fn add(&self, cron: &str, job: Arc<dyn ScheduledJob>) -> Result<()> {
        let expr = CronExpr::parse(cron)?;
        let name = job.name().to_string();

        let cancel = CancellationToken::new();
        let scheduler = self.clone();
        let tok = cancel.clone();
        let expr_for_task = expr.clone();
        let handle = tokio::spawn(async move {
            scheduler.job_loop(job, expr_for_task, tok).await;
        });

        let previous = self.inner.jobs.lock().await.insert(
            name.clone(),
            JobEntry {
                expr,
                cancel,
                handle,
            },
        );
        if let Some(old) = previous {
            old.cancel.cancel();
            old.handle.abort();
        }
        info!("Scheduled job {name} ({cron})");
        Ok(())
    }

    /// Job names with their next run time, sorted by name.
    pub async fn status(&self) -> Vec<(String, Option<DateTime<FixedOffset>>)> {
        let now = self.inner.clock.now();
        let jobs = self.inner.jobs.lock().await;
        let mut out: Vec<_> = jobs
            .iter()
            .map(|(name, job)| (name.clone(), job.expr.next_after(&now)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn stop(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
            job.handle.abort();
        }
    }

    async fn job_loop(&self, job: Arc<dyn ScheduledJob>, expr: CronExpr, cancel: CancellationToken) {
        loop {
            let now = self.inner.clock.now();
            let Some(next) = expr.next_after(&now) else {
                warn!("Job {} has no next run, stopping", job.name());
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {
                    if let Err(e) = job.run().await {
                        error!("Job {} failed: {e}", job.name());
                    }
                }
            }
        }
    }
}
