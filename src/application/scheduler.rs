use crate::application::goal_progress::{GoalProgressService, RefreshOutcome};
use crate::domain::models::GoalId;
use crate::infrastructure::activity_watch_client::DurationFetcher;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::goal_repository::GoalRepository;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

type CycleResult = Result<Vec<(GoalId, Result<RefreshOutcome, InfraError>)>, InfraError>;

/// Fixed-cadence driver for [`GoalProgressService::refresh_all`].
pub struct RefreshScheduler<F, R>
where
    F: DurationFetcher + 'static,
    R: GoalRepository + 'static,
{
    service: Arc<GoalProgressService<F, R>>,
    cadence: Duration,
}

impl<F, R> RefreshScheduler<F, R>
where
    F: DurationFetcher + 'static,
    R: GoalRepository + 'static,
{
    pub fn new(service: Arc<GoalProgressService<F, R>>, cadence: Duration) -> Self {
        Self { service, cadence }
    }

    /// Ticks until `shutdown` resolves, then waits for cycles already started.
    /// Returns the number of completed cycles.
    pub async fn run_until<S>(self, shutdown: S) -> usize
    where
        S: Future<Output = ()>,
    {
        let mut ticker = interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: JoinSet<CycleResult> = JoinSet::new();
        let mut completed = 0;
        tokio::pin!(shutdown);

        info!(cadence_ms = self.cadence.as_millis() as u64, "refresh scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let service = Arc::clone(&self.service);
                    cycles.spawn(async move { service.refresh_all().await });
                }
                Some(joined) = cycles.join_next() => {
                    log_cycle(joined);
                    completed += 1;
                }
            }
        }

        while let Some(joined) = cycles.join_next().await {
            log_cycle(joined);
            completed += 1;
        }
        info!(completed, "refresh scheduler stopped");
        completed
    }
}

fn log_cycle(joined: Result<CycleResult, JoinError>) {
    let results = match joined {
        Ok(Ok(results)) => results,
        Ok(Err(error)) => {
            warn!(%error, "refresh cycle could not list goals");
            return;
        }
        Err(error) => {
            warn!(%error, "refresh cycle aborted");
            return;
        }
    };

    let mut updated = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for (_, result) in &results {
        match result {
            Ok(RefreshOutcome::Updated { .. }) => updated += 1,
            Ok(RefreshOutcome::Unconfigured | RefreshOutcome::AlreadyRunning) => skipped += 1,
            Ok(RefreshOutcome::FetchFailed { .. }) | Err(_) => failed += 1,
        }
    }
    debug!(goals = results.len(), updated, skipped, failed, "refresh cycle finished");
}
