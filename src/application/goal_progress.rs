use crate::domain::category_tree::CategoryFilterTree;
use crate::domain::error::DomainError;
use crate::domain::models::{Goal, GoalId};
use crate::domain::period::{resolve, system_now_provider, NowProvider};
use crate::infrastructure::activity_watch_client::DurationFetcher;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::goal_repository::GoalRepository;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Hours of matching activity inside the goal's current period. Leaves `goal` untouched.
///
/// Returns `None` without touching the backend when the filter has no categories.
pub async fn fetch_progress<F>(
    goal: &Goal,
    tree: &CategoryFilterTree,
    fetcher: &F,
    now: DateTime<Utc>,
) -> Result<Option<f64>, InfraError>
where
    F: DurationFetcher + ?Sized,
{
    if tree.is_empty() {
        return Ok(None);
    }

    let period = resolve(goal, now)?;
    let hours = fetcher.fetch_hours(&tree.to_query_filter(), &period).await?;
    Ok(Some(hours))
}

/// Recomputes `goal.current_progress` from the activity backend.
pub async fn refresh_progress<F>(
    goal: &mut Goal,
    tree: &CategoryFilterTree,
    fetcher: &F,
    now: DateTime<Utc>,
) -> Result<Option<f64>, InfraError>
where
    F: DurationFetcher + ?Sized,
{
    let progress = fetch_progress(goal, tree, fetcher, now).await?;
    if let Some(hours) = progress {
        goal.current_progress = hours;
    }
    Ok(progress)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated { progress: f64 },
    Unconfigured,
    AlreadyRunning,
    FetchFailed { reason: String },
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<GoalId>>,
    goal_id: GoalId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.goal_id);
        }
    }
}

pub struct GoalProgressService<F, R>
where
    F: DurationFetcher,
    R: GoalRepository,
{
    fetcher: Arc<F>,
    repository: Arc<R>,
    now_provider: NowProvider,
    in_flight: Mutex<HashSet<GoalId>>,
}

impl<F, R> GoalProgressService<F, R>
where
    F: DurationFetcher,
    R: GoalRepository,
{
    pub fn new(fetcher: Arc<F>, repository: Arc<R>) -> Self {
        Self {
            fetcher,
            repository,
            now_provider: system_now_provider(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn try_begin(&self, goal_id: GoalId) -> Result<Option<InFlightGuard<'_>>, InfraError> {
        let mut in_flight = self.in_flight.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("refresh registry lock poisoned: {error}"))
        })?;
        if !in_flight.insert(goal_id) {
            return Ok(None);
        }
        Ok(Some(InFlightGuard {
            in_flight: &self.in_flight,
            goal_id,
        }))
    }

    /// Runs one refresh of a stored goal and persists the new progress.
    ///
    /// Backend failures are reported as [`RefreshOutcome::FetchFailed`] and leave the goal as it
    /// was. Domain errors (for example a custom goal without bounds) and storage errors propagate.
    /// `goal` only takes the new progress once it has been stored.
    pub async fn refresh(
        &self,
        goal: &mut Goal,
        tree: &CategoryFilterTree,
    ) -> Result<RefreshOutcome, InfraError> {
        let goal_id = goal.id.ok_or_else(|| {
            DomainError::InvalidGoal(format!("goal '{}' has not been stored yet", goal.name))
        })?;

        let Some(_guard) = self.try_begin(goal_id)? else {
            info!(goal_id, "refresh already in flight; skipping");
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        let now = (self.now_provider)();
        match fetch_progress(goal, tree, self.fetcher.as_ref(), now).await {
            Ok(Some(progress)) => {
                self.repository.update_goal_progress(goal_id, progress)?;
                goal.current_progress = progress;
                info!(goal_id, progress, "goal progress updated");
                Ok(RefreshOutcome::Updated { progress })
            }
            Ok(None) => {
                debug!(goal_id, "goal has no categories; skipping refresh");
                Ok(RefreshOutcome::Unconfigured)
            }
            Err(InfraError::Domain(error)) => Err(error.into()),
            Err(error) => {
                warn!(goal_id, %error, "goal progress fetch failed; keeping previous progress");
                Ok(RefreshOutcome::FetchFailed {
                    reason: error.to_string(),
                })
            }
        }
    }

    pub async fn refresh_goal(&self, goal_id: GoalId) -> Result<RefreshOutcome, InfraError> {
        let (mut goal, tree) = self.load_goal(goal_id)?;
        self.refresh(&mut goal, &tree).await
    }

    fn load_goal(&self, goal_id: GoalId) -> Result<(Goal, CategoryFilterTree), InfraError> {
        let record = self
            .repository
            .get_goal(goal_id)?
            .ok_or(InfraError::GoalNotFound(goal_id))?;
        let goal = Goal::try_from(record)?;
        let tree = self
            .repository
            .get_goal_filter(goal_id)?
            .map(|data| CategoryFilterTree::from_persisted_form(&data))
            .unwrap_or_default();
        Ok((goal, tree))
    }
}

impl<F, R> GoalProgressService<F, R>
where
    F: DurationFetcher + 'static,
    R: GoalRepository + 'static,
{
    /// Refreshes every active goal, each on its own task. Results are ordered by goal id.
    pub async fn refresh_all(
        self: &Arc<Self>,
    ) -> Result<Vec<(GoalId, Result<RefreshOutcome, InfraError>)>, InfraError> {
        let records = self.repository.get_goals()?;
        let mut tasks = JoinSet::new();

        for record in records {
            let goal_id = record.id;
            let service = Arc::clone(self);
            tasks.spawn(async move {
                let result = match service.load_goal(goal_id) {
                    Ok((mut goal, tree)) => service.refresh(&mut goal, &tree).await,
                    Err(error) => Err(error),
                };
                (goal_id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((goal_id, result)) => {
                    if let Err(error) = &result {
                        warn!(goal_id, %error, "goal refresh failed");
                    }
                    results.push((goal_id, result));
                }
                Err(error) => warn!(%error, "goal refresh task aborted"),
            }
        }
        results.sort_by_key(|(goal_id, _)| *goal_id);
        Ok(results)
    }
}
