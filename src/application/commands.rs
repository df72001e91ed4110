use crate::application::bootstrap::bootstrap_workspace;
use crate::application::filter_editor::{FilterEditor, GoalFilterStore};
use crate::application::goal_progress::{GoalProgressService, RefreshOutcome};
use crate::application::scheduler::RefreshScheduler;
use crate::domain::category_tree::{CategoryField, CategoryFilterTree, NodePath};
use crate::domain::models::{Goal, GoalId, GoalType};
use crate::domain::period::{resolve, system_now_provider, NowProvider, PeriodRange};
use crate::infrastructure::activity_watch_client::ReqwestActivityWatchClient;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::goal_repository::{GoalRepository, SqliteGoalRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

type ActivityWatchProgressService =
    GoalProgressService<ReqwestActivityWatchClient, SqliteGoalRepository>;

pub struct AppState {
    database_path: PathBuf,
    config: AppConfig,
    repository: Arc<SqliteGoalRepository>,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let repository = Arc::new(SqliteGoalRepository::new(&bootstrap.database_path));

        Ok(Self {
            database_path: bootstrap.database_path,
            config: bootstrap.config,
            repository,
            now_provider: system_now_provider(),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }

    fn progress_service(&self) -> Result<Arc<ActivityWatchProgressService>, InfraError> {
        let client = ReqwestActivityWatchClient::new(&self.config)?;
        Ok(Arc::new(
            GoalProgressService::new(Arc::new(client), Arc::clone(&self.repository))
                .with_now_provider(Arc::clone(&self.now_provider)),
        ))
    }

    fn filter_editor(
        &self,
        goal_id: GoalId,
    ) -> Result<FilterEditor<GoalFilterStore<SqliteGoalRepository>>, InfraError> {
        require_goal(self, goal_id)?;
        let store = GoalFilterStore::new(goal_id, Arc::clone(&self.repository));
        let tree = store.load()?;
        Ok(FilterEditor::new(tree, store))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoalSummary {
    pub id: GoalId,
    pub name: String,
    pub goal_type: GoalType,
    pub target: f64,
    pub current_progress: f64,
    pub percent: String,
    pub count: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<PeriodRange>,
}

impl GoalSummary {
    fn from_goal(goal: &Goal, goal_id: GoalId, now: DateTime<Utc>) -> Self {
        Self {
            id: goal_id,
            name: goal.name.clone(),
            goal_type: goal.goal_type,
            target: goal.target,
            current_progress: goal.current_progress,
            percent: goal.percent_label(),
            count: goal.count_label(),
            active: goal.active,
            begin_date: goal.begin_date.map(|value| value.to_rfc3339()),
            end_date: goal.end_date.map(|value| value.to_rfc3339()),
            period: resolve(goal, now).ok(),
        }
    }
}

/// Field edits for an existing goal; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct GoalChanges {
    pub name: Option<String>,
    pub target: Option<f64>,
    pub goal_type: Option<String>,
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterNodeView {
    pub position: String,
    pub path: Vec<String>,
    pub label: String,
    pub ignore_case: bool,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RefreshReport {
    pub goal_id: GoalId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RefreshReport {
    fn new(goal_id: GoalId, result: Result<RefreshOutcome, InfraError>) -> Self {
        let (status, progress, detail) = match result {
            Ok(RefreshOutcome::Updated { progress }) => ("updated", Some(progress), None),
            Ok(RefreshOutcome::Unconfigured) => ("unconfigured", None, None),
            Ok(RefreshOutcome::AlreadyRunning) => ("already_running", None, None),
            Ok(RefreshOutcome::FetchFailed { reason }) => ("fetch_failed", None, Some(reason)),
            Err(error) => ("error", None, Some(error.to_string())),
        };
        Self {
            goal_id,
            status,
            progress,
            detail,
        }
    }
}

pub fn list_goals_impl(state: &AppState) -> Result<Vec<GoalSummary>, InfraError> {
    let now = state.now();
    state
        .repository
        .get_goals()?
        .into_iter()
        .map(|record| {
            let goal_id = record.id;
            let goal = Goal::try_from(record)?;
            Ok(GoalSummary::from_goal(&goal, goal_id, now))
        })
        .collect()
}

pub fn goal_types_impl(state: &AppState) -> Result<Vec<String>, InfraError> {
    state.repository.get_goal_types()
}

pub fn create_goal_impl(
    state: &AppState,
    name: String,
    target: f64,
    goal_type: String,
    begin_date: Option<String>,
    end_date: Option<String>,
) -> Result<GoalSummary, InfraError> {
    let mut goal = Goal::new(required_name(&name)?, target, goal_type.parse()?);
    goal.begin_date = parse_optional_rfc3339(begin_date.as_deref(), "begin")?;
    goal.end_date = parse_optional_rfc3339(end_date.as_deref(), "end")?;
    goal.validate()?;

    let goal_id = state.repository.add_goal(&goal)?;
    goal.id = Some(goal_id);
    info!(goal_id, name = %goal.name, goal_type = %goal.goal_type, "goal created");
    Ok(GoalSummary::from_goal(&goal, goal_id, state.now()))
}

pub fn edit_goal_impl(
    state: &AppState,
    goal_id: GoalId,
    changes: GoalChanges,
) -> Result<GoalSummary, InfraError> {
    let mut goal = require_goal(state, goal_id)?;

    if let Some(name) = changes.name {
        goal.name = required_name(&name)?.to_string();
    }
    if let Some(target) = changes.target {
        goal.target = target;
    }
    if let Some(goal_type) = changes.goal_type {
        goal.goal_type = goal_type.parse()?;
    }
    if let Some(begin) = parse_optional_rfc3339(changes.begin_date.as_deref(), "begin")? {
        goal.begin_date = Some(begin);
    }
    if let Some(end) = parse_optional_rfc3339(changes.end_date.as_deref(), "end")? {
        goal.end_date = Some(end);
    }
    goal.validate()?;

    let stored_id = state.repository.update_goal(&goal)?;
    info!(goal_id = stored_id, "goal updated");
    Ok(GoalSummary::from_goal(&goal, stored_id, state.now()))
}

pub fn deactivate_goal_impl(state: &AppState, goal_id: GoalId) -> Result<(), InfraError> {
    state.repository.deactivate_goal(goal_id)?;
    info!(goal_id, "goal deactivated");
    Ok(())
}

pub fn show_filter_impl(
    state: &AppState,
    goal_id: GoalId,
) -> Result<Vec<FilterNodeView>, InfraError> {
    let editor = state.filter_editor(goal_id)?;
    Ok(filter_view(editor.tree()))
}

pub fn add_filter_node_impl(
    state: &AppState,
    goal_id: GoalId,
    parent: Option<String>,
) -> Result<String, InfraError> {
    let parent = parent
        .as_deref()
        .map(str::parse::<NodePath>)
        .transpose()?;
    let mut editor = state.filter_editor(goal_id)?;
    let position = editor.add_child(parent.as_ref())?;
    info!(goal_id, position = %position, "filter category added");
    Ok(position.to_string())
}

/// Returns `false` when `path` no longer names a category.
pub fn delete_filter_node_impl(
    state: &AppState,
    goal_id: GoalId,
    path: String,
) -> Result<bool, InfraError> {
    let Ok(path) = path.parse::<NodePath>() else {
        return Ok(false);
    };
    let mut editor = state.filter_editor(goal_id)?;
    let removed = editor.delete(&path)?;
    if let Some(node) = &removed {
        info!(goal_id, position = %path, label = %node.label, "filter category deleted");
    }
    Ok(removed.is_some())
}

/// Returns `false` when `path` no longer names a category.
pub fn set_filter_field_impl(
    state: &AppState,
    goal_id: GoalId,
    path: String,
    field: CategoryField,
) -> Result<bool, InfraError> {
    let Ok(path) = path.parse::<NodePath>() else {
        return Ok(false);
    };
    let mut editor = state.filter_editor(goal_id)?;
    editor.set_field(&path, field)
}

pub fn parse_category_field(name: &str, value: &str) -> Result<CategoryField, InfraError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "label" => Ok(CategoryField::Label(value.to_string())),
        "pattern" => Ok(CategoryField::Pattern(value.to_string())),
        "ignore-case" | "ignore_case" => value
            .trim()
            .parse::<bool>()
            .map(CategoryField::IgnoreCase)
            .map_err(|_| {
                InfraError::InvalidConfig(format!("ignore-case must be true or false: {value}"))
            }),
        other => Err(InfraError::InvalidConfig(format!(
            "unknown filter field '{other}'; expected label, ignore-case or pattern"
        ))),
    }
}

pub async fn refresh_goals_impl(
    state: &AppState,
    goal_id: Option<GoalId>,
) -> Result<Vec<RefreshReport>, InfraError> {
    let service = state.progress_service()?;
    match goal_id {
        Some(goal_id) => {
            let outcome = service.refresh_goal(goal_id).await?;
            Ok(vec![RefreshReport::new(goal_id, Ok(outcome))])
        }
        None => Ok(service
            .refresh_all()
            .await?
            .into_iter()
            .map(|(goal_id, result)| RefreshReport::new(goal_id, result))
            .collect()),
    }
}

/// Refreshes every active goal at the configured cadence until `shutdown` resolves.
pub async fn watch_impl<S>(state: &AppState, shutdown: S) -> Result<usize, InfraError>
where
    S: Future<Output = ()>,
{
    let scheduler =
        RefreshScheduler::new(state.progress_service()?, state.config.refresh_interval());
    Ok(scheduler.run_until(shutdown).await)
}

fn require_goal(state: &AppState, goal_id: GoalId) -> Result<Goal, InfraError> {
    let record = state
        .repository
        .get_goal(goal_id)?
        .ok_or(InfraError::GoalNotFound(goal_id))?;
    Ok(Goal::try_from(record)?)
}

fn filter_view(tree: &CategoryFilterTree) -> Vec<FilterNodeView> {
    tree.walk()
        .into_iter()
        .map(|entry| FilterNodeView {
            position: entry.position.to_string(),
            path: entry.label_path,
            label: entry.node.label.clone(),
            ignore_case: entry.node.ignore_case,
            pattern: entry.node.pattern.clone(),
        })
        .collect()
}

fn required_name(name: &str) -> Result<&str, InfraError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InfraError::InvalidConfig("name must not be empty".to_string()));
    }
    Ok(name)
}

fn parse_optional_rfc3339(
    value: Option<&str>,
    field_name: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    value
        .map(|value| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|error| {
                    InfraError::InvalidConfig(format!(
                        "{field_name} must be RFC3339 date-time: {error}"
                    ))
                })
        })
        .transpose()
}
