use crate::domain::category_tree::PersistedCategories;
use crate::domain::models::{Goal, GoalId, GoalRecord, GoalType};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const GOAL_COLUMNS: &str =
    "id, name, target, last_progress, type, active, begin_date, end_date, creation_date";

/// Storage gateway for goals and their category filters.
pub trait GoalRepository: Send + Sync {
    fn add_goal(&self, goal: &Goal) -> Result<GoalId, InfraError>;
    fn get_goal(&self, goal_id: GoalId) -> Result<Option<GoalRecord>, InfraError>;
    /// Active goals only, in ascending id order.
    fn get_goals(&self) -> Result<Vec<GoalRecord>, InfraError>;
    /// Updates the stored row, or inserts the goal as new when its id is absent or unknown.
    fn update_goal(&self, goal: &Goal) -> Result<GoalId, InfraError>;
    fn update_goal_progress(&self, goal_id: GoalId, progress: f64) -> Result<(), InfraError>;
    fn deactivate_goal(&self, goal_id: GoalId) -> Result<(), InfraError>;
    fn get_goal_filter(&self, goal_id: GoalId) -> Result<Option<PersistedCategories>, InfraError>;
    fn update_goal_filter(
        &self,
        goal_id: GoalId,
        filter: &PersistedCategories,
    ) -> Result<(), InfraError>;
    fn get_goal_types(&self) -> Result<Vec<String>, InfraError>;
}

fn stored_epochs(goal: &Goal) -> (Option<i64>, Option<i64>) {
    let (begin, end) = goal.stored_bounds();
    (
        begin.map(|value| value.timestamp()),
        end.map(|value| value.timestamp()),
    )
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<GoalRecord> {
    Ok(GoalRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        target: row.get(2)?,
        last_progress: row.get(3)?,
        goal_type: row.get(4)?,
        active: row.get(5)?,
        begin_date: row.get(6)?,
        end_date: row.get(7)?,
        creation_date: row.get(8)?,
    })
}

#[derive(Debug, Clone)]
pub struct SqliteGoalRepository {
    db_path: PathBuf,
}

impl SqliteGoalRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn goal_exists(connection: &Connection, goal_id: GoalId) -> Result<bool, InfraError> {
        let found: Option<i64> = connection
            .query_row("SELECT id FROM goal WHERE id = ?1", params![goal_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_goal(connection: &Connection, goal: &Goal) -> Result<GoalId, InfraError> {
        let (begin_date, end_date) = stored_epochs(goal);
        connection.execute(
            "INSERT INTO goal (name, target, last_progress, type, active, begin_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                goal.name,
                goal.target,
                goal.current_progress,
                goal.goal_type.as_str(),
                goal.active,
                begin_date,
                end_date
            ],
        )?;
        Ok(connection.last_insert_rowid())
    }
}

impl GoalRepository for SqliteGoalRepository {
    fn add_goal(&self, goal: &Goal) -> Result<GoalId, InfraError> {
        let connection = self.connect()?;
        Self::insert_goal(&connection, goal)
    }

    fn get_goal(&self, goal_id: GoalId) -> Result<Option<GoalRecord>, InfraError> {
        let connection = self.connect()?;
        let record = connection
            .query_row(
                &format!("SELECT {GOAL_COLUMNS} FROM goal WHERE id = ?1"),
                params![goal_id],
                goal_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn get_goals(&self) -> Result<Vec<GoalRecord>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM goal WHERE active = 1 ORDER BY id ASC"
        ))?;
        let records = statement
            .query_map([], goal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn update_goal(&self, goal: &Goal) -> Result<GoalId, InfraError> {
        let connection = self.connect()?;
        let Some(goal_id) = goal.id else {
            return Self::insert_goal(&connection, goal);
        };
        if !Self::goal_exists(&connection, goal_id)? {
            return Self::insert_goal(&connection, goal);
        }

        let (begin_date, end_date) = stored_epochs(goal);
        connection.execute(
            "UPDATE goal
             SET name = ?1, target = ?2, last_progress = ?3, type = ?4, active = ?5,
                 begin_date = ?6, end_date = ?7
             WHERE id = ?8",
            params![
                goal.name,
                goal.target,
                goal.current_progress,
                goal.goal_type.as_str(),
                goal.active,
                begin_date,
                end_date,
                goal_id
            ],
        )?;
        Ok(goal_id)
    }

    fn update_goal_progress(&self, goal_id: GoalId, progress: f64) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE goal SET last_progress = ?1 WHERE id = ?2",
            params![progress, goal_id],
        )?;
        if changed == 0 {
            return Err(InfraError::GoalNotFound(goal_id));
        }
        Ok(())
    }

    fn deactivate_goal(&self, goal_id: GoalId) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE goal SET active = 0 WHERE id = ?1",
            params![goal_id],
        )?;
        if changed == 0 {
            return Err(InfraError::GoalNotFound(goal_id));
        }
        Ok(())
    }

    fn get_goal_filter(&self, goal_id: GoalId) -> Result<Option<PersistedCategories>, InfraError> {
        let connection = self.connect()?;
        let blob: Option<String> = connection
            .query_row(
                "SELECT filter FROM activity_watch_filter WHERE goal_id = ?1",
                params![goal_id],
                |row| row.get(0),
            )
            .optional()?;
        blob.map(|raw| serde_json::from_str(&raw).map_err(InfraError::from))
            .transpose()
    }

    fn update_goal_filter(
        &self,
        goal_id: GoalId,
        filter: &PersistedCategories,
    ) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let blob = serde_json::to_string(filter)?;
        connection.execute(
            "INSERT INTO activity_watch_filter (goal_id, filter)
             VALUES (?1, ?2)
             ON CONFLICT(goal_id) DO UPDATE SET filter = excluded.filter",
            params![goal_id, blob],
        )?;
        Ok(())
    }

    fn get_goal_types(&self) -> Result<Vec<String>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare("SELECT type FROM goal_type ORDER BY rowid ASC")?;
        let types = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(types)
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    goals: BTreeMap<GoalId, GoalRecord>,
    filters: HashMap<GoalId, String>,
    last_id: GoalId,
}

impl InMemoryState {
    fn insert(&mut self, goal: &Goal, created_at: DateTime<Utc>) -> GoalId {
        self.last_id += 1;
        let goal_id = self.last_id;
        let (begin_date, end_date) = stored_epochs(goal);
        self.goals.insert(
            goal_id,
            GoalRecord {
                id: goal_id,
                name: goal.name.clone(),
                target: goal.target,
                last_progress: goal.current_progress,
                goal_type: goal.goal_type.as_str().to_string(),
                active: goal.active,
                begin_date,
                end_date,
                creation_date: created_at.timestamp(),
            },
        );
        goal_id
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGoalRepository {
    state: Mutex<InMemoryState>,
}

impl InMemoryGoalRepository {
    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>, InfraError> {
        self.state.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("goal store lock poisoned: {error}"))
        })
    }
}

impl GoalRepository for InMemoryGoalRepository {
    fn add_goal(&self, goal: &Goal) -> Result<GoalId, InfraError> {
        Ok(self.lock()?.insert(goal, Utc::now()))
    }

    fn get_goal(&self, goal_id: GoalId) -> Result<Option<GoalRecord>, InfraError> {
        Ok(self.lock()?.goals.get(&goal_id).cloned())
    }

    fn get_goals(&self) -> Result<Vec<GoalRecord>, InfraError> {
        Ok(self
            .lock()?
            .goals
            .values()
            .filter(|record| record.active)
            .cloned()
            .collect())
    }

    fn update_goal(&self, goal: &Goal) -> Result<GoalId, InfraError> {
        let mut state = self.lock()?;
        let existing = goal.id.filter(|goal_id| state.goals.contains_key(goal_id));
        let Some(goal_id) = existing else {
            return Ok(state.insert(goal, Utc::now()));
        };

        let record = state
            .goals
            .get_mut(&goal_id)
            .ok_or(InfraError::GoalNotFound(goal_id))?;
        let (begin_date, end_date) = stored_epochs(goal);
        record.name = goal.name.clone();
        record.target = goal.target;
        record.last_progress = goal.current_progress;
        record.goal_type = goal.goal_type.as_str().to_string();
        record.active = goal.active;
        record.begin_date = begin_date;
        record.end_date = end_date;
        Ok(record.id)
    }

    fn update_goal_progress(&self, goal_id: GoalId, progress: f64) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        let record = state
            .goals
            .get_mut(&goal_id)
            .ok_or(InfraError::GoalNotFound(goal_id))?;
        record.last_progress = progress;
        Ok(())
    }

    fn deactivate_goal(&self, goal_id: GoalId) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        let record = state
            .goals
            .get_mut(&goal_id)
            .ok_or(InfraError::GoalNotFound(goal_id))?;
        record.active = false;
        Ok(())
    }

    fn get_goal_filter(&self, goal_id: GoalId) -> Result<Option<PersistedCategories>, InfraError> {
        let state = self.lock()?;
        state
            .filters
            .get(&goal_id)
            .map(|raw| serde_json::from_str(raw).map_err(InfraError::from))
            .transpose()
    }

    fn update_goal_filter(
        &self,
        goal_id: GoalId,
        filter: &PersistedCategories,
    ) -> Result<(), InfraError> {
        let blob = serde_json::to_string(filter)?;
        self.lock()?.filters.insert(goal_id, blob);
        Ok(())
    }

    fn get_goal_types(&self) -> Result<Vec<String>, InfraError> {
        Ok(GoalType::ALL
            .iter()
            .map(|goal_type| goal_type.as_str().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category_tree::{CategoryFilterTree, CategoryNode};
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "goaltracker-repo-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("goaltracker.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }

        fn repository(&self) -> SqliteGoalRepository {
            SqliteGoalRepository::new(&self.path)
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_filter() -> PersistedCategories {
        CategoryFilterTree::from_nodes(vec![
            CategoryNode::new("Work", true, "code|terminal")
                .with_children(vec![CategoryNode::new("Review", false, "pull request")]),
        ])
        .to_persisted_form()
    }

    fn deactivation_keeps_record(repository: &dyn GoalRepository) {
        let kept = repository
            .add_goal(&Goal::new("Reading", 1.0, GoalType::Daily))
            .expect("add kept goal");
        let retired = repository
            .add_goal(&Goal::new("Gaming", 2.0, GoalType::Monthly))
            .expect("add retired goal");

        repository.deactivate_goal(retired).expect("deactivate");

        let active = repository.get_goals().expect("list active");
        assert_eq!(active.iter().map(|record| record.id).collect::<Vec<_>>(), vec![kept]);

        let record = repository
            .get_goal(retired)
            .expect("get goal")
            .expect("record retained");
        assert!(!record.active);
        assert_eq!(record.name, "Gaming");
        assert_eq!(record.goal_type, "monthly");
        assert_eq!(record.target, 2.0);
    }

    fn update_goal_upserts_unknown_ids(repository: &dyn GoalRepository) {
        let mut goal = Goal::new("Writing", 3.0, GoalType::Yearly);
        goal.id = Some(999);

        let inserted = repository.update_goal(&goal).expect("upsert unknown id");
        assert_ne!(inserted, 999);

        goal.id = Some(inserted);
        goal.name = "Writing (edited)".to_string();
        goal.target = 5.0;
        let updated = repository.update_goal(&goal).expect("update existing");
        assert_eq!(updated, inserted);

        let record = repository
            .get_goal(inserted)
            .expect("get goal")
            .expect("record exists");
        assert_eq!(record.name, "Writing (edited)");
        assert_eq!(record.target, 5.0);
        assert_eq!(repository.get_goals().expect("list").len(), 1);
    }

    fn progress_and_filter_storage(repository: &dyn GoalRepository) {
        let goal_id = repository
            .add_goal(&Goal::new("Deep work", 4.0, GoalType::Daily))
            .expect("add goal");

        repository
            .update_goal_progress(goal_id, 2.5)
            .expect("update progress");
        let record = repository.get_goal(goal_id).expect("get").expect("exists");
        assert_eq!(record.last_progress, 2.5);

        assert!(repository.get_goal_filter(goal_id).expect("read filter").is_none());
        repository
            .update_goal_filter(goal_id, &sample_filter())
            .expect("insert filter");
        repository
            .update_goal_filter(goal_id, &PersistedCategories::default())
            .expect("replace filter");
        repository
            .update_goal_filter(goal_id, &sample_filter())
            .expect("replace filter again");
        assert_eq!(
            repository.get_goal_filter(goal_id).expect("read filter"),
            Some(sample_filter())
        );

        assert!(matches!(
            repository.update_goal_progress(goal_id + 100, 1.0),
            Err(InfraError::GoalNotFound(_))
        ));
        assert!(matches!(
            repository.deactivate_goal(goal_id + 100),
            Err(InfraError::GoalNotFound(_))
        ));
    }

    #[test]
    fn sqlite_deactivation_is_non_destructive() {
        let database = TempDatabase::new();
        deactivation_keeps_record(&database.repository());
    }

    #[test]
    fn in_memory_deactivation_is_non_destructive() {
        deactivation_keeps_record(&InMemoryGoalRepository::default());
    }

    #[test]
    fn sqlite_update_goal_upserts() {
        let database = TempDatabase::new();
        update_goal_upserts_unknown_ids(&database.repository());
    }

    #[test]
    fn in_memory_update_goal_upserts() {
        update_goal_upserts_unknown_ids(&InMemoryGoalRepository::default());
    }

    #[test]
    fn sqlite_progress_and_filter_storage() {
        let database = TempDatabase::new();
        progress_and_filter_storage(&database.repository());
    }

    #[test]
    fn in_memory_progress_and_filter_storage() {
        progress_and_filter_storage(&InMemoryGoalRepository::default());
    }

    #[test]
    fn sqlite_stores_bounds_only_for_custom_goals() {
        let database = TempDatabase::new();
        let repository = database.repository();
        let begin = at("2024-01-01T00:00:00+03:00");
        let end = at("2024-01-31T23:59:59+03:00");

        let custom_id = repository
            .add_goal(&Goal::custom("January push", 50.0, begin, end))
            .expect("add custom goal");
        let mut daily = Goal::new("Daily", 1.0, GoalType::Daily);
        daily.begin_date = Some(begin);
        daily.end_date = Some(end);
        let daily_id = repository.add_goal(&daily).expect("add daily goal");

        let custom = repository.get_goal(custom_id).expect("get").expect("exists");
        assert_eq!(custom.begin_date, Some(begin.timestamp()));
        assert_eq!(custom.end_date, Some(end.timestamp()));
        assert!(custom.creation_date > 0);

        let daily = repository.get_goal(daily_id).expect("get").expect("exists");
        assert_eq!(daily.begin_date, None);
        assert_eq!(daily.end_date, None);

        let restored = Goal::try_from(custom).expect("convert record");
        assert_eq!(restored.begin_date, Some(begin));
        assert_eq!(restored.end_date, Some(end));
    }

    #[test]
    fn sqlite_lists_seeded_goal_types() {
        let database = TempDatabase::new();
        let types = database.repository().get_goal_types().expect("list types");
        assert_eq!(types, vec!["daily", "monthly", "yearly", "custom"]);
    }

    #[test]
    fn schema_can_be_applied_twice() {
        let database = TempDatabase::new();
        initialize_database(&database.path).expect("re-apply schema");
        assert_eq!(
            database.repository().get_goal_types().expect("list types").len(),
            4
        );
    }
}
