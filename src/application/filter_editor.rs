use crate::domain::category_tree::{CategoryField, CategoryFilterTree, CategoryNode, NodePath};
use crate::domain::error::DomainError;
use crate::domain::models::GoalId;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::goal_repository::GoalRepository;
use std::sync::Arc;
use tracing::debug;

/// Receives the whole tree after every successful mutation.
pub trait FilterObserver: Send + Sync {
    fn on_filter_changed(&self, tree: &CategoryFilterTree) -> Result<(), InfraError>;
}

impl<F> FilterObserver for F
where
    F: Fn(&CategoryFilterTree) -> Result<(), InfraError> + Send + Sync,
{
    fn on_filter_changed(&self, tree: &CategoryFilterTree) -> Result<(), InfraError> {
        self(tree)
    }
}

/// Writes a goal's filter through to the repository.
pub struct GoalFilterStore<R>
where
    R: GoalRepository,
{
    goal_id: GoalId,
    repository: Arc<R>,
}

impl<R> GoalFilterStore<R>
where
    R: GoalRepository,
{
    pub fn new(goal_id: GoalId, repository: Arc<R>) -> Self {
        Self {
            goal_id,
            repository,
        }
    }

    pub fn load(&self) -> Result<CategoryFilterTree, InfraError> {
        Ok(self
            .repository
            .get_goal_filter(self.goal_id)?
            .map(|data| CategoryFilterTree::from_persisted_form(&data))
            .unwrap_or_default())
    }
}

impl<R> FilterObserver for GoalFilterStore<R>
where
    R: GoalRepository,
{
    fn on_filter_changed(&self, tree: &CategoryFilterTree) -> Result<(), InfraError> {
        self.repository
            .update_goal_filter(self.goal_id, &tree.to_persisted_form())?;
        debug!(goal_id = self.goal_id, nodes = tree.list_paths().len(), "goal filter saved");
        Ok(())
    }
}

pub struct FilterEditor<O>
where
    O: FilterObserver,
{
    tree: CategoryFilterTree,
    observer: O,
}

impl<O> FilterEditor<O>
where
    O: FilterObserver,
{
    pub fn new(tree: CategoryFilterTree, observer: O) -> Self {
        Self { tree, observer }
    }

    pub fn tree(&self) -> &CategoryFilterTree {
        &self.tree
    }

    pub fn add_child(&mut self, parent: Option<&NodePath>) -> Result<NodePath, InfraError> {
        let position = self.tree.add_child(parent)?;
        self.observer.on_filter_changed(&self.tree)?;
        Ok(position)
    }

    /// Removes a subtree. A stale path is a no-op and returns `None`.
    pub fn delete(&mut self, path: &NodePath) -> Result<Option<CategoryNode>, InfraError> {
        match self.tree.delete(path) {
            Ok(removed) => {
                self.observer.on_filter_changed(&self.tree)?;
                Ok(Some(removed))
            }
            Err(DomainError::PathNotFound(stale)) => {
                debug!(path = %stale, "ignoring delete of missing category");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Edits one field. A stale path is a no-op and returns `false`.
    pub fn set_field(&mut self, path: &NodePath, field: CategoryField) -> Result<bool, InfraError> {
        match self.tree.set_field(path, field) {
            Ok(()) => {
                self.observer.on_filter_changed(&self.tree)?;
                Ok(true)
            }
            Err(DomainError::PathNotFound(stale)) => {
                debug!(path = %stale, "ignoring edit of missing category");
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Goal, GoalType};
    use crate::infrastructure::goal_repository::InMemoryGoalRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorded {
        saves: AtomicUsize,
        last_paths: Mutex<Vec<Vec<String>>>,
    }

    struct RecordingObserver(Arc<Recorded>);

    impl FilterObserver for RecordingObserver {
        fn on_filter_changed(&self, tree: &CategoryFilterTree) -> Result<(), InfraError> {
            self.0.saves.fetch_add(1, Ordering::SeqCst);
            *self.0.last_paths.lock().expect("paths lock poisoned") = tree.list_paths();
            Ok(())
        }
    }

    fn recording_editor() -> (FilterEditor<RecordingObserver>, Arc<Recorded>) {
        let recorded = Arc::new(Recorded::default());
        (
            FilterEditor::new(
                CategoryFilterTree::new(),
                RecordingObserver(Arc::clone(&recorded)),
            ),
            recorded,
        )
    }

    #[test]
    fn every_mutation_is_saved() {
        let (mut editor, observer) = recording_editor();

        let work = editor.add_child(None).expect("add top-level");
        editor
            .set_field(&work, CategoryField::Label("Work".to_string()))
            .expect("rename");
        let child = editor.add_child(Some(&work)).expect("add child");
        editor
            .set_field(&child, CategoryField::Pattern("code".to_string()))
            .expect("set pattern");
        editor.delete(&child).expect("delete child");

        assert_eq!(observer.saves.load(Ordering::SeqCst), 5);
        assert_eq!(
            *observer.last_paths.lock().expect("paths lock poisoned"),
            vec![vec!["Work".to_string()]]
        );
    }

    #[test]
    fn stale_paths_are_ignored_without_saving() {
        let (mut editor, observer) = recording_editor();
        editor.add_child(None).expect("add top-level");

        let stale = NodePath::new(vec![4, 2]);
        assert_eq!(editor.delete(&stale).expect("delete is recovered"), None);
        assert!(!editor
            .set_field(&stale, CategoryField::IgnoreCase(true))
            .expect("edit is recovered"));
        assert_eq!(observer.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_save_is_surfaced() {
        let observer = |_tree: &CategoryFilterTree| -> Result<(), InfraError> {
            Err(InfraError::InvalidConfig("store unavailable".to_string()))
        };
        let mut editor = FilterEditor::new(CategoryFilterTree::new(), observer);
        assert!(editor.add_child(None).is_err());
    }

    #[test]
    fn goal_filter_store_writes_through_to_repository() {
        let repository = Arc::new(InMemoryGoalRepository::default());
        let goal_id = repository
            .add_goal(&Goal::new("Deep work", 3.0, GoalType::Daily))
            .expect("add goal");
        let store = GoalFilterStore::new(goal_id, Arc::clone(&repository));
        let mut editor = FilterEditor::new(store.load().expect("load empty"), store);

        let work = editor.add_child(None).expect("add");
        editor
            .set_field(&work, CategoryField::IgnoreCase(true))
            .expect("toggle ignore case");

        let saved = repository
            .get_goal_filter(goal_id)
            .expect("read filter")
            .expect("filter saved");
        let restored = CategoryFilterTree::from_persisted_form(&saved);
        assert_eq!(&restored, editor.tree());
        assert!(restored.top_level()[0].ignore_case);
    }
}
