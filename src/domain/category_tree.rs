//! Hierarchical category filter attached to a goal.
//!
//! Nodes are addressed by [`NodePath`], the child indices from the implicit root. Label paths
//! (ancestor labels down to a node) are what the activity backend matches on, and they may repeat
//! across siblings.

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub const PLACEHOLDER_LABEL: &str = "New Item";
pub const PLACEHOLDER_PATTERN: &str = "New Description";
pub const RULE_TYPE_REGEX: &str = "regex";

pub type LabelPath = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub label: String,
    pub ignore_case: bool,
    pub pattern: String,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn new(label: impl Into<String>, ignore_case: bool, pattern: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ignore_case,
            pattern: pattern.into(),
            children: Vec::new(),
        }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_LABEL, false, PLACEHOLDER_PATTERN)
    }

    pub fn with_children(mut self, children: Vec<CategoryNode>) -> Self {
        self.children = children;
        self
    }

    fn rule(&self) -> CategoryRule {
        CategoryRule {
            rule_type: RULE_TYPE_REGEX.to_string(),
            ignore_case: self.ignore_case,
            regex: self.pattern.clone(),
        }
    }

    fn to_persisted(&self) -> PersistedCategory {
        PersistedCategory {
            category: self.label.clone(),
            ignore_case: self.ignore_case,
            filter: self.pattern.clone(),
            sub_categories: self.children.iter().map(CategoryNode::to_persisted).collect(),
        }
    }

    fn from_persisted(data: &PersistedCategory) -> Self {
        Self {
            label: data.category.clone(),
            ignore_case: data.ignore_case,
            pattern: data.filter.clone(),
            children: data
                .sub_categories
                .iter()
                .map(CategoryNode::from_persisted)
                .collect(),
        }
    }
}

/// Position of a node: child indices from the implicit root. Empty means the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&rendered)
    }
}

impl FromStr for NodePath {
    type Err = DomainError;

    /// Parses dot-separated indices such as `0.2.1`; an empty string is the root.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::root());
        }
        value
            .split('.')
            .map(|segment| {
                segment
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| DomainError::PathNotFound(value.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryField {
    Label(String),
    IgnoreCase(bool),
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub ignore_case: bool,
    pub regex: String,
}

/// One entry of the backend's category list, serialized as `[label_path, rule]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCategory(pub LabelPath, pub CategoryRule);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedCategories {
    #[serde(default)]
    pub sub_categories: Vec<PersistedCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCategory {
    pub category: String,
    pub ignore_case: bool,
    pub filter: String,
    #[serde(default)]
    pub sub_categories: Vec<PersistedCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry<'a> {
    pub position: NodePath,
    pub label_path: LabelPath,
    pub node: &'a CategoryNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryFilterTree {
    nodes: Vec<CategoryNode>,
}

impl CategoryFilterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<CategoryNode>) -> Self {
        Self { nodes }
    }

    pub fn top_level(&self) -> &[CategoryNode] {
        &self.nodes
    }

    /// True when no top-level category is configured.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, path: &NodePath) -> Option<&CategoryNode> {
        let (first, rest) = path.indices().split_first()?;
        let mut current = self.nodes.get(*first)?;
        for index in rest {
            current = current.children.get(*index)?;
        }
        Some(current)
    }

    fn node_mut(&mut self, path: &NodePath) -> Option<&mut CategoryNode> {
        let (first, rest) = path.indices().split_first()?;
        let mut current = self.nodes.get_mut(*first)?;
        for index in rest {
            current = current.children.get_mut(*index)?;
        }
        Some(current)
    }

    fn children_mut(&mut self, parent: &NodePath) -> Option<&mut Vec<CategoryNode>> {
        if parent.is_root() {
            return Some(&mut self.nodes);
        }
        self.node_mut(parent).map(|node| &mut node.children)
    }

    /// Appends a placeholder node under `parent`, or at top level when `parent` is absent or
    /// the root. Returns the new node's position.
    pub fn add_child(&mut self, parent: Option<&NodePath>) -> Result<NodePath, DomainError> {
        let parent = parent.cloned().unwrap_or_default();
        let children = self
            .children_mut(&parent)
            .ok_or_else(|| DomainError::PathNotFound(parent.to_string()))?;
        children.push(CategoryNode::placeholder());
        Ok(parent.child(children.len() - 1))
    }

    /// Removes the node at `path` together with its subtree.
    pub fn delete(&mut self, path: &NodePath) -> Result<CategoryNode, DomainError> {
        let not_found = || DomainError::PathNotFound(path.to_string());
        let (last, parent) = path.indices().split_last().ok_or_else(not_found)?;
        let siblings = self
            .children_mut(&NodePath::new(parent.to_vec()))
            .ok_or_else(not_found)?;
        if *last >= siblings.len() {
            return Err(not_found());
        }
        Ok(siblings.remove(*last))
    }

    pub fn set_field(&mut self, path: &NodePath, field: CategoryField) -> Result<(), DomainError> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| DomainError::PathNotFound(path.to_string()))?;
        match field {
            CategoryField::Label(label) => node.label = label,
            CategoryField::IgnoreCase(ignore_case) => node.ignore_case = ignore_case,
            CategoryField::Pattern(pattern) => node.pattern = pattern,
        }
        Ok(())
    }

    /// Breadth-first walk: top-level nodes left to right, then each level in FIFO order.
    pub fn walk(&self) -> Vec<CategoryEntry<'_>> {
        let mut visited = Vec::new();
        let mut queue: VecDeque<(NodePath, LabelPath, &[CategoryNode])> = VecDeque::new();
        queue.push_back((NodePath::root(), Vec::new(), self.nodes.as_slice()));

        while let Some((parent_position, parent_path, children)) = queue.pop_front() {
            for (index, child) in children.iter().enumerate() {
                let position = parent_position.child(index);
                let mut label_path = parent_path.clone();
                label_path.push(child.label.clone());
                queue.push_back((position.clone(), label_path.clone(), child.children.as_slice()));
                visited.push(CategoryEntry {
                    position,
                    label_path,
                    node: child,
                });
            }
        }
        visited
    }

    pub fn list_paths(&self) -> Vec<LabelPath> {
        self.walk()
            .into_iter()
            .map(|entry| entry.label_path)
            .collect()
    }

    pub fn to_query_filter(&self) -> Vec<QueryCategory> {
        self.walk()
            .into_iter()
            .map(|entry| QueryCategory(entry.label_path, entry.node.rule()))
            .collect()
    }

    pub fn to_persisted_form(&self) -> PersistedCategories {
        PersistedCategories {
            sub_categories: self.nodes.iter().map(CategoryNode::to_persisted).collect(),
        }
    }

    pub fn from_persisted_form(data: &PersistedCategories) -> Self {
        Self {
            nodes: data
                .sub_categories
                .iter()
                .map(CategoryNode::from_persisted)
                .collect(),
        }
    }
}
