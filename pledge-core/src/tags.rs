//! Cache tag naming
//!
//! Tags group cache entries for bulk invalidation. Entity tags follow the
//! `<kind>:<id>` convention (`organization:12`, `user:7`) so that any writer
//! holding an entity id can name every cached artifact derived from it.

use crate::SubjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

/// Base tag carried by every read model.
pub const READ_MODEL_TAG: &str = "read_model";

/// Tag for a domain entity, e.g. `organization:12`.
pub fn entity_tag(kind: &str, id: impl Display) -> String {
    format!("{}:{}", kind, id)
}

/// Tag for one subject of a repository, e.g. `org_dashboard:n:12`.
///
/// Uses [`SubjectId::key_segment`], so numeric and named ids with the same
/// text get distinct tags.
pub fn subject_tag(prefix: &str, id: &SubjectId) -> String {
    format!("{}:{}", prefix, id.key_segment())
}

/// Ordered, de-duplicated tag collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag, builder style.
    pub fn with(mut self, tag: impl Into<String>) -> Self {
        self.insert(tag);
        self
    }

    /// Add a tag. Empty tags are ignored.
    pub fn insert(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !tag.is_empty() {
            self.0.insert(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Tags as an owned vector, in order.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<T: Into<String>> Extend<T> for TagSet {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for tag in iter {
            self.insert(tag);
        }
    }
}

impl<T: Into<String>> FromIterator<T> for TagSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for TagSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
