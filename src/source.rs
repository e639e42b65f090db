use std::collections::{BTreeMap, BTreeSet};

use crate::error::SourceError;
use crate::revision::{BranchId, Parents, Revision, SnapshotToken};

/// Read-only access to a revision DAG.
///
/// The layout engine only ever reads through this trait; latency, caching and
/// I/O belong to the implementation.
pub trait RevisionSource {
    /// Number of committed revisions. Valid ordinals are `0..revision_count()`.
    fn revision_count(&self) -> usize;

    /// Whether the uncommitted working state currently exists.
    fn has_working_state(&self) -> bool;

    fn parents(&self, revision: Revision) -> Result<Parents, SourceError>;

    /// Whether `revision` modifies `path` (or anything below it, for
    /// directories) relative to its first parent.
    fn is_ancestor_changed(&self, revision: Revision, path: &str) -> Result<bool, SourceError>;

    fn branch_of(&self, revision: Revision) -> Result<BranchId, SourceError>;

    fn snapshot_token(&self) -> SnapshotToken;

    fn contains(&self, revision: Revision) -> bool {
        match revision {
            Revision::Committed(ordinal) => ordinal < self.revision_count(),
            Revision::Working => self.has_working_state(),
        }
    }

    /// Committed revisions in creation order.
    fn revisions(&self) -> impl DoubleEndedIterator<Item = Revision> {
        (0..self.revision_count()).map(Revision::Committed)
    }

    /// Children are not stored; they are derived by scanning every newer
    /// revision, so this is linear in the history above `revision`.
    fn children(&self, revision: Revision) -> Result<Vec<Revision>, SourceError> {
        if !self.contains(revision) {
            return Err(SourceError::Unknown(revision));
        }
        let Revision::Committed(ordinal) = revision else {
            return Ok(Vec::new());
        };

        let mut children = Vec::new();
        for candidate in self.revisions().skip(ordinal + 1) {
            if self.parents(candidate)?.contains(revision) {
                children.push(candidate);
            }
        }
        if self.has_working_state() && self.parents(Revision::Working)?.contains(revision) {
            children.push(Revision::Working);
        }
        Ok(children)
    }
}

impl<S: RevisionSource> RevisionSource for &S {
    fn revision_count(&self) -> usize {
        (**self).revision_count()
    }

    fn has_working_state(&self) -> bool {
        (**self).has_working_state()
    }

    fn parents(&self, revision: Revision) -> Result<Parents, SourceError> {
        (**self).parents(revision)
    }

    fn is_ancestor_changed(&self, revision: Revision, path: &str) -> Result<bool, SourceError> {
        (**self).is_ancestor_changed(revision, path)
    }

    fn branch_of(&self, revision: Revision) -> Result<BranchId, SourceError> {
        (**self).branch_of(revision)
    }

    fn snapshot_token(&self) -> SnapshotToken {
        (**self).snapshot_token()
    }
}

/// Whether a changed path falls under `path`. Directories match everything
/// below them.
pub(crate) fn path_matches(changed: &str, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return true;
    }
    changed == path
        || changed
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[derive(Debug, Clone)]
struct RevisionRecord {
    parents: Parents,
    branch: BranchId,
    changed_paths: BTreeSet<String>,
}

/// An in-memory revision store.
///
/// Every mutation bumps the snapshot token, so graphs built before the change
/// report themselves stale.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<RevisionRecord>,
    working: Option<RevisionRecord>,
    tags: BTreeMap<String, Revision>,
    generation: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a revision and returns its identity.
    pub fn commit(
        &mut self,
        parents: &[Revision],
        branch: impl Into<BranchId>,
        changed_paths: &[&str],
    ) -> Result<Revision, SourceError> {
        let parents = self.checked_parents(parents)?;
        let revision = Revision::Committed(self.records.len());
        self.records.push(RevisionRecord {
            parents,
            branch: branch.into(),
            changed_paths: changed_paths.iter().map(|path| path.to_string()).collect(),
        });
        self.generation += 1;
        Ok(revision)
    }

    /// Creates or replaces the working state.
    pub fn set_working_state(
        &mut self,
        parents: &[Revision],
        changed_paths: &[&str],
    ) -> Result<(), SourceError> {
        let parents = self.checked_parents(parents)?;
        let branch = match parents.first() {
            Some(first) => self.record(first)?.branch.clone(),
            None => BranchId::detached(),
        };
        self.working = Some(RevisionRecord {
            parents,
            branch,
            changed_paths: changed_paths.iter().map(|path| path.to_string()).collect(),
        });
        self.generation += 1;
        Ok(())
    }

    pub fn clear_working_state(&mut self) {
        if self.working.take().is_some() {
            self.generation += 1;
        }
    }

    /// Removes `revision` and every revision created after it.
    pub fn strip(&mut self, revision: Revision) -> Result<(), SourceError> {
        let Revision::Committed(ordinal) = revision else {
            self.clear_working_state();
            return Ok(());
        };
        if ordinal >= self.records.len() {
            return Err(SourceError::Unknown(revision));
        }

        self.records.truncate(ordinal);
        self.tags.retain(|_, target| *target < revision);
        if self
            .working
            .as_ref()
            .is_some_and(|working| working.parents.iter().any(|parent| parent >= revision))
        {
            self.working = None;
        }
        self.generation += 1;
        Ok(())
    }

    pub fn tag(&mut self, name: impl Into<String>, revision: Revision) -> Result<(), SourceError> {
        if revision.is_working() || !self.contains(revision) {
            return Err(SourceError::Unknown(revision));
        }
        self.tags.insert(name.into(), revision);
        self.generation += 1;
        Ok(())
    }

    pub fn tag_target(&self, name: &str) -> Option<Revision> {
        self.tags.get(name).copied()
    }

    pub fn tags_of(&self, revision: Revision) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(_, target)| **target == revision)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn checked_parents(&self, parents: &[Revision]) -> Result<Parents, SourceError> {
        for parent in parents {
            if parent.is_working() || !self.contains(*parent) {
                return Err(SourceError::Unknown(*parent));
            }
        }
        Ok(Parents::from_slice(parents))
    }

    fn record(&self, revision: Revision) -> Result<&RevisionRecord, SourceError> {
        let record = match revision {
            Revision::Committed(ordinal) => self.records.get(ordinal),
            Revision::Working => self.working.as_ref(),
        };
        record.ok_or(SourceError::Unknown(revision))
    }
}

impl RevisionSource for MemoryStore {
    fn revision_count(&self) -> usize {
        self.records.len()
    }

    fn has_working_state(&self) -> bool {
        self.working.is_some()
    }

    fn parents(&self, revision: Revision) -> Result<Parents, SourceError> {
        Ok(self.record(revision)?.parents)
    }

    fn is_ancestor_changed(&self, revision: Revision, path: &str) -> Result<bool, SourceError> {
        Ok(self
            .record(revision)?
            .changed_paths
            .iter()
            .any(|changed| path_matches(changed, path)))
    }

    fn branch_of(&self, revision: Revision) -> Result<BranchId, SourceError> {
        Ok(self.record(revision)?.branch.clone())
    }

    fn snapshot_token(&self) -> SnapshotToken {
        SnapshotToken(self.generation)
    }
}
