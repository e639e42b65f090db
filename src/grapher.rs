use std::collections::{BinaryHeap, HashMap, HashSet};
use std::iter::FusedIterator;

use tracing::warn;

use crate::error::GraphError;
use crate::options::{GraphOptions, TraversalMode};
use crate::revision::{BranchId, Parents, Revision};
use crate::source::RevisionSource;

/// Mode-specific payload carried by each step into its node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeExtra {
    #[default]
    None,
    Path(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStep {
    pub revision: Revision,
    pub parents: Parents,
    pub extra: NodeExtra,
}

/// Lazily walks a [`RevisionSource`] and yields `(revision, parents)` steps.
///
/// Steps come out newest first, except in explicit-list mode which keeps the
/// caller's order. Parent edges are trimmed to revisions the walk will still
/// emit, so every edge handed to the column allocator eventually closes.
///
/// The first error ends the walk.
pub struct Grapher<S> {
    source: S,
    walk: Walk,
    done: bool,
}

enum Walk {
    Full(FullWalk),
    SinglePath(PathWalk),
    Ancestry(AncestryWalk),
    Explicit(ExplicitWalk),
}

impl<S: RevisionSource> Grapher<S> {
    pub fn new(source: S, mode: TraversalMode) -> Self {
        let newest = newest_revision(&source);
        let walk = match mode {
            TraversalMode::Full { branch } => Walk::Full(FullWalk {
                branch,
                next: newest,
            }),
            TraversalMode::SinglePath { path } => Walk::SinglePath(PathWalk {
                path,
                next: newest,
                touched: HashMap::new(),
                nearest: HashMap::new(),
            }),
            TraversalMode::AncestryLimited { start, floor } => Walk::Ancestry(AncestryWalk {
                floor: floor.and_then(Revision::ordinal).unwrap_or(0),
                frontier: BinaryHeap::from([start]),
                enqueued: HashSet::from([start]),
            }),
            TraversalMode::ExplicitList { revisions } => {
                let mut first_position = HashMap::with_capacity(revisions.len());
                for (position, revision) in revisions.iter().enumerate() {
                    first_position.entry(*revision).or_insert(position);
                }
                Walk::Explicit(ExplicitWalk {
                    revisions,
                    first_position,
                    next: 0,
                })
            }
        };

        Self {
            source,
            walk,
            done: false,
        }
    }

    /// Validates `options` and checks that every revision they name exists
    /// in `source`. A missing revision is a configuration error, not a stale
    /// snapshot: rebuilding against the same history would fail again.
    pub fn from_options(source: S, options: &GraphOptions) -> Result<Self, GraphError> {
        let mode = options.traversal_mode()?;
        check_requested_revisions(&source, &mode)?;
        Ok(Self::new(source, mode))
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn advance(&mut self) -> Result<Option<GraphStep>, GraphError> {
        let source = &self.source;
        match &mut self.walk {
            Walk::Full(walk) => walk.advance(source),
            Walk::SinglePath(walk) => walk.advance(source),
            Walk::Ancestry(walk) => walk.advance(source),
            Walk::Explicit(walk) => walk.advance(source),
        }
    }
}

impl<S: RevisionSource> Iterator for Grapher<S> {
    type Item = Result<GraphStep, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(step)) => Some(Ok(step)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                if err.is_stale() {
                    warn!("revision walk stopped: {err}");
                }
                Some(Err(err))
            }
        }
    }
}

impl<S: RevisionSource> FusedIterator for Grapher<S> {}

struct FullWalk {
    branch: Option<BranchId>,
    next: Option<Revision>,
}

impl FullWalk {
    fn advance(&mut self, source: &impl RevisionSource) -> Result<Option<GraphStep>, GraphError> {
        while let Some(revision) = self.next {
            self.next = older_revision(source, revision);

            let Some(branch) = self.branch.as_ref() else {
                return Ok(Some(GraphStep {
                    revision,
                    parents: checked_parents(source, revision)?,
                    extra: NodeExtra::None,
                }));
            };
            if source.branch_of(revision)? != *branch {
                continue;
            }

            let mut kept = Vec::with_capacity(2);
            for parent in checked_parents(source, revision)?.iter() {
                if source.branch_of(parent)? == *branch {
                    kept.push(parent);
                }
            }
            return Ok(Some(GraphStep {
                revision,
                parents: Parents::from_slice(&kept),
                extra: NodeExtra::None,
            }));
        }
        Ok(None)
    }
}

struct PathWalk {
    path: String,
    next: Option<Revision>,
    touched: HashMap<Revision, bool>,
    nearest: HashMap<Revision, Vec<Revision>>,
}

impl PathWalk {
    fn advance(&mut self, source: &impl RevisionSource) -> Result<Option<GraphStep>, GraphError> {
        while let Some(revision) = self.next {
            self.next = older_revision(source, revision);
            // Older revisions never walk back up to this one, so its memo
            // entries can go.
            self.nearest.remove(&revision);
            let touched = match self.touched.remove(&revision) {
                Some(touched) => touched,
                None => source.is_ancestor_changed(revision, &self.path)?,
            };
            if !touched {
                continue;
            }

            let mut parents = Vec::with_capacity(2);
            for parent in checked_parents(source, revision)?.iter() {
                parents.extend(self.nearest_touching(source, parent)?);
            }
            return Ok(Some(GraphStep {
                revision,
                parents: Parents::from_slice(&newest_distinct(parents)),
                extra: NodeExtra::Path(self.path.clone()),
            }));
        }
        Ok(None)
    }

    fn touches(
        &mut self,
        source: &impl RevisionSource,
        revision: Revision,
    ) -> Result<bool, GraphError> {
        if let Some(touched) = self.touched.get(&revision) {
            return Ok(*touched);
        }
        let touched = source.is_ancestor_changed(revision, &self.path)?;
        self.touched.insert(revision, touched);
        Ok(touched)
    }

    /// The newest revisions at or below `start` that touch the path, at most
    /// two per lineage.
    fn nearest_touching(
        &mut self,
        source: &impl RevisionSource,
        start: Revision,
    ) -> Result<Vec<Revision>, GraphError> {
        let mut stack = vec![start];
        while let Some(&top) = stack.last() {
            if self.nearest.contains_key(&top) {
                stack.pop();
                continue;
            }
            if self.touches(source, top)? {
                self.nearest.insert(top, vec![top]);
                stack.pop();
                continue;
            }

            let parents = checked_parents(source, top)?;
            let pending = parents
                .iter()
                .filter(|parent| !self.nearest.contains_key(parent))
                .collect::<Vec<_>>();
            if !pending.is_empty() {
                stack.extend(pending);
                continue;
            }

            let mut found = Vec::new();
            for parent in parents.iter() {
                if let Some(nearest) = self.nearest.get(&parent) {
                    found.extend(nearest.iter().copied());
                }
            }
            self.nearest.insert(top, newest_distinct(found));
            stack.pop();
        }

        Ok(self.nearest.get(&start).cloned().unwrap_or_default())
    }
}

struct AncestryWalk {
    floor: usize,
    frontier: BinaryHeap<Revision>,
    enqueued: HashSet<Revision>,
}

impl AncestryWalk {
    fn advance(&mut self, source: &impl RevisionSource) -> Result<Option<GraphStep>, GraphError> {
        let Some(revision) = self.frontier.pop() else {
            return Ok(None);
        };

        let mut kept = Vec::with_capacity(2);
        for parent in checked_parents(source, revision)?.iter() {
            if parent.ordinal().is_some_and(|ordinal| ordinal < self.floor) {
                continue;
            }
            kept.push(parent);
            if self.enqueued.insert(parent) {
                self.frontier.push(parent);
            }
        }

        Ok(Some(GraphStep {
            revision,
            parents: Parents::from_slice(&kept),
            extra: NodeExtra::None,
        }))
    }
}

struct ExplicitWalk {
    revisions: Vec<Revision>,
    first_position: HashMap<Revision, usize>,
    next: usize,
}

impl ExplicitWalk {
    fn advance(&mut self, source: &impl RevisionSource) -> Result<Option<GraphStep>, GraphError> {
        while let Some(&revision) = self.revisions.get(self.next) {
            let position = self.next;
            self.next += 1;
            if self.first_position.get(&revision) != Some(&position) {
                continue;
            }

            let kept = checked_parents(source, revision)?
                .iter()
                .filter(|parent| {
                    self.first_position
                        .get(parent)
                        .is_some_and(|parent_position| *parent_position > position)
                })
                .collect::<Vec<_>>();
            return Ok(Some(GraphStep {
                revision,
                parents: Parents::from_slice(&kept),
                extra: NodeExtra::None,
            }));
        }
        Ok(None)
    }
}

fn check_requested_revisions(
    source: &impl RevisionSource,
    mode: &TraversalMode,
) -> Result<(), GraphError> {
    let missing = |role: &str, revision: Revision| {
        GraphError::InvalidTraversalConfiguration(format!(
            "{role} {revision} is not in the revision source"
        ))
    };
    match mode {
        TraversalMode::Full { .. } | TraversalMode::SinglePath { .. } => Ok(()),
        TraversalMode::AncestryLimited { start, floor } => {
            if !source.contains(*start) {
                return Err(missing("ancestry start", *start));
            }
            match floor {
                Some(floor) if !source.contains(*floor) => Err(missing("ancestry floor", *floor)),
                _ => Ok(()),
            }
        }
        TraversalMode::ExplicitList { revisions } => {
            match revisions.iter().find(|revision| !source.contains(**revision)) {
                Some(revision) => Err(missing("listed revision", *revision)),
                None => Ok(()),
            }
        }
    }
}

fn newest_revision(source: &impl RevisionSource) -> Option<Revision> {
    if source.has_working_state() {
        return Some(Revision::Working);
    }
    source.revision_count().checked_sub(1).map(Revision::Committed)
}

fn older_revision(source: &impl RevisionSource, revision: Revision) -> Option<Revision> {
    match revision {
        Revision::Working => source.revision_count().checked_sub(1).map(Revision::Committed),
        Revision::Committed(ordinal) => ordinal.checked_sub(1).map(Revision::Committed),
    }
}

/// Parents as reported by the source, rejecting edges that cannot belong to
/// the snapshot the walk started from.
fn checked_parents(
    source: &impl RevisionSource,
    revision: Revision,
) -> Result<Parents, GraphError> {
    let parents = source.parents(revision)?;
    for parent in parents.iter() {
        if parent.is_working() || parent >= revision || !source.contains(parent) {
            return Err(GraphError::StaleSnapshot(format!(
                "revision {revision} reports parent {parent} outside the snapshot"
            )));
        }
    }
    Ok(parents)
}

fn newest_distinct(mut revisions: Vec<Revision>) -> Vec<Revision> {
    revisions.sort_unstable_by(|left, right| right.cmp(left));
    revisions.dedup();
    revisions.truncate(2);
    revisions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_distinct_keeps_two_newest() {
        let revisions = vec![
            Revision::Committed(1),
            Revision::Committed(4),
            Revision::Committed(4),
            Revision::Committed(2),
        ];
        assert_eq!(
            newest_distinct(revisions),
            vec![Revision::Committed(4), Revision::Committed(2)]
        );
    }
}
