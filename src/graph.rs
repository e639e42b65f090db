use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::allocator::{ColorToken, ColumnAllocator, GraphNode};
use crate::error::GraphError;
use crate::grapher::{GraphStep, Grapher};
use crate::options::GraphOptions;
use crate::revision::{BranchId, Revision, SnapshotToken};
use crate::source::RevisionSource;

/// Outcome of one cooperative [`IncrementalGraph::poll_until`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Found(usize),
    Pending,
    NotFound,
}

/// Lazily materialized graph rows for one source snapshot and traversal.
///
/// Rows are only ever appended. When the source moves to a new snapshot the
/// graph reports [`GraphError::StaleSnapshot`] and must be replaced; columns
/// depend on the whole prefix, so there is no partial repair.
pub struct IncrementalGraph<S> {
    grapher: Grapher<S>,
    allocator: ColumnAllocator,
    built: Vec<GraphNode>,
    index: HashMap<Revision, usize>,
    exhausted: bool,
    poisoned: bool,
    batch_size: usize,
    token: SnapshotToken,
    branch_colors: Option<BranchColors>,
}

impl<S: RevisionSource> IncrementalGraph<S> {
    pub fn new(source: S, options: &GraphOptions) -> Result<Self, GraphError> {
        let token = source.snapshot_token();
        let grapher = Grapher::from_options(source, options)?;
        Ok(Self {
            grapher,
            allocator: ColumnAllocator::new(),
            built: Vec::new(),
            index: HashMap::new(),
            exhausted: false,
            poisoned: false,
            batch_size: options.batch_size,
            token,
            branch_colors: options.color_by_branch.then(BranchColors::default),
        })
    }

    /// Builds until at least `min_rows` rows exist or the walk is exhausted.
    /// Returns the number of built rows.
    pub fn build(&mut self, min_rows: usize) -> Result<usize, GraphError> {
        if self.built.len() >= min_rows || self.exhausted {
            return Ok(self.built.len());
        }
        self.ensure_fresh()?;

        let before = self.built.len();
        while self.built.len() < min_rows {
            if !self.pull()? {
                break;
            }
        }
        debug!(
            "graph rows {}..{} built (target {min_rows})",
            before,
            self.built.len()
        );
        Ok(self.built.len())
    }

    /// One refresh tick's worth of rows.
    pub fn build_batch(&mut self) -> Result<usize, GraphError> {
        self.build(self.built.len().saturating_add(self.batch_size))
    }

    /// Builds until `revision` has a row. `Ok(None)` means the walk ended
    /// without reaching it, which is expected for revisions filtered out of
    /// this view.
    pub fn build_until(&mut self, revision: Revision) -> Result<Option<usize>, GraphError> {
        if let Some(row) = self.row_of(revision) {
            return Ok(Some(row));
        }
        if self.exhausted {
            return Ok(None);
        }
        self.ensure_fresh()?;

        while self.pull()? {
            if let Some(row) = self.row_of(revision) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Like [`build_until`](Self::build_until) but does at most one batch of
    /// work per call, for hosts that poll from an event loop.
    pub fn poll_until(&mut self, revision: Revision) -> Result<Progress, GraphError> {
        if let Some(row) = self.row_of(revision) {
            return Ok(Progress::Found(row));
        }
        if self.exhausted {
            return Ok(Progress::NotFound);
        }
        self.ensure_fresh()?;

        for _ in 0..self.batch_size {
            if !self.pull()? {
                return Ok(Progress::NotFound);
            }
            if let Some(row) = self.row_of(revision) {
                return Ok(Progress::Found(row));
            }
        }
        Ok(Progress::Pending)
    }

    /// Go-to-revision: builds as far as needed and reports
    /// [`GraphError::RevisionNotFound`] when the view does not contain it.
    pub fn locate(&mut self, revision: Revision) -> Result<usize, GraphError> {
        self.build_until(revision)?
            .ok_or(GraphError::RevisionNotFound(revision))
    }

    pub fn row_of(&self, revision: Revision) -> Option<usize> {
        self.index.get(&revision).copied()
    }

    pub fn node_at(&self, row: usize) -> Option<&GraphNode> {
        self.built.get(row)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.built
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn snapshot_token(&self) -> SnapshotToken {
        self.token
    }

    pub fn source(&self) -> &S {
        self.grapher.source()
    }

    /// Whether the source has moved past the snapshot this graph was built
    /// against.
    pub fn is_stale(&self) -> bool {
        self.poisoned || self.grapher.source().snapshot_token() != self.token
    }

    fn ensure_fresh(&mut self) -> Result<(), GraphError> {
        if self.poisoned {
            return Err(GraphError::StaleSnapshot(
                "graph stopped after an earlier failure".to_string(),
            ));
        }
        let current = self.grapher.source().snapshot_token();
        if current != self.token {
            self.poisoned = true;
            warn!(
                "graph built against snapshot {} is stale (source now at {current})",
                self.token
            );
            return Err(GraphError::StaleSnapshot(format!(
                "snapshot changed from {} to {current}",
                self.token
            )));
        }
        Ok(())
    }

    /// Lays out the next step. Returns `false` once the walk is exhausted.
    fn pull(&mut self) -> Result<bool, GraphError> {
        let step = match self.grapher.next() {
            None => {
                self.exhausted = true;
                info!("graph exhausted after {} rows", self.built.len());
                return Ok(false);
            }
            Some(Err(err)) => {
                self.poisoned = true;
                return Err(err);
            }
            Some(Ok(step)) => step,
        };

        let colors = match self.branch_colors.as_mut() {
            Some(branch_colors) => {
                match branch_colors.for_step(self.grapher.source(), &step) {
                    Ok(colors) => colors,
                    Err(err) => {
                        self.poisoned = true;
                        return Err(err);
                    }
                }
            }
            None => Vec::new(),
        };

        let node = self.allocator.place_with_colors(step, &colors);
        self.index.insert(node.revision, self.built.len());
        self.built.push(node);
        Ok(true)
    }
}

/// One color per branch, numbered in the order branches are first seen.
#[derive(Debug, Default)]
struct BranchColors {
    tokens: HashMap<BranchId, ColorToken>,
}

impl BranchColors {
    fn for_step(
        &mut self,
        source: &impl RevisionSource,
        step: &GraphStep,
    ) -> Result<Vec<(Revision, ColorToken)>, GraphError> {
        let mut colors = Vec::with_capacity(3);
        for revision in std::iter::once(step.revision).chain(step.parents.iter()) {
            let branch = source.branch_of(revision)?;
            colors.push((revision, self.token_for(branch)));
        }
        Ok(colors)
    }

    fn token_for(&mut self, branch: BranchId) -> ColorToken {
        let next = ColorToken(u32::try_from(self.tokens.len()).unwrap_or(u32::MAX));
        *self.tokens.entry(branch).or_insert(next)
    }
}
