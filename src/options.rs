use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::revision::{BranchId, Revision};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalKind {
    #[default]
    Full,
    SinglePath,
    AncestryLimited,
    ExplicitList,
}

/// Validated traversal, consumed by [`Grapher`](crate::grapher::Grapher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalMode {
    Full {
        branch: Option<BranchId>,
    },
    SinglePath {
        path: String,
    },
    AncestryLimited {
        start: Revision,
        floor: Option<Revision>,
    },
    ExplicitList {
        revisions: Vec<Revision>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    pub traversal: TraversalKind,
    pub branch_filter: Option<BranchId>,
    pub path_filter: Option<String>,
    pub ancestry_start: Option<Revision>,
    pub ancestry_floor: Option<Revision>,
    pub revisions: Vec<Revision>,
    pub batch_size: usize,
    pub color_by_branch: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            traversal: TraversalKind::Full,
            branch_filter: None,
            path_filter: None,
            ancestry_start: None,
            ancestry_floor: None,
            revisions: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            color_by_branch: false,
        }
    }
}

impl GraphOptions {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn branch(branch: impl Into<BranchId>) -> Self {
        Self {
            branch_filter: Some(branch.into()),
            ..Self::default()
        }
    }

    pub fn file_history(path: impl Into<String>) -> Self {
        Self {
            traversal: TraversalKind::SinglePath,
            path_filter: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn ancestry(start: Revision, floor: Option<Revision>) -> Self {
        Self {
            traversal: TraversalKind::AncestryLimited,
            ancestry_start: Some(start),
            ancestry_floor: floor,
            ..Self::default()
        }
    }

    pub fn explicit(revisions: impl IntoIterator<Item = Revision>) -> Self {
        Self {
            traversal: TraversalKind::ExplicitList,
            revisions: revisions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_color_by_branch(mut self, color_by_branch: bool) -> Self {
        self.color_by_branch = color_by_branch;
        self
    }

    pub fn traversal_mode(&self) -> Result<TraversalMode, GraphError> {
        if self.batch_size == 0 {
            return Err(invalid("batch size must be at least 1"));
        }
        if self.branch_filter.is_some() && self.traversal != TraversalKind::Full {
            return Err(invalid("a branch filter only applies to full traversal"));
        }
        if self.path_filter.is_some() && self.traversal != TraversalKind::SinglePath {
            return Err(invalid("a path filter only applies to single-path traversal"));
        }

        match self.traversal {
            TraversalKind::Full => Ok(TraversalMode::Full {
                branch: self.branch_filter.clone(),
            }),
            TraversalKind::SinglePath => {
                let path = self
                    .path_filter
                    .as_deref()
                    .map(normalize_path)
                    .filter(|path| !path.is_empty())
                    .ok_or_else(|| invalid("single-path traversal requires a path filter"))?;
                Ok(TraversalMode::SinglePath { path })
            }
            TraversalKind::AncestryLimited => {
                let start = self
                    .ancestry_start
                    .ok_or_else(|| invalid("ancestry traversal requires a start revision"))?;
                if let Some(floor) = self.ancestry_floor {
                    if floor.is_working() {
                        return Err(invalid("the working state cannot be an ancestry floor"));
                    }
                    if floor > start {
                        return Err(invalid(format!(
                            "ancestry floor {floor} is newer than start {start}"
                        )));
                    }
                }
                Ok(TraversalMode::AncestryLimited {
                    start,
                    floor: self.ancestry_floor,
                })
            }
            TraversalKind::ExplicitList => {
                if self.revisions.is_empty() {
                    return Err(invalid("explicit-list traversal requires revisions"));
                }
                Ok(TraversalMode::ExplicitList {
                    revisions: self.revisions.clone(),
                })
            }
        }
    }
}

fn invalid(reason: impl Into<String>) -> GraphError {
    GraphError::InvalidTraversalConfiguration(reason.into())
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_matches('/').to_string()
}
