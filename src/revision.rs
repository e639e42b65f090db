use std::fmt;

/// A point in history.
///
/// Committed revisions are numbered in creation order, so a parent always has a
/// smaller ordinal than its children. `Working` is the uncommitted working
/// state; it sorts after every committed revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Revision {
    Committed(usize),
    Working,
}

impl Revision {
    pub fn ordinal(self) -> Option<usize> {
        match self {
            Self::Committed(ordinal) => Some(ordinal),
            Self::Working => None,
        }
    }

    pub fn is_working(self) -> bool {
        matches!(self, Self::Working)
    }
}

impl From<usize> for Revision {
    fn from(ordinal: usize) -> Self {
        Self::Committed(ordinal)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed(ordinal) => write!(f, "{ordinal}"),
            Self::Working => f.write_str("working"),
        }
    }
}

/// Up to two parents, first parent first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Parents {
    first: Option<Revision>,
    second: Option<Revision>,
}

impl Parents {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn one(parent: Revision) -> Self {
        Self {
            first: Some(parent),
            second: None,
        }
    }

    pub fn two(first: Revision, second: Revision) -> Self {
        if first == second {
            return Self::one(first);
        }
        Self {
            first: Some(first),
            second: Some(second),
        }
    }

    pub fn from_slice(parents: &[Revision]) -> Self {
        match parents {
            [] => Self::none(),
            [first] => Self::one(*first),
            [first, second, ..] => Self::two(*first, *second),
        }
    }

    pub fn first(&self) -> Option<Revision> {
        self.first
    }

    pub fn second(&self) -> Option<Revision> {
        self.second
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    pub fn contains(&self, revision: Revision) -> bool {
        self.iter().any(|parent| parent == revision)
    }

    pub fn iter(&self) -> impl Iterator<Item = Revision> + '_ {
        self.first.into_iter().chain(self.second)
    }

    pub fn to_vec(&self) -> Vec<Revision> {
        self.iter().collect()
    }
}

/// Name of a line of development ("default", "main", a bookmark...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(String);

const DETACHED_BRANCH: &str = "detached";

impl BranchId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn detached() -> Self {
        Self(DETACHED_BRANCH.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_detached(&self) -> bool {
        self.0 == DETACHED_BRANCH
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BranchId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Changes whenever the history behind a source mutates. Graphs compare tokens
/// to decide whether they must be rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SnapshotToken(pub u64);

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
