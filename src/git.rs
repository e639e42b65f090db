use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use git2::{BranchType, DiffOptions, Oid, Repository, RepositoryState, Sort, StatusOptions};
use tracing::debug;

use crate::error::SourceError;
use crate::revision::{BranchId, Parents, Revision, SnapshotToken};
use crate::source::{RevisionSource, path_matches};

#[derive(Debug, Clone)]
struct WorkingState {
    parents: Parents,
    changed_paths: BTreeSet<String>,
}

/// A [`RevisionSource`] over a git repository.
///
/// Every commit reachable from local branches, tags and HEAD is numbered
/// parents-first when the source is opened. Octopus merges keep their first
/// two parents. Tree contents are read on demand.
pub struct GitSource {
    repo: Repository,
    root: PathBuf,
    oids: Vec<Oid>,
    ordinals: HashMap<Oid, usize>,
    parents: Vec<Parents>,
    branches: Vec<Option<BranchId>>,
    working: Option<WorkingState>,
    token: SnapshotToken,
}

impl GitSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut repo = Repository::discover(path).context("failed to discover git repository")?;
        let root = repo_root(&repo)?;

        let oids = ordered_commit_ids(&repo)?;
        let ordinals = oids
            .iter()
            .enumerate()
            .map(|(ordinal, oid)| (*oid, ordinal))
            .collect::<HashMap<_, _>>();
        let parents = oids
            .iter()
            .map(|oid| commit_parents(&repo, *oid, &ordinals))
            .collect::<Result<Vec<_>>>()?;
        let branches = attribute_branches(&repo, &ordinals, &parents)?;
        let working = load_working_state(&mut repo, &ordinals)?;
        let token = fingerprint_repo(&repo)?;

        debug!(
            "loaded {} commits from {} (working state: {})",
            oids.len(),
            root.display(),
            working.is_some()
        );

        Ok(Self {
            repo,
            root,
            oids,
            ordinals,
            parents,
            branches,
            working,
            token,
        })
    }

    /// Cheap check for whether the repository behind `path` still matches an
    /// opened source: compare against [`RevisionSource::snapshot_token`].
    pub fn fingerprint(path: &Path) -> Result<SnapshotToken> {
        let repo = Repository::discover(path).context("failed to discover git repository")?;
        fingerprint_repo(&repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn oid_of(&self, revision: Revision) -> Option<Oid> {
        revision
            .ordinal()
            .and_then(|ordinal| self.oids.get(ordinal))
            .copied()
    }

    pub fn revision_of(&self, oid: Oid) -> Option<Revision> {
        self.ordinals.get(&oid).copied().map(Revision::Committed)
    }

    /// The revision HEAD points at, if HEAD is born.
    pub fn head_revision(&self) -> Option<Revision> {
        let oid = self.repo.head().ok()?.target()?;
        self.revision_of(oid)
    }

    pub fn short_id(&self, revision: Revision) -> String {
        match self.oid_of(revision) {
            Some(oid) => oid.to_string().chars().take(12).collect(),
            None => revision.to_string(),
        }
    }

    pub fn summary(&self, revision: Revision) -> Result<String> {
        let Some(oid) = self.oid_of(revision) else {
            return Ok("(uncommitted changes)".to_string());
        };
        let commit = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("failed to load commit {oid}"))?;
        Ok(commit
            .summary()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
            .unwrap_or("(no description)")
            .to_string())
    }

    fn committed_oid(&self, revision: Revision) -> Result<Oid, SourceError> {
        self.oid_of(revision).ok_or(SourceError::Unknown(revision))
    }

    fn commit_changes_path(&self, oid: Oid, path: &str) -> Result<bool> {
        let commit = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("failed to load commit {oid}"))?;
        let tree = commit
            .tree()
            .with_context(|| format!("failed to load tree of {oid}"))?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(
                parent
                    .tree()
                    .with_context(|| format!("failed to load parent tree of {oid}"))?,
            ),
            Err(_) => None,
        };

        let mut options = DiffOptions::new();
        options.pathspec(path);
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut options))
            .with_context(|| format!("failed to diff commit {oid} for {path}"))?;
        Ok(diff.deltas().len() > 0)
    }
}

impl RevisionSource for GitSource {
    fn revision_count(&self) -> usize {
        self.oids.len()
    }

    fn has_working_state(&self) -> bool {
        self.working.is_some()
    }

    fn parents(&self, revision: Revision) -> Result<Parents, SourceError> {
        match revision {
            Revision::Committed(ordinal) => self
                .parents
                .get(ordinal)
                .copied()
                .ok_or(SourceError::Unknown(revision)),
            Revision::Working => self
                .working
                .as_ref()
                .map(|working| working.parents)
                .ok_or(SourceError::Unknown(revision)),
        }
    }

    fn is_ancestor_changed(&self, revision: Revision, path: &str) -> Result<bool, SourceError> {
        if revision.is_working() {
            let working = self
                .working
                .as_ref()
                .ok_or(SourceError::Unknown(revision))?;
            return Ok(working
                .changed_paths
                .iter()
                .any(|changed| path_matches(changed, path)));
        }
        let oid = self.committed_oid(revision)?;
        Ok(self.commit_changes_path(oid, path)?)
    }

    fn branch_of(&self, revision: Revision) -> Result<BranchId, SourceError> {
        let revision = match revision {
            Revision::Working => {
                let working = self
                    .working
                    .as_ref()
                    .ok_or(SourceError::Unknown(revision))?;
                match working.parents.first() {
                    Some(parent) => parent,
                    None => return Ok(BranchId::detached()),
                }
            }
            committed => committed,
        };
        let ordinal = revision.ordinal().ok_or(SourceError::Unknown(revision))?;
        self.branches
            .get(ordinal)
            .map(|branch| branch.clone().unwrap_or_else(BranchId::detached))
            .ok_or(SourceError::Unknown(revision))
    }

    fn snapshot_token(&self) -> SnapshotToken {
        self.token
    }
}

fn repo_root(repo: &Repository) -> Result<PathBuf> {
    if let Some(workdir) = repo.workdir() {
        return Ok(workdir.to_path_buf());
    }

    repo.path()
        .parent()
        .map(|path| path.to_path_buf())
        .context("failed to resolve repository root")
}

fn ordered_commit_ids(repo: &Repository) -> Result<Vec<Oid>> {
    let mut walk = repo.revwalk().context("failed to start revision walk")?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
        .context("failed to configure revision walk")?;
    walk.push_glob("refs/heads/*")
        .context("failed to walk local branches")?;
    walk.push_glob("refs/tags/*")
        .context("failed to walk tags")?;
    if repo.head().is_ok() {
        walk.push_head().context("failed to walk HEAD")?;
    }

    walk.map(|oid| oid.context("failed to read commit during revision walk"))
        .collect()
}

fn commit_parents(
    repo: &Repository,
    oid: Oid,
    ordinals: &HashMap<Oid, usize>,
) -> Result<Parents> {
    let commit = repo
        .find_commit(oid)
        .with_context(|| format!("failed to load commit {oid}"))?;
    let parents = commit
        .parent_ids()
        .map(|parent_id| {
            ordinals
                .get(&parent_id)
                .copied()
                .map(Revision::Committed)
                .ok_or_else(|| anyhow!("parent {parent_id} of {oid} was not walked"))
        })
        .take(2)
        .collect::<Result<Vec<_>>>()?;
    Ok(Parents::from_slice(&parents))
}

/// Each commit belongs to the first local branch whose first-parent chain
/// reaches it. HEAD's branch claims first, the rest in name order.
fn attribute_branches(
    repo: &Repository,
    ordinals: &HashMap<Oid, usize>,
    parents: &[Parents],
) -> Result<Vec<Option<BranchId>>> {
    let mut tips = Vec::new();
    for branch in repo
        .branches(Some(BranchType::Local))
        .context("failed to list local branches")?
    {
        let (branch, _) = branch.context("failed to read local branch")?;
        let Some(name) = branch.name().context("failed to read branch name")? else {
            continue;
        };
        let Some(ordinal) = branch
            .get()
            .target()
            .and_then(|oid| ordinals.get(&oid).copied())
        else {
            continue;
        };
        tips.push((name.to_string(), ordinal));
    }

    let head_branch = repo
        .head()
        .ok()
        .filter(|head| head.is_branch())
        .and_then(|head| head.shorthand().map(str::to_string));
    tips.sort_by(|left, right| {
        let left_is_head = head_branch.as_deref() == Some(left.0.as_str());
        let right_is_head = head_branch.as_deref() == Some(right.0.as_str());
        right_is_head
            .cmp(&left_is_head)
            .then_with(|| left.0.cmp(&right.0))
    });

    let mut branches = vec![None; parents.len()];
    for (name, tip) in tips {
        let branch = BranchId::new(name);
        let mut cursor = Some(tip);
        while let Some(ordinal) = cursor {
            if branches[ordinal].is_some() {
                break;
            }
            branches[ordinal] = Some(branch.clone());
            cursor = parents[ordinal].first().and_then(Revision::ordinal);
        }
    }
    Ok(branches)
}

fn load_working_state(
    repo: &mut Repository,
    ordinals: &HashMap<Oid, usize>,
) -> Result<Option<WorkingState>> {
    let changed_paths = working_changes(repo)?;
    if changed_paths.is_empty() {
        return Ok(None);
    }

    let mut parent_ids = Vec::new();
    if let Some(head) = repo.head().ok().and_then(|head| head.target()) {
        parent_ids.push(head);
    }
    if repo.state() == RepositoryState::Merge {
        repo.mergehead_foreach(|oid| {
            parent_ids.push(*oid);
            true
        })
        .context("failed to read MERGE_HEAD")?;
    }

    let parents = parent_ids
        .iter()
        .filter_map(|oid| ordinals.get(oid).copied().map(Revision::Committed))
        .collect::<Vec<_>>();
    Ok(Some(WorkingState {
        parents: Parents::from_slice(&parents),
        changed_paths,
    }))
}

fn working_changes(repo: &Repository) -> Result<BTreeSet<String>> {
    if repo.is_bare() {
        return Ok(BTreeSet::new());
    }

    let mut options = StatusOptions::new();
    options
        .include_untracked(false)
        .include_ignored(false)
        .renames_head_to_index(true)
        .include_unmodified(false);
    let statuses = repo
        .statuses(Some(&mut options))
        .context("failed to load repository status")?;

    Ok(statuses
        .iter()
        .filter_map(|entry| entry.path().map(normalize_path))
        .filter(|path| !path.is_empty())
        .collect())
}

fn fingerprint_repo(repo: &Repository) -> Result<SnapshotToken> {
    let mut hasher = DefaultHasher::new();

    let head = repo.head().ok();
    head.as_ref()
        .and_then(|head| head.name().map(str::to_string))
        .hash(&mut hasher);
    head.as_ref()
        .and_then(|head| head.target())
        .map(|oid| oid.to_string())
        .hash(&mut hasher);

    let mut refs = Vec::new();
    for reference in repo.references().context("failed to list references")? {
        let reference = reference.context("failed to read reference")?;
        let Some(name) = reference.name() else {
            continue;
        };
        refs.push((
            name.to_string(),
            reference.target().map(|oid| oid.to_string()),
        ));
    }
    refs.sort();
    refs.hash(&mut hasher);

    working_changes(repo)?.hash(&mut hasher);
    Ok(SnapshotToken(hasher.finish()))
}

fn normalize_path(path: &str) -> String {
    path.trim().trim_end_matches('/').to_string()
}
