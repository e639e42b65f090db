use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use git2::Oid;
use revgraph::git::GitSource;
use revgraph::{BranchId, GraphOptions, IncrementalGraph, Parents, Revision, RevisionSource};

struct History {
    root: Oid,
    mainline: Oid,
    feature: Oid,
    merge: Oid,
}

/// root <- mainline (main) <- merge
/// root <- feature (feature) <-'
fn merged_history(fixture: &TempRepo) -> History {
    write_file(fixture.path().join("a.txt"), "one\n");
    commit_all(fixture.path(), "root");
    let root = head_oid(fixture.path());

    write_file(fixture.path().join("a.txt"), "two\n");
    commit_all(fixture.path(), "mainline");
    let mainline = head_oid(fixture.path());

    run_git(fixture.path(), ["checkout", "-q", "-b", "feature", "HEAD~1"]);
    write_file(fixture.path().join("b.txt"), "feature\n");
    commit_all(fixture.path(), "feature");
    let feature = head_oid(fixture.path());

    run_git(fixture.path(), ["checkout", "-q", "main"]);
    run_git(
        fixture.path(),
        ["merge", "-q", "--no-ff", "feature", "-m", "merge feature"],
    );
    let merge = head_oid(fixture.path());

    History {
        root,
        mainline,
        feature,
        merge,
    }
}

fn revision(source: &GitSource, oid: Oid) -> Revision {
    source
        .revision_of(oid)
        .expect("commit should be numbered by the source")
}

#[test]
fn commits_are_numbered_parents_first() {
    let fixture = TempRepo::new("numbering");
    let history = merged_history(&fixture);
    let source = GitSource::open(fixture.path()).expect("git source should open");

    assert_eq!(source.revision_count(), 4);
    assert!(!source.has_working_state());
    assert_eq!(revision(&source, history.root), Revision::Committed(0));
    assert_eq!(revision(&source, history.merge), Revision::Committed(3));
    assert_eq!(source.head_revision(), Some(Revision::Committed(3)));
    assert_eq!(source.oid_of(Revision::Committed(0)), Some(history.root));

    let merge_parents = source
        .parents(revision(&source, history.merge))
        .expect("merge parents should load");
    assert_eq!(
        merge_parents,
        Parents::two(
            revision(&source, history.mainline),
            revision(&source, history.feature)
        )
    );
    assert_eq!(
        source
            .parents(revision(&source, history.root))
            .expect("root parents should load"),
        Parents::none()
    );

    assert_eq!(
        source
            .summary(revision(&source, history.merge))
            .expect("summary should load"),
        "merge feature"
    );
    assert_eq!(source.short_id(Revision::Committed(0)).len(), 12);
}

#[test]
fn branches_claim_their_first_parent_chains() {
    let fixture = TempRepo::new("branches");
    let history = merged_history(&fixture);
    let source = GitSource::open(fixture.path()).expect("git source should open");

    let branch = |oid| {
        source
            .branch_of(revision(&source, oid))
            .expect("branch should resolve")
    };
    assert_eq!(branch(history.merge), BranchId::new("main"));
    assert_eq!(branch(history.mainline), BranchId::new("main"));
    assert_eq!(branch(history.root), BranchId::new("main"));
    assert_eq!(branch(history.feature), BranchId::new("feature"));
}

#[test]
fn path_changes_compare_against_the_first_parent() {
    let fixture = TempRepo::new("path-changes");
    let history = merged_history(&fixture);
    let source = GitSource::open(fixture.path()).expect("git source should open");

    let changed = |oid, path| {
        source
            .is_ancestor_changed(revision(&source, oid), path)
            .expect("path check should succeed")
    };
    assert!(changed(history.root, "a.txt"));
    assert!(changed(history.mainline, "a.txt"));
    assert!(!changed(history.mainline, "b.txt"));
    assert!(changed(history.feature, "b.txt"));
    assert!(!changed(history.feature, "a.txt"));
    assert!(changed(history.merge, "b.txt"), "merge brings b.txt into main");
    assert!(!changed(history.merge, "a.txt"));
}

#[test]
fn file_history_over_git_follows_the_touching_commits() {
    let fixture = TempRepo::new("file-history");
    let history = merged_history(&fixture);
    let source = GitSource::open(fixture.path()).expect("git source should open");

    let mut graph = IncrementalGraph::new(&source, &GraphOptions::file_history("b.txt"))
        .expect("graph should open");
    graph.build(usize::MAX).expect("graph should build");

    let rows = graph
        .nodes()
        .iter()
        .map(|node| node.revision)
        .collect::<Vec<_>>();
    assert_eq!(rows, vec![
        revision(&source, history.merge),
        revision(&source, history.feature),
    ]);
    assert_eq!(graph.nodes()[0].bottom_lines.len(), 1);
    assert!(graph.nodes()[1].bottom_lines.is_empty());
    assert_eq!(
        graph
            .build_until(revision(&source, history.mainline))
            .expect("build_until should succeed"),
        None
    );
}

#[test]
fn directory_history_includes_nested_files() {
    let fixture = TempRepo::new("directory-history");
    let history = merged_history(&fixture);
    write_file(fixture.path().join("src").join("lib.rs"), "pub fn lib() {}\n");
    commit_all(fixture.path(), "add library");
    let library = head_oid(fixture.path());

    let source = GitSource::open(fixture.path()).expect("git source should open");
    let mut graph = IncrementalGraph::new(&source, &GraphOptions::file_history("src/"))
        .expect("graph should open");
    graph.build(usize::MAX).expect("graph should build");

    assert_eq!(graph.len(), 1);
    assert_eq!(graph.nodes()[0].revision, revision(&source, library));
    assert_eq!(graph.row_of(revision(&source, history.merge)), None);
}

#[test]
fn uncommitted_changes_become_the_working_revision() {
    let fixture = TempRepo::new("working-state");
    let history = merged_history(&fixture);
    write_file(fixture.path().join("a.txt"), "three\n");

    let source = GitSource::open(fixture.path()).expect("git source should open");
    assert!(source.has_working_state());
    assert_eq!(
        source
            .parents(Revision::Working)
            .expect("working parents should load"),
        Parents::one(revision(&source, history.merge))
    );
    assert!(
        source
            .is_ancestor_changed(Revision::Working, "a.txt")
            .expect("working path check should succeed")
    );
    assert!(
        !source
            .is_ancestor_changed(Revision::Working, "b.txt")
            .expect("working path check should succeed")
    );
    assert_eq!(
        source
            .branch_of(Revision::Working)
            .expect("working branch should resolve"),
        BranchId::new("main")
    );
    assert_eq!(source.summary(Revision::Working).expect("summary"), "(uncommitted changes)");

    let mut graph =
        IncrementalGraph::new(&source, &GraphOptions::full()).expect("graph should open");
    graph.build(2).expect("graph should build");
    assert_eq!(graph.nodes()[0].revision, Revision::Working);
    assert_eq!(graph.nodes()[1].revision, revision(&source, history.merge));
}

#[test]
fn fingerprint_tracks_repository_changes() {
    let fixture = TempRepo::new("fingerprint");
    merged_history(&fixture);

    let source = GitSource::open(fixture.path()).expect("git source should open");
    let opened = source.snapshot_token();
    assert_eq!(
        GitSource::fingerprint(fixture.path()).expect("fingerprint should load"),
        opened
    );

    write_file(fixture.path().join("a.txt"), "edited\n");
    let edited = GitSource::fingerprint(fixture.path()).expect("fingerprint should load");
    assert_ne!(edited, opened, "working tree edits change the fingerprint");

    commit_all(fixture.path(), "edit a");
    let committed = GitSource::fingerprint(fixture.path()).expect("fingerprint should load");
    assert_ne!(committed, edited);
    assert_ne!(committed, opened);
}

struct TempRepo {
    path: PathBuf,
}

impl TempRepo {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("revgraph-{prefix}-{unique}"));
        fs::create_dir_all(&path).expect("temp repo directory should be created");

        run_git(&path, ["init", "-q"]);
        run_git(&path, ["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(&path, ["config", "user.email", "revgraph@test.local"]);
        run_git(&path, ["config", "user.name", "Revgraph Test"]);
        run_git(&path, ["config", "commit.gpgsign", "false"]);
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempRepo {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn write_file(path: PathBuf, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directories should be created");
    }
    fs::write(path, contents).expect("file should be written");
}

fn commit_all(cwd: &Path, message: &str) {
    run_git(cwd, ["add", "-A"]);
    run_git(cwd, ["commit", "-q", "-m", message]);
}

fn head_oid(cwd: &Path) -> Oid {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(cwd)
        .output()
        .expect("git rev-parse should run");
    assert!(output.status.success(), "git rev-parse failed");
    let raw = String::from_utf8(output.stdout).expect("commit id should be utf-8");
    Oid::from_str(raw.trim()).expect("commit id should parse")
}

fn run_git<const N: usize>(cwd: &Path, args: [&str; N]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .status()
        .expect("git command should run");
    assert!(status.success(), "git command failed");
}
