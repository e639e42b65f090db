use std::env;
use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow, bail};
use revgraph::config::{ConfigStore, GraphConfig};
use revgraph::git::GitSource;
use revgraph::{BranchId, GraphNode, IncrementalGraph, Revision, RevisionSource, TraversalKind};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

const DEFAULT_ROWS: usize = 50;
const USAGE: &str =
    "usage: revgraph [REPO] [--file PATH] [--branch NAME] [--ancestors-of N] [--rows N]";

#[derive(Debug)]
struct CliArgs {
    repo: PathBuf,
    file: Option<String>,
    branch: Option<String>,
    ancestors_of: Option<usize>,
    rows: usize,
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args(env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };
    run(args)
}

fn run(args: CliArgs) -> Result<()> {
    let config = match ConfigStore::new().and_then(|store| store.load_or_create_default()) {
        Ok(config) => config,
        Err(err) => {
            warn!("using default graph config: {err:#}");
            GraphConfig::default()
        }
    };

    let source = GitSource::open(&args.repo)?;
    info!(
        "opened {} with {} revisions",
        source.root().display(),
        source.revision_count()
    );

    let mut options = config.graph_options();
    if let Some(path) = args.file {
        options.traversal = TraversalKind::SinglePath;
        options.path_filter = Some(path);
    }
    if let Some(branch) = args.branch {
        options.branch_filter = Some(BranchId::new(branch));
    }
    if let Some(ordinal) = args.ancestors_of {
        options.traversal = TraversalKind::AncestryLimited;
        options.ancestry_start = Some(Revision::Committed(ordinal));
    }

    let mut graph = IncrementalGraph::new(&source, &options)?;
    while graph.len() < args.rows && !graph.is_exhausted() {
        graph.build_batch()?;
    }

    let width = graph_width(&graph, args.rows);
    for node in graph.nodes().iter().take(args.rows) {
        let branch = source.branch_of(node.revision)?;
        let summary = source.summary(node.revision)?;
        println!(
            "{:<width$} {:>7} {:<12} {:<16} {}",
            lane_glyphs(node),
            node.revision.to_string(),
            source.short_id(node.revision),
            branch.as_str(),
            summary,
        );
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<CliArgs>> {
    let mut parsed = CliArgs {
        repo: PathBuf::from("."),
        file: None,
        branch: None,
        ancestors_of: None,
        rows: DEFAULT_ROWS,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--file" => parsed.file = Some(flag_value(&arg, args.next())?),
            "--branch" => parsed.branch = Some(flag_value(&arg, args.next())?),
            "--ancestors-of" => {
                let value = flag_value(&arg, args.next())?;
                parsed.ancestors_of = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid revision ordinal '{value}'"))?,
                );
            }
            "--rows" => {
                let value = flag_value(&arg, args.next())?;
                parsed.rows = value
                    .parse()
                    .with_context(|| format!("invalid row count '{value}'"))?;
            }
            flag if flag.starts_with('-') => bail!("unknown flag {flag}\n{USAGE}"),
            path => parsed.repo = PathBuf::from(path),
        }
    }
    Ok(Some(parsed))
}

fn flag_value(flag: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| anyhow!("{flag} expects a value"))
}

fn graph_width<S: RevisionSource>(graph: &IncrementalGraph<S>, rows: usize) -> usize {
    graph
        .nodes()
        .iter()
        .take(rows)
        .map(|node| node.column_count * 2)
        .max()
        .unwrap_or(1)
}

fn lane_glyphs(node: &GraphNode) -> String {
    let mut cells = vec![' '; node.column_count * 2];
    for line in &node.through_lines {
        if line.is_vertical() {
            cells[line.from_column * 2] = '|';
        } else {
            cells[line.to_column * 2 + 1] = '/';
        }
    }
    for line in node.top_lines.iter().chain(&node.bottom_lines) {
        let other = if line.from_column == node.column {
            line.to_column
        } else {
            line.from_column
        };
        if other != node.column {
            cells[other * 2] = if other > node.column { '\\' } else { '/' };
        }
    }
    cells[node.column * 2] = if node.revision.is_working() { '@' } else { 'o' };
    cells.into_iter().collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use revgraph::{ColorToken, GraphLine, NodeExtra};

    use super::*;

    fn row(column: usize, column_count: usize, through_lines: Vec<GraphLine>) -> GraphNode {
        GraphNode {
            revision: Revision::Committed(1),
            column,
            color: ColorToken(0),
            column_count,
            top_lines: Vec::new(),
            bottom_lines: Vec::new(),
            through_lines,
            extra: NodeExtra::None,
        }
    }

    fn through(from_column: usize, to_column: usize) -> GraphLine {
        GraphLine {
            from_column,
            to_column,
            color: ColorToken(1),
        }
    }

    #[test]
    fn lane_glyphs_draw_straight_and_shifted_lanes() {
        assert_eq!(lane_glyphs(&row(1, 2, vec![through(0, 0)])), "| o");
        assert_eq!(lane_glyphs(&row(0, 2, vec![through(1, 0)])), "o/");
    }
}
