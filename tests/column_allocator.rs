use revgraph::{
    ColorToken, ColumnAllocator, GraphLine, GraphNode, GraphStep, NodeExtra, Parents, Revision,
};

fn rev(ordinal: usize) -> Revision {
    Revision::Committed(ordinal)
}

fn step(revision: usize, parents: &[usize]) -> GraphStep {
    let parents = parents.iter().copied().map(rev).collect::<Vec<_>>();
    GraphStep {
        revision: rev(revision),
        parents: Parents::from_slice(&parents),
        extra: NodeExtra::None,
    }
}

fn line(from_column: usize, to_column: usize, color: u32) -> GraphLine {
    GraphLine {
        from_column,
        to_column,
        color: ColorToken(color),
    }
}

fn place_all(steps: Vec<GraphStep>) -> Vec<GraphNode> {
    let mut allocator = ColumnAllocator::new();
    steps.into_iter().map(|step| allocator.place(step)).collect()
}

#[test]
fn linear_history_stays_in_first_column() {
    let nodes = place_all(vec![step(3, &[2]), step(2, &[1]), step(1, &[0]), step(0, &[])]);

    assert_eq!(nodes.len(), 4);
    assert!(nodes.iter().all(|node| node.column == 0));
    assert!(nodes.iter().all(|node| node.column_count == 1));
    assert!(nodes[0].top_lines.is_empty(), "newest row is a graph head");
    for node in &nodes[1..] {
        assert_eq!(node.top_lines, vec![line(0, 0, 0)]);
    }
    for node in &nodes[..3] {
        assert_eq!(node.bottom_lines, vec![line(0, 0, 0)]);
    }
    assert!(nodes[3].bottom_lines.is_empty(), "root row has no parents");
    assert!(nodes.iter().all(|node| node.through_lines.is_empty()));
}

#[test]
fn merge_opens_a_second_column_for_the_second_parent() {
    let nodes = place_all(vec![step(3, &[2]), step(2, &[0, 1]), step(1, &[]), step(0, &[])]);

    let tip = &nodes[0];
    assert_eq!(tip.revision, rev(3));
    assert_eq!(tip.column, 0);
    assert!(tip.top_lines.is_empty());

    let merge = &nodes[1];
    assert_eq!(merge.revision, rev(2));
    assert_eq!(merge.column, 0);
    assert!(merge.is_merge());
    assert_eq!(merge.bottom_lines, vec![line(0, 0, 0), line(0, 1, 1)]);
    assert_eq!(merge.column_count, 2);

    let second_parent = &nodes[2];
    assert_eq!(second_parent.revision, rev(1));
    assert_eq!(second_parent.column, 1);
    assert_eq!(second_parent.color, ColorToken(1));
    assert_eq!(second_parent.top_lines, vec![line(1, 1, 1)]);
    assert_eq!(second_parent.through_lines, vec![line(0, 0, 0)]);
    assert!(second_parent.bottom_lines.is_empty());
    assert_eq!(second_parent.column_count, 2);

    let first_parent = &nodes[3];
    assert_eq!(first_parent.revision, rev(0));
    assert_eq!(first_parent.column, 0);
    assert!(first_parent.bottom_lines.is_empty());
    assert_eq!(first_parent.column_count, 1);
}

#[test]
fn converging_lanes_continue_in_the_lowest_column() {
    // 3 -> 1 -> 0 and 2 -> 0
    let nodes = place_all(vec![step(3, &[1]), step(2, &[0]), step(1, &[0]), step(0, &[])]);

    assert_eq!(nodes[1].revision, rev(2));
    assert_eq!(nodes[1].column, 1, "second head opens a new column");
    assert!(nodes[1].top_lines.is_empty());
    assert_eq!(nodes[1].through_lines, vec![line(0, 0, 0)]);

    let root = &nodes[3];
    assert_eq!(root.column, 0);
    assert_eq!(root.top_lines, vec![line(0, 0, 0), line(1, 0, 1)]);
    assert_eq!(root.column_count, 2);
}

#[test]
fn second_parent_opens_right_of_lanes_ending_on_the_row() {
    // 5 and 4 both point at merge 3, whose parents are roots 1 and 2.
    let nodes = place_all(vec![
        step(5, &[3]),
        step(4, &[3]),
        step(3, &[1, 2]),
        step(2, &[]),
        step(1, &[]),
    ]);

    let merge = &nodes[2];
    assert_eq!(merge.column, 0);
    assert_eq!(merge.top_lines, vec![line(0, 0, 0), line(1, 0, 1)]);
    assert_eq!(
        merge.bottom_lines,
        vec![line(0, 0, 0), line(0, 1, 2)],
        "the new lane takes the color of a new lineage, not of the lane that ended"
    );
    assert_eq!(merge.column_count, 2);

    assert_eq!(nodes[3].column, 1);
    assert_eq!(nodes[3].through_lines, vec![line(0, 0, 0)]);
    assert_eq!(nodes[4].column, 0);
    assert_eq!(nodes[4].column_count, 1);
}

#[test]
fn lanes_shift_left_when_a_lower_column_closes() {
    // Two roots: 3 -> 1 and 2 -> 0.
    let nodes = place_all(vec![step(3, &[1]), step(2, &[0]), step(1, &[]), step(0, &[])]);

    assert_eq!(nodes[1].column, 1);
    let closing_root = &nodes[2];
    assert_eq!(closing_root.column, 0);
    assert!(closing_root.bottom_lines.is_empty());
    assert_eq!(
        closing_root.through_lines,
        vec![line(1, 0, 1)],
        "lane waiting for 0 moves into the freed column"
    );
    assert!(!closing_root.through_lines[0].is_vertical());
    assert_eq!(closing_root.column_count, 2);

    let last = &nodes[3];
    assert_eq!(last.column, 0);
    assert_eq!(last.top_lines, vec![line(0, 0, 1)]);
    assert_eq!(last.column_count, 1);
}

#[test]
fn long_chain_moves_left_once_its_neighbour_ends() {
    // 8 -> 1 (a root), and the chain 7 -> 6 -> ... -> 2 -> 0.
    let mut steps = vec![step(8, &[1]), step(7, &[6])];
    steps.extend((3..=6).rev().map(|revision| step(revision, &[revision - 1])));
    steps.extend([step(2, &[0]), step(1, &[]), step(0, &[])]);
    let nodes = place_all(steps);

    for node in &nodes[1..7] {
        assert_eq!(node.column, 1, "chain sits beside the open lane for 1");
        assert_eq!(node.column_count, 2);
    }
    let root = &nodes[7];
    assert_eq!(root.revision, rev(1));
    assert_eq!(root.through_lines, vec![line(1, 0, 1)]);

    let chain_end = &nodes[8];
    assert_eq!(chain_end.revision, rev(0));
    assert_eq!(chain_end.column, 0);
    assert_eq!(chain_end.column_count, 1);
}

#[test]
fn heads_open_past_every_live_lane() {
    let mut allocator = ColumnAllocator::new();
    allocator.place(step(6, &[2]));
    allocator.place(step(5, &[3]));
    let merge_in = allocator.place(step(4, &[2]));
    assert_eq!(merge_in.column, 2);
    assert_eq!(allocator.open_lanes(), 3);
    assert_eq!(
        allocator.pending_targets(),
        vec![(0, rev(2)), (1, rev(3)), (2, rev(2))]
    );

    let middle = allocator.place(step(3, &[]));
    assert_eq!(middle.column, 1);
    assert_eq!(middle.through_lines, vec![line(0, 0, 0), line(2, 1, 2)]);
    assert_eq!(allocator.pending_targets(), vec![(0, rev(2)), (1, rev(2))]);
}

#[test]
fn columns_freed_by_a_root_are_reused_on_the_next_row() {
    let mut allocator = ColumnAllocator::new();
    let first_root = allocator.place(step(4, &[]));
    let next_head = allocator.place(step(3, &[2]));

    assert_eq!(first_root.column, 0);
    assert_eq!(next_head.column, 0);
    assert_eq!(allocator.open_lanes(), 1);
    assert_eq!(allocator.pending_targets(), vec![(0, rev(2))]);
}

#[test]
fn second_parent_joins_a_lane_already_waiting_for_it() {
    // 4 -> 1, and merge 3 -> (2, 1)
    let nodes = place_all(vec![step(4, &[1]), step(3, &[2, 1]), step(2, &[1]), step(1, &[])]);

    let merge = &nodes[1];
    assert_eq!(merge.column, 1);
    assert_eq!(merge.bottom_lines, vec![line(1, 1, 1), line(1, 0, 0)]);

    let shared_parent = &nodes[3];
    assert_eq!(shared_parent.column, 0);
    assert_eq!(shared_parent.top_lines, vec![line(0, 0, 0), line(1, 0, 1)]);
}

#[test]
fn explicit_colors_override_lineage_colors() {
    let mut allocator = ColumnAllocator::new();
    let node = allocator.place_with_colors(step(3, &[2, 1]), &[
        (rev(3), ColorToken(7)),
        (rev(1), ColorToken(9)),
    ]);

    assert_eq!(node.color, ColorToken(7));
    assert_eq!(node.bottom_lines, vec![line(0, 0, 7), line(0, 1, 9)]);

    let plain = allocator.place(step(2, &[]));
    assert_eq!(plain.color, ColorToken(7), "continuation keeps its lane color");
}
