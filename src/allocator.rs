use crate::grapher::{GraphStep, NodeExtra};
use crate::revision::Revision;

/// Opaque color handle. The layout emitter resolves it through a palette.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColorToken(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphLine {
    pub from_column: usize,
    pub to_column: usize,
    pub color: ColorToken,
}

impl GraphLine {
    fn new(from_column: usize, to_column: usize, color: ColorToken) -> Self {
        Self {
            from_column,
            to_column,
            color,
        }
    }

    pub fn is_vertical(&self) -> bool {
        self.from_column == self.to_column
    }
}

/// Layout of one row of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub revision: Revision,
    pub column: usize,
    /// Color of the lane the node sits in.
    pub color: ColorToken,
    pub column_count: usize,
    /// From lanes of already emitted children into this node.
    pub top_lines: Vec<GraphLine>,
    /// From this node into the lanes of its parents.
    pub bottom_lines: Vec<GraphLine>,
    /// Lanes crossing the row without touching the node, from their column
    /// above the row to their column below it.
    pub through_lines: Vec<GraphLine>,
    pub extra: NodeExtra,
}

impl GraphNode {
    pub fn is_head(&self) -> bool {
        self.top_lines.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.bottom_lines.len() > 1
    }
}

#[derive(Debug, Clone, Copy)]
struct Lane {
    target: Revision,
    color: ColorToken,
}

/// Assigns columns to revisions as they stream out of a
/// [`Grapher`](crate::grapher::Grapher).
///
/// Each open lane waits for one revision. A revision takes over the lowest
/// lane waiting for it, or a fresh column when none is (a graph head). Its
/// first parent continues in the same column; a second parent joins the lane
/// already waiting for it or opens a new one.
///
/// New lanes open to the right of every lane alive on the row, so a column
/// ending on a row is never handed to an unrelated lineage on that same row.
/// Once the row is placed, the lanes right of a freed column move left to
/// close the gap; the move shows up as a diagonal through line. Between rows
/// the lanes are therefore always packed into `0..open_lanes()`.
#[derive(Debug, Default)]
pub struct ColumnAllocator {
    lanes: Vec<Option<Lane>>,
    next_color: u32,
}

impl ColumnAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&mut self, step: GraphStep) -> GraphNode {
        self.place_with_colors(step, &[])
    }

    /// Like [`place`](Self::place), but lanes opened for the listed revisions
    /// take the given color instead of the next lineage color.
    pub fn place_with_colors(
        &mut self,
        step: GraphStep,
        colors: &[(Revision, ColorToken)],
    ) -> GraphNode {
        let GraphStep {
            revision,
            parents,
            extra,
        } = step;
        let width_above = self.lanes.len();

        let converging = self
            .lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| lane.is_some_and(|lane| lane.target == revision))
            .map(|(column, _)| column)
            .collect::<Vec<_>>();

        let (column, color, top_lines) = match converging.first() {
            Some(&column) => {
                let mut top_lines = Vec::with_capacity(converging.len());
                let mut color = ColorToken::default();
                for &lane_column in &converging {
                    let Some(lane) = self.lanes[lane_column].take() else {
                        continue;
                    };
                    if lane_column == column {
                        color = lane.color;
                    }
                    top_lines.push(GraphLine::new(lane_column, column, lane.color));
                }
                (column, color, top_lines)
            }
            None => {
                let column = self.open_column();
                let color = self.lane_color(revision, colors);
                (column, color, Vec::new())
            }
        };

        let passing = self
            .lanes
            .iter()
            .enumerate()
            .filter_map(|(lane_column, lane)| lane.map(|lane| (lane_column, lane.color)))
            .collect::<Vec<_>>();

        let mut bottom_targets = Vec::with_capacity(parents.len());
        match parents.first() {
            Some(first) => {
                self.lanes[column] = Some(Lane {
                    target: first,
                    color,
                });
                bottom_targets.push((column, color));
            }
            None => self.lanes[column] = None,
        }

        if let Some(second) = parents.second() {
            let target = match self.lane_waiting_for(second) {
                Some((lane_column, lane)) => (lane_column, lane.color),
                None => {
                    let lane_column = self.open_column();
                    let lane_color = self.lane_color(second, colors);
                    self.lanes[lane_column] = Some(Lane {
                        target: second,
                        color: lane_color,
                    });
                    (lane_column, lane_color)
                }
            };
            bottom_targets.push(target);
        }

        let shifted = self.compact();
        let through_lines = passing
            .into_iter()
            .map(|(lane_column, color)| GraphLine::new(lane_column, shifted[lane_column], color))
            .collect();
        let bottom_lines = bottom_targets
            .into_iter()
            .map(|(lane_column, color)| GraphLine::new(column, shifted[lane_column], color))
            .collect();

        GraphNode {
            revision,
            column,
            color,
            column_count: width_above
                .max(self.lanes.len())
                .max(column.saturating_add(1)),
            top_lines,
            bottom_lines,
            through_lines,
            extra,
        }
    }

    /// Number of lanes still waiting for a revision.
    pub fn open_lanes(&self) -> usize {
        self.lanes.iter().filter(|lane| lane.is_some()).count()
    }

    /// `(column, awaited revision)` for every open lane, left to right.
    pub fn pending_targets(&self) -> Vec<(usize, Revision)> {
        self.lanes
            .iter()
            .enumerate()
            .filter_map(|(column, lane)| lane.map(|lane| (column, lane.target)))
            .collect()
    }

    fn lane_waiting_for(&self, revision: Revision) -> Option<(usize, Lane)> {
        self.lanes
            .iter()
            .enumerate()
            .find_map(|(column, lane)| {
                lane.filter(|lane| lane.target == revision)
                    .map(|lane| (column, lane))
            })
    }

    fn open_column(&mut self) -> usize {
        self.lanes.push(None);
        self.lanes.len().saturating_sub(1)
    }

    /// Drops the lanes that closed on this row and returns, for every column
    /// the row used, the column its lane continues in below the row.
    fn compact(&mut self) -> Vec<usize> {
        let mut shifted = Vec::with_capacity(self.lanes.len());
        let mut open = 0;
        for lane in &self.lanes {
            shifted.push(open);
            if lane.is_some() {
                open += 1;
            }
        }
        self.lanes.retain(Option::is_some);
        shifted
    }

    fn lane_color(
        &mut self,
        revision: Revision,
        colors: &[(Revision, ColorToken)],
    ) -> ColorToken {
        if let Some((_, color)) = colors.iter().find(|(candidate, _)| *candidate == revision) {
            return *color;
        }
        let color = ColorToken(self.next_color);
        self.next_color = self.next_color.wrapping_add(1);
        color
    }
}
