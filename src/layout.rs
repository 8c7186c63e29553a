use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::{GraphNode, NodeKind};
use crate::{COLUMN_FRACTIONS, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, Point};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 36.0,
            right: 200.0,
            bottom: 36.0,
            left: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
    #[serde(alias = "margins")]
    pub margin: Margins,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            margin: Margins::default(),
        }
    }
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Width used for layout; unmeasured surfaces report 0 or NaN.
    pub fn effective_width(&self) -> f32 {
        usable_extent(self.width, DEFAULT_CANVAS_WIDTH)
    }

    pub fn effective_height(&self) -> f32 {
        usable_extent(self.height, DEFAULT_CANVAS_HEIGHT)
    }

    pub fn inner_width(&self) -> f32 {
        (self.effective_width() - self.margin.left - self.margin.right).max(0.0)
    }

    /// Vertical band `(top, bottom)` nodes are placed in.
    pub fn band(&self) -> (f32, f32) {
        let top = self.margin.top;
        let bottom = (self.effective_height() - self.margin.bottom).max(top);
        (top, bottom)
    }

    pub fn column_x(&self, kind: NodeKind) -> f32 {
        self.margin.left + COLUMN_FRACTIONS[kind.column()] * self.inner_width()
    }
}

fn usable_extent(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value >= 1.0 {
        value
    } else {
        fallback
    }
}

/// Position of row `index` out of `count` rows spread over `[top, bottom]`.
/// A lone row (and the degenerate empty column) sits at the band center.
pub fn row_y(index: usize, count: usize, top: f32, bottom: f32) -> f32 {
    if count <= 1 {
        return (top + bottom) / 2.0;
    }
    top + (index as f32) * (bottom - top) / ((count - 1) as f32)
}

/// Offset of obligation `index` out of `count` around its rule's row.
pub fn cluster_offset(index: usize, count: usize, row_gap: f32) -> f32 {
    (index as f32 - (count.saturating_sub(1)) as f32 / 2.0) * row_gap
}

/// Assigns column x and row y to every node.
///
/// Derived facts and rules are spread evenly down their columns in input
/// order; obligations cluster around the row of the rule named in
/// `GraphNode::parent`, clamped to the canvas band.
pub fn layout(mut nodes: Vec<GraphNode>, canvas: &Canvas, row_gap: f32) -> Vec<GraphNode> {
    let (top, bottom) = canvas.band();

    let count_of = |kind: NodeKind| nodes.iter().filter(|node| node.kind == kind).count();
    let derived_count = count_of(NodeKind::DerivedFact);
    let rule_count = count_of(NodeKind::Rule);

    let mut obligation_counts: HashMap<String, usize> = HashMap::new();
    for node in nodes.iter().filter(|node| node.kind == NodeKind::Obligation) {
        *obligation_counts
            .entry(node.parent.clone().unwrap_or_default())
            .or_insert(0) += 1;
    }

    let mut derived_index = 0;
    let mut rule_index = 0;
    let mut rule_rows: HashMap<String, f32> = HashMap::new();
    let mut obligation_index: HashMap<String, usize> = HashMap::new();

    for node in &mut nodes {
        let x = canvas.column_x(node.kind);
        let y = match node.kind {
            NodeKind::DerivedFact => {
                derived_index += 1;
                row_y(derived_index - 1, derived_count, top, bottom)
            }
            NodeKind::Rule => {
                rule_index += 1;
                let y = row_y(rule_index - 1, rule_count, top, bottom);
                rule_rows.insert(node.id.clone(), y);
                y
            }
            NodeKind::Obligation => {
                let parent = node.parent.clone().unwrap_or_default();
                let anchor = rule_rows
                    .get(&parent)
                    .copied()
                    .unwrap_or((top + bottom) / 2.0);
                let count = obligation_counts.get(&parent).copied().unwrap_or(1);
                let index = obligation_index.entry(parent).or_insert(0);
                let y = anchor + cluster_offset(*index, count, row_gap);
                *index += 1;
                y.clamp(top, bottom)
            }
        };
        node.position = Point { x, y };
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind, parent: Option<&str>) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: id.to_string(),
            kind,
            position: Point::default(),
            parent: parent.map(str::to_string),
        }
    }

    #[test]
    fn rows_are_evenly_spaced() {
        assert_eq!(row_y(0, 3, 0.0, 100.0), 0.0);
        assert_eq!(row_y(1, 3, 0.0, 100.0), 50.0);
        assert_eq!(row_y(2, 3, 0.0, 100.0), 100.0);
    }

    #[test]
    fn single_and_empty_columns_are_centered() {
        assert_eq!(row_y(0, 1, 36.0, 384.0), 210.0);
        assert_eq!(row_y(0, 0, 36.0, 384.0), 210.0);
    }

    #[test]
    fn cluster_offsets_are_symmetric() {
        let offsets: Vec<_> = (0..3).map(|j| cluster_offset(j, 3, 20.0)).collect();
        assert_eq!(offsets, vec![-20.0, 0.0, 20.0]);
        assert_eq!(cluster_offset(0, 1, 20.0), 0.0);
        assert_eq!(cluster_offset(0, 0, 20.0), 0.0);
    }

    #[test]
    fn columns_span_inner_width() {
        let canvas = Canvas::new(1000.0, 400.0);
        let inner = 1000.0 - canvas.margin.left - canvas.margin.right;
        assert_eq!(canvas.column_x(NodeKind::DerivedFact), canvas.margin.left);
        assert_eq!(
            canvas.column_x(NodeKind::Rule),
            canvas.margin.left + inner / 2.0
        );
        assert_eq!(canvas.column_x(NodeKind::Obligation), canvas.margin.left + inner);
    }

    #[test]
    fn degenerate_width_falls_back_to_default() {
        for width in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            let canvas = Canvas::new(width, 300.0);
            assert_eq!(canvas.effective_width(), DEFAULT_CANVAS_WIDTH);
        }
    }

    #[test]
    fn oversized_margins_do_not_invert_band() {
        let mut canvas = Canvas::new(100.0, 50.0);
        canvas.margin = Margins {
            top: 40.0,
            right: 80.0,
            bottom: 40.0,
            left: 80.0,
        };
        assert_eq!(canvas.band(), (40.0, 40.0));
        assert_eq!(canvas.inner_width(), 0.0);
    }

    #[test]
    fn obligations_cluster_around_rule_row() {
        let canvas = Canvas::new(900.0, 420.0);
        let nodes = vec![
            node("r1", NodeKind::Rule, None),
            node("r1::ob:a", NodeKind::Obligation, Some("r1")),
            node("r1::ob:b", NodeKind::Obligation, Some("r1")),
        ];

        let placed = layout(nodes, &canvas, 20.0);
        let rule_y = placed[0].position.y;
        assert_eq!(rule_y, 210.0);
        assert_eq!(placed[1].position.y, 200.0);
        assert_eq!(placed[2].position.y, 220.0);
    }

    #[test]
    fn obligations_stay_inside_band() {
        let canvas = Canvas::new(900.0, 420.0);
        let mut nodes = vec![
            node("a", NodeKind::Rule, None),
            node("b", NodeKind::Rule, None),
        ];
        for j in 0..5 {
            nodes.push(node(&format!("a::ob:{j}"), NodeKind::Obligation, Some("a")));
        }

        let (top, bottom) = canvas.band();
        for placed in layout(nodes, &canvas, 20.0) {
            assert!(placed.position.y >= top && placed.position.y <= bottom);
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let canvas = Canvas::default();
        let nodes = vec![
            node("derived:a", NodeKind::DerivedFact, None),
            node("derived:b", NodeKind::DerivedFact, None),
            node("r", NodeKind::Rule, None),
            node("r::ob:x", NodeKind::Obligation, Some("r")),
        ];

        let first = layout(nodes.clone(), &canvas, 20.0);
        let second = layout(nodes, &canvas, 20.0);
        assert_eq!(first, second);
    }
}
