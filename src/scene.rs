use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::graph::{self, NodeKind};
use crate::layout::{self, Canvas};
use crate::result::EvaluationResult;
use crate::route::{self, CubicPath};
use crate::wrap::{self, TextMeasure, WrappedLabel};
use crate::Point;

/// Y of the column header baseline.
pub const HEADER_Y: f32 = 16.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub id: String,
    pub kind: NodeKind,
    pub position: Point,
    pub label: WrappedLabel,
    /// Unwrapped label, for tooltips.
    pub raw_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneEdge {
    pub source: String,
    pub target: String,
    pub path: CubicPath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnHeader {
    pub kind: NodeKind,
    pub text: &'static str,
    pub position: Point,
}

/// Fully positioned diagram for one evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub canvas: Canvas,
    pub nodes: Vec<SceneNode>,
    pub edges: Vec<SceneEdge>,
    pub headers: Vec<ColumnHeader>,
}

impl Scene {
    /// Runs `build -> layout -> wrap -> route` for `result`.
    pub fn compute<M>(result: Option<&EvaluationResult>, config: &LayoutConfig, measure: &M) -> Self
    where
        M: TextMeasure + ?Sized,
    {
        let canvas = config.canvas;
        let graph = graph::build(result, &config.limits);
        let placed = layout::layout(graph.nodes, &canvas, config.obligation_row_gap);

        let positions: HashMap<&str, Point> = placed
            .iter()
            .map(|node| (node.id.as_str(), node.position))
            .collect();

        let edges = graph
            .edges
            .iter()
            .filter_map(|edge| {
                let source = positions.get(edge.source.as_str())?;
                let target = positions.get(edge.target.as_str())?;
                Some(SceneEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    path: route::route(*source, *target),
                })
            })
            .collect();

        let nodes = placed
            .iter()
            .map(|node| SceneNode {
                id: node.id.clone(),
                kind: node.kind,
                position: node.position,
                label: wrap::wrap(
                    &node.label,
                    config.wrap.width_for(node.kind),
                    config.wrap.max_lines,
                    measure,
                ),
                raw_label: node.label.clone(),
            })
            .collect();

        let headers = NodeKind::ALL
            .iter()
            .map(|&kind| ColumnHeader {
                kind,
                text: kind.header(),
                position: Point {
                    x: canvas.column_x(kind),
                    y: HEADER_Y,
                },
            })
            .collect();

        let scene = Self {
            canvas,
            nodes,
            edges,
            headers,
        };
        debug!(
            nodes = scene.nodes.len(),
            edges = scene.edges.len(),
            "computed scene"
        );
        scene
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrap::CharWidthMeasure;
    use serde_json::json;

    fn sample() -> EvaluationResult {
        EvaluationResult::from_json(&json!({
            "derivedFacts": {"has_remote": true, "sells_online": false},
            "ruleHits": [{"ruleId": "federal:osha:1", "title": "OSHA Recordkeeping"}],
            "obligations": [
                {"ruleId": "federal:osha:1", "action": "File Form 300 and keep the injury log posted"}
            ]
        }))
    }

    #[test]
    fn empty_result_keeps_headers_only() {
        let scene = Scene::compute(None, &LayoutConfig::default(), &CharWidthMeasure::new(6.0));
        assert!(scene.is_empty());
        assert!(scene.edges.is_empty());
        assert_eq!(scene.headers.len(), 3);
    }

    #[test]
    fn edges_follow_node_positions() {
        let result = sample();
        let scene = Scene::compute(Some(&result), &LayoutConfig::default(), &CharWidthMeasure::new(6.0));

        for edge in &scene.edges {
            let source = scene.node(&edge.source).expect("source node");
            let target = scene.node(&edge.target).expect("target node");
            assert_eq!(edge.path.start, source.position);
            assert_eq!(edge.path.end, target.position);
        }
        assert_eq!(scene.edges.len(), 3);
    }

    #[test]
    fn labels_are_wrapped_per_column_width() {
        let result = sample();
        let scene = Scene::compute(Some(&result), &LayoutConfig::default(), &CharWidthMeasure::new(6.0));
        let obligation = scene
            .nodes
            .iter()
            .find(|node| node.kind == NodeKind::Obligation)
            .expect("obligation node");

        assert!(obligation.label.lines.len() > 1);
        for line in &obligation.label.lines[..obligation.label.lines.len() - 1] {
            assert!(line.chars().count() as f32 * 6.0 <= 180.0);
        }
        assert_eq!(obligation.raw_label, "File Form 300 and keep the injury log posted");
    }

    #[test]
    fn headers_sit_on_column_positions() {
        let config = LayoutConfig::default();
        let scene = Scene::compute(None, &config, &CharWidthMeasure::new(6.0));
        let xs: Vec<f32> = scene.headers.iter().map(|header| header.position.x).collect();
        assert_eq!(
            xs,
            vec![
                config.canvas.column_x(NodeKind::DerivedFact),
                config.canvas.column_x(NodeKind::Rule),
                config.canvas.column_x(NodeKind::Obligation),
            ]
        );
    }
}
