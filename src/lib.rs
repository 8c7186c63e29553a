pub mod client;
pub mod config;
pub mod graph;
pub mod layout;
pub mod result;
pub mod route;
pub mod scene;
#[cfg(feature = "server")]
pub mod serve;
pub mod summary;
pub mod svg;
pub mod utils;
pub mod wrap;

use serde::{Deserialize, Serialize};

pub use config::{GraphLimits, LayoutConfig, WrapConfig};
pub use graph::{Graph, GraphEdge, GraphNode, NodeKind, build};
pub use layout::{Canvas, Margins, layout};
pub use result::{EvaluationResult, FactDependency, ObligationRecord, RuleHit};
pub use route::{CubicPath, route};
pub use scene::{ColumnHeader, Scene, SceneEdge, SceneNode};
pub use wrap::{CharWidthMeasure, MeasureError, MemoizedMeasure, TextMeasure, WrappedLabel, wrap};

pub const DEFAULT_CANVAS_WIDTH: f32 = 900.0;
pub const DEFAULT_CANVAS_HEIGHT: f32 = 420.0;
pub const DEFAULT_MAX_DERIVED: usize = 20;
pub const DEFAULT_MAX_OBLIGATIONS_PER_RULE: usize = 10;
pub const OBLIGATION_ROW_GAP: f32 = 20.0;
pub const DEFAULT_MAX_LABEL_LINES: usize = 3;
pub const ELLIPSIS: char = '…';

/// Column fractions of the inner drawing width, left to right.
pub const COLUMN_FRACTIONS: [f32; 3] = [0.0, 0.5, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
