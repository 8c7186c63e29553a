use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::NodeKind;
use crate::layout::Canvas;
use crate::{
    DEFAULT_MAX_DERIVED, DEFAULT_MAX_LABEL_LINES, DEFAULT_MAX_OBLIGATIONS_PER_RULE,
    OBLIGATION_ROW_GAP,
};

pub const CONFIG_ENV_VAR: &str = "OBLIGRAPH_CONFIG";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphLimits {
    pub max_derived: usize,
    pub max_obligations_per_rule: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_derived: DEFAULT_MAX_DERIVED,
            max_obligations_per_rule: DEFAULT_MAX_OBLIGATIONS_PER_RULE,
        }
    }
}

/// Label box sizes per column, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WrapConfig {
    pub derived_width: f32,
    pub rule_width: f32,
    pub obligation_width: f32,
    pub max_lines: usize,
    /// Pixel width of one display cell for the built-in measurer.
    pub char_width: f32,
}

impl Default for WrapConfig {
    fn default() -> Self {
        Self {
            derived_width: 140.0,
            rule_width: 160.0,
            obligation_width: 180.0,
            max_lines: DEFAULT_MAX_LABEL_LINES,
            char_width: 6.0,
        }
    }
}

impl WrapConfig {
    pub fn width_for(&self, kind: NodeKind) -> f32 {
        match kind {
            NodeKind::DerivedFact => self.derived_width,
            NodeKind::Rule => self.rule_width,
            NodeKind::Obligation => self.obligation_width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub limits: GraphLimits,
    pub canvas: Canvas,
    pub wrap: WrapConfig,
    pub obligation_row_gap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            limits: GraphLimits::default(),
            canvas: Canvas::default(),
            wrap: WrapConfig::default(),
            obligation_row_gap: OBLIGATION_ROW_GAP,
        }
    }
}

impl LayoutConfig {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("failed to parse layout configuration")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("invalid config '{}'", path.display()))
    }

    /// Loads the first configuration found: `explicit`, then the
    /// `OBLIGRAPH_CONFIG` variable, then `config.json` in the user config
    /// directory. Falls back to defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) {
            return Self::from_path(&path);
        }

        if let Some(path) = default_config_path().filter(|path| path.is_file()) {
            debug!(path = %path.display(), "loading user layout config");
            return Self::from_path(&path);
        }

        Ok(Self::default())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "obligraph").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
