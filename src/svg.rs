use std::fmt::Write as FmtWrite;

use anyhow::Result;

use crate::graph::NodeKind;
use crate::scene::Scene;
use crate::utils::{escape_xml, fmt_coord};

const NODE_RADIUS: f32 = 9.0;
const LABEL_OFFSET_X: f32 = 12.0;
const LABEL_OFFSET_Y: f32 = 4.0;
const LABEL_LINE_HEIGHT_EM: f32 = 1.1;
const LABEL_FONT_SIZE: f32 = 10.0;
const HEADER_FONT_SIZE: f32 = 12.0;
const EDGE_COLOR: &str = "#d1d5db";
const MUTED_TEXT_COLOR: &str = "#6b7280";
const LABEL_TEXT_COLOR: &str = "#374151";

fn node_fill(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::DerivedFact => "#fb923c",
        NodeKind::Rule => "#1aa2ff",
        NodeKind::Obligation => "#10b981",
    }
}

/// Paints a computed scene as a standalone SVG document.
pub fn render_svg(scene: &Scene, background: &str) -> Result<String> {
    let width = scene.canvas.effective_width();
    let height = scene.canvas.effective_height();

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" preserveAspectRatio="xMidYMid meet" font-family="Inter, system-ui, sans-serif">
  <rect width="100%" height="100%" fill="{}" />
"##,
        width,
        height,
        width,
        height,
        escape_xml(background)
    )?;

    if scene.is_empty() {
        write!(
            svg,
            "  <text x=\"16\" y=\"24\" fill=\"{MUTED_TEXT_COLOR}\">No data</text>\n</svg>\n"
        )?;
        return Ok(svg);
    }

    write!(
        svg,
        "  <g fill=\"none\" stroke=\"{EDGE_COLOR}\" stroke-width=\"1.2\">\n"
    )?;
    for edge in &scene.edges {
        write!(
            svg,
            "    <path d=\"{}\" data-source=\"{}\" data-target=\"{}\" />\n",
            edge.path.to_svg_path(),
            escape_xml(&edge.source),
            escape_xml(&edge.target)
        )?;
    }
    svg.push_str("  </g>\n");

    svg.push_str("  <g>\n");
    for node in &scene.nodes {
        write!(
            svg,
            "    <g class=\"node {}\" transform=\"translate({},{})\">\n",
            node.kind.as_str(),
            fmt_coord(node.position.x),
            fmt_coord(node.position.y)
        )?;
        write!(
            svg,
            "      <circle r=\"{NODE_RADIUS}\" fill=\"{}\" stroke=\"#111827\" stroke-width=\"0.5\" />\n",
            node_fill(node.kind)
        )?;

        if !node.label.is_empty() {
            write!(
                svg,
                "      <text x=\"{LABEL_OFFSET_X}\" y=\"{LABEL_OFFSET_Y}\" font-size=\"{LABEL_FONT_SIZE}\" fill=\"{LABEL_TEXT_COLOR}\">\n"
            )?;
            for (idx, line) in node.label.lines.iter().enumerate() {
                write!(
                    svg,
                    "        <tspan x=\"{LABEL_OFFSET_X}\" y=\"{LABEL_OFFSET_Y}\" dy=\"{:.1}em\">{}</tspan>\n",
                    idx as f32 * LABEL_LINE_HEIGHT_EM,
                    escape_xml(line)
                )?;
            }
            svg.push_str("      </text>\n");
        }

        write!(
            svg,
            "      <title>{}</title>\n    </g>\n",
            escape_xml(&node.raw_label)
        )?;
    }
    svg.push_str("  </g>\n");

    for header in &scene.headers {
        write!(
            svg,
            "  <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"{HEADER_FONT_SIZE}\" fill=\"{MUTED_TEXT_COLOR}\">{}</text>\n",
            fmt_coord(header.position.x),
            fmt_coord(header.position.y),
            escape_xml(header.text)
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}
