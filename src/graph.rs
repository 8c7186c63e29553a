use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GraphLimits;
use crate::result::{EvaluationResult, ObligationRecord};
use crate::Point;

pub const DERIVED_ID_PREFIX: &str = "derived:";
pub const OBLIGATION_ID_SEPARATOR: &str = "::ob:";
/// Fingerprint used when an obligation carries no action text.
pub const PLACEHOLDER_FINGERPRINT: &str = "x";
const FINGERPRINT_CHARS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    DerivedFact,
    Rule,
    Obligation,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::DerivedFact, NodeKind::Rule, NodeKind::Obligation];

    pub fn column(self) -> usize {
        match self {
            NodeKind::DerivedFact => 0,
            NodeKind::Rule => 1,
            NodeKind::Obligation => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::DerivedFact => "derived",
            NodeKind::Rule => "rule",
            NodeKind::Obligation => "obligation",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            NodeKind::DerivedFact => "Derived facts",
            NodeKind::Rule => "Rules",
            NodeKind::Obligation => "Obligations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub position: Point,
    /// Owning rule id for obligation nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(move |node| node.kind == kind)
    }
}

/// Accumulates nodes and edges while keeping ids unique and edges anchored.
#[derive(Default)]
struct GraphAssembly {
    graph: Graph,
    ids: HashSet<String>,
    edges: HashSet<GraphEdge>,
}

impl GraphAssembly {
    fn push_node(&mut self, id: String, label: String, kind: NodeKind, parent: Option<&str>) -> bool {
        if !self.ids.insert(id.clone()) {
            debug!(%id, kind = kind.as_str(), "skipping node with duplicate id");
            return false;
        }
        self.graph.nodes.push(GraphNode {
            id,
            label,
            kind,
            position: Point::default(),
            parent: parent.map(str::to_string),
        });
        true
    }

    fn push_edge(&mut self, source: &str, target: &str) {
        if !self.ids.contains(source) || !self.ids.contains(target) {
            debug!(source, target, "dropping edge with missing endpoint");
            return;
        }
        let edge = GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
        };
        if self.edges.insert(edge.clone()) {
            self.graph.edges.push(edge);
        }
    }
}

/// Builds the three-column graph for one evaluation result.
///
/// Node order is derived facts (sorted by key), then each rule (sorted by id)
/// followed by its obligations. Positions are left at the origin; see
/// [`crate::layout::layout`].
pub fn build(result: Option<&EvaluationResult>, limits: &GraphLimits) -> Graph {
    let Some(result) = result else {
        return Graph::default();
    };

    let mut assembly = GraphAssembly::default();

    let derived_keys: Vec<&String> = result.derived_facts.keys().take(limits.max_derived).collect();
    if result.derived_facts.len() > derived_keys.len() {
        debug!(
            total = result.derived_facts.len(),
            kept = derived_keys.len(),
            "capping derived facts"
        );
    }
    let mut derived_ids = Vec::with_capacity(derived_keys.len());
    for key in derived_keys {
        let id = derived_node_id(key);
        if assembly.push_node(id.clone(), humanize_fact_key(key), NodeKind::DerivedFact, None) {
            derived_ids.push(id);
        }
    }

    let mut rule_titles: BTreeMap<&str, &str> = BTreeMap::new();
    for hit in &result.rule_hits {
        let Some(rule_id) = hit.rule_id.as_deref() else {
            debug!("skipping rule hit without ruleId");
            continue;
        };
        rule_titles
            .entry(rule_id)
            .or_insert_with(|| first_non_empty(&[hit.title.as_deref()]).unwrap_or(rule_id));
    }

    let mut obligations_by_rule: HashMap<&str, Vec<&ObligationRecord>> = HashMap::new();
    for obligation in &result.obligations {
        match obligation.rule_id.as_deref() {
            Some(rule_id) => obligations_by_rule.entry(rule_id).or_default().push(obligation),
            None => debug!("skipping obligation without ruleId"),
        }
    }

    let mut rule_ids = Vec::with_capacity(rule_titles.len());
    for (&rule_id, &title) in &rule_titles {
        if !assembly.push_node(rule_id.to_string(), title.to_string(), NodeKind::Rule, None) {
            continue;
        }
        rule_ids.push(rule_id);

        let mut kept = 0;
        for obligation in obligations_by_rule.get(rule_id).into_iter().flatten() {
            if kept == limits.max_obligations_per_rule {
                debug!(rule_id, cap = kept, "capping obligations for rule");
                break;
            }
            let id = obligation_node_id(rule_id, obligation.action.as_deref());
            let label = first_non_empty(&[obligation.title.as_deref(), obligation.action.as_deref()])
                .unwrap_or(rule_id)
                .to_string();
            if assembly.push_node(id.clone(), label, NodeKind::Obligation, Some(rule_id)) {
                assembly.push_edge(rule_id, &id);
                kept += 1;
            }
        }
    }

    let explicit: Vec<_> = result
        .dependencies
        .iter()
        .map(|dep| (derived_node_id(&dep.fact), dep.rule_id.as_str()))
        .collect();
    if !explicit.is_empty() {
        for (fact_id, rule_id) in &explicit {
            assembly.push_edge(fact_id, rule_id);
        }
    } else if !rule_ids.is_empty() {
        for (index, fact_id) in derived_ids.iter().enumerate() {
            assembly.push_edge(fact_id, rule_ids[index % rule_ids.len()]);
        }
    }

    debug!(
        nodes = assembly.graph.nodes.len(),
        edges = assembly.graph.edges.len(),
        "built evaluation graph"
    );
    assembly.graph
}

pub fn derived_node_id(key: &str) -> String {
    format!("{DERIVED_ID_PREFIX}{key}")
}

/// Obligations of one rule sharing the same leading action text map to the
/// same id.
pub fn obligation_node_id(rule_id: &str, action: Option<&str>) -> String {
    let fingerprint = match action {
        Some(action) if !action.is_empty() => action.chars().take(FINGERPRINT_CHARS).collect(),
        _ => PLACEHOLDER_FINGERPRINT.to_string(),
    };
    format!("{rule_id}{OBLIGATION_ID_SEPARATOR}{fingerprint}")
}

/// `has_remote_employees` -> `Has Remote Employees`.
pub fn humanize_fact_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut at_word_start = true;
    for ch in key.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if at_word_start && ch.is_lowercase() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits() -> GraphLimits {
        GraphLimits::default()
    }

    fn result(value: serde_json::Value) -> EvaluationResult {
        EvaluationResult::from_json(&value)
    }

    #[test]
    fn absent_result_builds_empty_graph() {
        let graph = build(None, &limits());
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn osha_scenario_builds_three_nodes_and_two_edges() {
        let input = result(json!({
            "derivedFacts": {"has_remote": true},
            "ruleHits": [{"ruleId": "federal:osha:1", "title": "OSHA Recordkeeping", "why": {}}],
            "obligations": [{"ruleId": "federal:osha:1", "action": "File Form 300"}]
        }));

        let graph = build(Some(&input), &limits());

        assert_eq!(graph.nodes_of(NodeKind::DerivedFact).count(), 1);
        assert_eq!(graph.nodes_of(NodeKind::Rule).count(), 1);
        assert_eq!(graph.nodes_of(NodeKind::Obligation).count(), 1);
        assert_eq!(
            graph.edges,
            vec![
                GraphEdge {
                    source: "federal:osha:1".into(),
                    target: "federal:osha:1::ob:File Form 300".into(),
                },
                GraphEdge {
                    source: "derived:has_remote".into(),
                    target: "federal:osha:1".into(),
                },
            ]
        );

        let again = build(Some(&input), &limits());
        assert_eq!(graph, again);
    }

    #[test]
    fn obligation_without_action_uses_placeholder_fingerprint() {
        assert_eq!(obligation_node_id("r1", None), "r1::ob:x");
        assert_eq!(obligation_node_id("r1", Some("")), "r1::ob:x");

        let input = result(json!({
            "ruleHits": [{"ruleId": "r1", "title": "Rule"}],
            "obligations": [{"ruleId": "r1", "title": "Do it"}]
        }));
        let graph = build(Some(&input), &limits());
        let node = graph.node("r1::ob:x").expect("placeholder obligation node");
        assert_eq!(node.label, "Do it");
        assert_eq!(node.parent.as_deref(), Some("r1"));
    }

    #[test]
    fn fingerprint_uses_first_32_characters() {
        let action = "Register with the state department of revenue before sales";
        let id = obligation_node_id("r", Some(action));
        assert_eq!(id, format!("r::ob:{}", &action[..32]));
    }

    #[test]
    fn caps_derived_facts_to_lexicographically_first_keys() {
        let facts: serde_json::Map<String, serde_json::Value> = (0..25)
            .rev()
            .map(|i| (format!("fact_{i:02}"), json!(true)))
            .collect();
        let input = result(json!({ "derivedFacts": facts }));

        let graph = build(Some(&input), &limits());
        let ids: Vec<_> = graph
            .nodes_of(NodeKind::DerivedFact)
            .map(|node| node.id.clone())
            .collect();

        let expected: Vec<_> = (0..20).map(|i| format!("derived:fact_{i:02}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn round_robin_links_derived_facts_to_sorted_rules() {
        let input = result(json!({
            "derivedFacts": {"a": 1, "b": 2, "c": 3},
            "ruleHits": [{"ruleId": "ruleB"}, {"ruleId": "ruleA"}]
        }));

        let graph = build(Some(&input), &limits());
        let links: Vec<_> = graph
            .edges
            .iter()
            .map(|edge| (edge.source.as_str(), edge.target.as_str()))
            .collect();

        assert_eq!(
            links,
            vec![
                ("derived:a", "ruleA"),
                ("derived:b", "ruleB"),
                ("derived:c", "ruleA"),
            ]
        );
    }

    #[test]
    fn no_rules_means_no_derived_edges() {
        let input = result(json!({"derivedFacts": {"a": 1, "b": 2}}));
        let graph = build(Some(&input), &limits());
        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn label_fallbacks() {
        let input = result(json!({
            "derivedFacts": {"sells_alcohol_in_store": true},
            "ruleHits": [{"ruleId": "r1", "title": "  "}, {"ruleId": "r2", "title": "Titled"}],
            "obligations": [
                {"ruleId": "r1", "action": "Post notice"},
                {"ruleId": "r2"}
            ]
        }));

        let graph = build(Some(&input), &limits());
        let label = |id: &str| graph.node(id).map(|node| node.label.clone());

        assert_eq!(label("derived:sells_alcohol_in_store").as_deref(), Some("Sells Alcohol In Store"));
        assert_eq!(label("r1").as_deref(), Some("r1"));
        assert_eq!(label("r2").as_deref(), Some("Titled"));
        assert_eq!(label("r1::ob:Post notice").as_deref(), Some("Post notice"));
        assert_eq!(label("r2::ob:x").as_deref(), Some("r2"));
    }

    #[test]
    fn caps_obligations_per_rule_and_collapses_duplicates() {
        let obligations: Vec<_> = (0..12)
            .map(|i| json!({"ruleId": "r", "action": format!("step {i}")}))
            .chain(std::iter::once(json!({"ruleId": "r", "action": "step 0"})))
            .collect();
        let input = result(json!({
            "ruleHits": [{"ruleId": "r"}],
            "obligations": obligations
        }));

        let graph = build(Some(&input), &limits());
        assert_eq!(graph.nodes_of(NodeKind::Obligation).count(), 10);
        assert_eq!(graph.edges.len(), 10);
    }

    #[test]
    fn malformed_and_orphan_obligations_are_skipped() {
        let input = result(json!({
            "ruleHits": [{"ruleId": "r"}, {"title": "no id"}],
            "obligations": [
                {"action": "missing rule"},
                {"ruleId": "unknown", "action": "orphan"},
                {"ruleId": "r", "action": "kept"}
            ]
        }));

        let graph = build(Some(&input), &limits());
        let ids: Vec<_> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["r", "r::ob:kept"]);
        for edge in &graph.edges {
            assert!(graph.node(&edge.source).is_some());
            assert!(graph.node(&edge.target).is_some());
        }
    }

    #[test]
    fn explicit_dependencies_replace_round_robin() {
        let input = result(json!({
            "derivedFacts": {"a": 1, "b": 2},
            "ruleHits": [{"ruleId": "r1"}, {"ruleId": "r2"}],
            "dependencies": [
                {"fact": "b", "ruleId": "r1"},
                {"fact": "b", "ruleId": "r1"},
                {"fact": "missing", "ruleId": "r2"}
            ]
        }));

        let graph = build(Some(&input), &limits());
        assert_eq!(
            graph.edges,
            vec![GraphEdge {
                source: "derived:b".into(),
                target: "r1".into(),
            }]
        );
    }

    #[test]
    fn humanizes_keys_at_word_boundaries() {
        assert_eq!(humanize_fact_key("has_remote"), "Has Remote");
        assert_eq!(humanize_fact_key("nexus:CA_sales"), "Nexus:CA Sales");
        assert_eq!(humanize_fact_key("employees_50plus"), "Employees 50plus");
    }
}
