use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::DashError;
use crate::schema::outputs;
use crate::selector::ControlId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputId {
    SpaceAggregate,
    RevenueAggregate,
    TurnoverTrend,
    Top5Heatmap,
}

impl OutputId {
    pub const ALL: [OutputId; 4] = [
        OutputId::SpaceAggregate,
        OutputId::RevenueAggregate,
        OutputId::TurnoverTrend,
        OutputId::Top5Heatmap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputId::SpaceAggregate => outputs::SPACE_AGGREGATE,
            OutputId::RevenueAggregate => outputs::REVENUE_AGGREGATE,
            OutputId::TurnoverTrend => outputs::TURNOVER_TREND,
            OutputId::Top5Heatmap => outputs::TOP5_HEATMAP,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        OutputId::ALL.into_iter().find(|o| o.as_str() == s)
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Control(ControlId),
    Output(OutputId),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Control(c) => write!(f, "{c}"),
            Node::Output(o) => write!(f, "{o}"),
        }
    }
}

/// Edge payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The output (or control) reads the source control.
    Reads,
    /// Changing the source overwrites the target control's options and value.
    CascadeReset,
}

/// Static wiring of controls to the outputs they drive.
pub const STANDARD_WIRING: &[(Node, Node, EdgeKind)] = &[
    (
        Node::Control(ControlId::Dimension),
        Node::Output(OutputId::SpaceAggregate),
        EdgeKind::Reads,
    ),
    (
        Node::Control(ControlId::Dimension),
        Node::Output(OutputId::RevenueAggregate),
        EdgeKind::Reads,
    ),
    (
        Node::Control(ControlId::Category),
        Node::Control(ControlId::Products),
        EdgeKind::CascadeReset,
    ),
    (
        Node::Control(ControlId::Category),
        Node::Output(OutputId::TurnoverTrend),
        EdgeKind::Reads,
    ),
    (
        Node::Control(ControlId::Products),
        Node::Output(OutputId::TurnoverTrend),
        EdgeKind::Reads,
    ),
];

/// Directed acyclic graph of controls and outputs.
///
/// Built once from a static edge table; a topological order of every node is
/// computed up front so each event only has to filter it.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<Node, EdgeKind>,
    /// Map from node → NodeIndex for fast lookup.
    node_map: HashMap<Node, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl DependencyGraph {
    /// The dashboard's wiring: every control and output, including the
    /// heatmap, which has no inputs.
    pub fn standard() -> Result<Self, DashError> {
        let nodes: Vec<Node> = ControlId::ALL
            .into_iter()
            .map(Node::Control)
            .chain(OutputId::ALL.into_iter().map(Node::Output))
            .collect();
        Self::from_edges(&nodes, STANDARD_WIRING)
    }

    pub fn from_edges(nodes: &[Node], edges: &[(Node, Node, EdgeKind)]) -> Result<Self, DashError> {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<Node, NodeIndex> = HashMap::new();

        let get_or_insert = |map: &mut HashMap<Node, NodeIndex>,
                             g: &mut DiGraph<Node, EdgeKind>,
                             node: Node|
         -> NodeIndex { *map.entry(node).or_insert_with(|| g.add_node(node)) };

        for &node in nodes {
            get_or_insert(&mut node_map, &mut graph, node);
        }
        for &(from, to, kind) in edges {
            let from_idx = get_or_insert(&mut node_map, &mut graph, from);
            let to_idx = get_or_insert(&mut node_map, &mut graph, to);
            graph.add_edge(from_idx, to_idx, kind);
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| DashError::GraphCycle(graph[cycle.node_id()].to_string()))?;

        Ok(Self {
            graph,
            node_map,
            order,
        })
    }

    /// Controls whose value is reset when `control` changes.
    pub fn cascade_targets(&self, control: ControlId) -> Vec<ControlId> {
        let Some(&idx) = self.node_map.get(&Node::Control(control)) else {
            return Vec::new();
        };
        let mut targets: Vec<ControlId> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| *e.weight() == EdgeKind::CascadeReset)
            .filter_map(|e| match self.graph[e.target()] {
                Node::Control(c) => Some(c),
                Node::Output(_) => None,
            })
            .collect();
        targets.sort();
        targets
    }

    /// Controls a node reads, directly.
    pub fn inputs(&self, node: Node) -> Vec<ControlId> {
        let Some(&idx) = self.node_map.get(&node) else {
            return Vec::new();
        };
        let mut inputs: Vec<ControlId> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|n| match self.graph[n] {
                Node::Control(c) => Some(c),
                Node::Output(_) => None,
            })
            .collect();
        inputs.sort();
        inputs.dedup();
        inputs
    }

    /// Every node downstream of `control`, in dependency order.
    ///
    /// The changed control itself is not included.
    pub fn affected(&self, control: ControlId) -> Vec<Node> {
        let Some(&start) = self.node_map.get(&Node::Control(control)) else {
            return Vec::new();
        };
        let reachable = self.reachable(start);
        self.order
            .iter()
            .filter(|idx| reachable.contains(idx))
            .map(|&idx| self.graph[idx])
            .collect()
    }

    /// Outputs that read at least one control, in dependency order.
    pub fn driven_outputs(&self) -> Vec<OutputId> {
        self.outputs_where(|has_inputs| has_inputs)
    }

    /// Outputs with no control inputs; computed once per process.
    pub fn static_outputs(&self) -> Vec<OutputId> {
        self.outputs_where(|has_inputs| !has_inputs)
    }

    fn outputs_where(&self, keep: impl Fn(bool) -> bool) -> Vec<OutputId> {
        self.order
            .iter()
            .filter_map(|&idx| match self.graph[idx] {
                Node::Output(o) => {
                    let has_inputs = self
                        .graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .next()
                        .is_some();
                    keep(has_inputs).then_some(o)
                }
                Node::Control(_) => None,
            })
            .collect()
    }

    /// Find all nodes reachable from `start` following outgoing edges.
    fn reachable(&self, start: NodeIndex) -> HashSet<NodeIndex> {
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(start, Direction::Outgoing)
            .collect();

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if !visited.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_cascades_to_products_before_trend() {
        let g = DependencyGraph::standard().unwrap();
        assert_eq!(g.cascade_targets(ControlId::Category), vec![ControlId::Products]);
        assert_eq!(
            g.affected(ControlId::Category),
            vec![
                Node::Control(ControlId::Products),
                Node::Output(OutputId::TurnoverTrend)
            ]
        );
    }

    #[test]
    fn dimension_drives_both_aggregate_views() {
        let g = DependencyGraph::standard().unwrap();
        let affected = g.affected(ControlId::Dimension);
        assert_eq!(affected.len(), 2);
        assert!(affected.contains(&Node::Output(OutputId::SpaceAggregate)));
        assert!(affected.contains(&Node::Output(OutputId::RevenueAggregate)));
        assert!(g.cascade_targets(ControlId::Dimension).is_empty());
    }

    #[test]
    fn products_only_drive_the_trend() {
        let g = DependencyGraph::standard().unwrap();
        assert_eq!(
            g.affected(ControlId::Products),
            vec![Node::Output(OutputId::TurnoverTrend)]
        );
        assert_eq!(
            g.inputs(Node::Output(OutputId::TurnoverTrend)),
            vec![ControlId::Category, ControlId::Products]
        );
    }

    #[test]
    fn heatmap_is_static() {
        let g = DependencyGraph::standard().unwrap();
        assert_eq!(g.static_outputs(), vec![OutputId::Top5Heatmap]);
        assert_eq!(g.driven_outputs().len(), 3);
    }

    #[test]
    fn cycles_are_rejected() {
        let edges = [
            (
                Node::Control(ControlId::Category),
                Node::Control(ControlId::Products),
                EdgeKind::CascadeReset,
            ),
            (
                Node::Control(ControlId::Products),
                Node::Control(ControlId::Category),
                EdgeKind::CascadeReset,
            ),
        ];
        let err = DependencyGraph::from_edges(&[], &edges).unwrap_err();
        assert!(matches!(err, DashError::GraphCycle(_)));
    }
}
