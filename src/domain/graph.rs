//! State graph and path planning
//!
//! Declared states and transition edges are both nodes of one directed
//! graph. Every edge contributes links `start -> edge` for each start state
//! and `edge -> end` for each (non-error) end state, so a single transition
//! is two consecutive hops: state, edge node, state.
//!
//! Uses petgraph for adjacency storage; the planner is a breadth-first
//! search since every hop has unit cost.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;

use super::edge::TransitionEdge;
use super::id::EdgeId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("Edge {edge} references unknown state '{state}'")]
    UnknownState { edge: EdgeId, state: String },

    #[error("Edge already exists: {0}")]
    DuplicateEdge(EdgeId),

    #[error("No path from '{from}' to '{to}'")]
    NoPath { from: String, to: String },
}

/// A node in the state graph
///
/// Ordering is used to break ties during planning: neighbours are visited
/// in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Node {
    State(String),
    Edge(EdgeId),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::State(name) => f.write_str(name),
            Node::Edge(id) => write!(f, "[{}]", id),
        }
    }
}

/// One planned transition: fire `edge` from `from`, expecting `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop<'a> {
    pub from: &'a str,
    pub edge: &'a EdgeId,
    pub to: &'a str,
}

/// A shortest path through the graph, alternating states and edges
///
/// Always starts and ends on a state. A plan whose source is its target has
/// no hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    nodes: Vec<Node>,
}

impl Plan {
    /// Returns all nodes, source first and target last
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the planned transitions in order
    pub fn hops(&self) -> Vec<Hop<'_>> {
        self.nodes
            .windows(3)
            .step_by(2)
            .filter_map(|window| match window {
                [Node::State(from), Node::Edge(edge), Node::State(to)] => Some(Hop {
                    from: from.as_str(),
                    edge,
                    to: to.as_str(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Number of transitions the plan would execute if nothing deviates
    pub fn transition_count(&self) -> usize {
        self.nodes.len() / 2
    }

    pub fn source(&self) -> &str {
        self.state_at(0)
    }

    pub fn target(&self) -> &str {
        self.state_at(self.nodes.len() - 1)
    }

    fn state_at(&self, index: usize) -> &str {
        match &self.nodes[index] {
            Node::State(name) => name,
            Node::Edge(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.nodes.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(" -> "))
    }
}

/// The declared states and transition edges of a system
#[derive(Debug)]
pub struct StateGraph<T> {
    /// The underlying directed graph
    graph: DiGraph<Node, ()>,

    /// Map from node to its index
    node_map: HashMap<Node, NodeIndex>,

    /// Declared states, kept sorted for stable listings
    states: BTreeSet<String>,

    /// Edge objects by ID
    edges: HashMap<EdgeId, TransitionEdge<T>>,
}

impl<T> Default for StateGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StateGraph<T> {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            states: BTreeSet::new(),
            edges: HashMap::new(),
        }
    }

    /// Declares a state. Declaring an existing state is a no-op.
    pub fn add_state(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.states.contains(&name) {
            return;
        }
        let node = Node::State(name.clone());
        let idx = self.graph.add_node(node.clone());
        self.node_map.insert(node, idx);
        self.states.insert(name);
    }

    /// Declares several states
    pub fn add_states<I>(&mut self, names: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        for name in names {
            self.add_state(name);
        }
    }

    /// Inserts a transition edge
    ///
    /// Every state the edge references must already be declared. The graph
    /// is only touched once validation has passed, so a failed call leaves
    /// it exactly as it was.
    pub fn add_edge(&mut self, edge: TransitionEdge<T>) -> Result<(), GraphError> {
        if let Some(state) = edge.referenced_states().find(|s| !self.states.contains(*s)) {
            return Err(GraphError::UnknownState {
                edge: edge.id().clone(),
                state: state.clone(),
            });
        }
        if self.edges.contains_key(edge.id()) {
            return Err(GraphError::DuplicateEdge(edge.id().clone()));
        }

        let node = Node::Edge(edge.id().clone());
        let edge_idx = self.graph.add_node(node.clone());
        self.node_map.insert(node, edge_idx);

        for start in edge.start_states() {
            let start_idx = self.node_map[&Node::State(start.clone())];
            self.graph.add_edge(start_idx, edge_idx, ());
        }
        // error end states get no link, so plans never pass through them
        for end in edge.end_states() {
            let end_idx = self.node_map[&Node::State(end.clone())];
            self.graph.add_edge(edge_idx, end_idx, ());
        }

        self.edges.insert(edge.id().clone(), edge);
        Ok(())
    }

    /// Inserts several edges, stopping at the first failure
    pub fn add_edges<I>(&mut self, edges: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = TransitionEdge<T>>,
    {
        for edge in edges {
            self.add_edge(edge)?;
        }
        Ok(())
    }

    /// Looks up an edge by ID
    pub fn edge(&self, id: &EdgeId) -> Option<&TransitionEdge<T>> {
        self.edges.get(id)
    }

    /// Returns the declared states in sorted order
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(String::as_str)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains(name)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of nodes (states plus edges)
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of directed links between nodes
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Finds the shortest plan from `from` to `to`
    ///
    /// Breadth-first search; neighbours are expanded in ascending node
    /// order so equal-length alternatives always resolve the same way.
    pub fn shortest_path(&self, from: &str, to: &str) -> Result<Plan, GraphError> {
        let no_path = || GraphError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        };

        let source = *self
            .node_map
            .get(&Node::State(from.to_string()))
            .ok_or_else(no_path)?;
        let target = *self
            .node_map
            .get(&Node::State(to.to_string()))
            .ok_or_else(no_path)?;

        if source == target {
            return Ok(Plan {
                nodes: vec![self.graph[source].clone()],
            });
        }

        let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([source]);
        let mut queue = VecDeque::from([source]);

        while let Some(current) = queue.pop_front() {
            let mut next: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .filter(|idx| !visited.contains(idx))
                .collect();
            next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            next.dedup();

            for idx in next {
                visited.insert(idx);
                previous.insert(idx, current);
                if idx == target {
                    return Ok(self.trace_back(&previous, source, target));
                }
                queue.push_back(idx);
            }
        }

        Err(no_path())
    }

    fn trace_back(
        &self,
        previous: &HashMap<NodeIndex, NodeIndex>,
        source: NodeIndex,
        target: NodeIndex,
    ) -> Plan {
        let mut nodes = vec![self.graph[target].clone()];
        let mut current = target;
        while current != source {
            current = previous[&current];
            nodes.push(self.graph[current].clone());
        }
        nodes.reverse();
        Plan { nodes }
    }
}
