//! Artifact dependency graph.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use waivern_core::ArtifactId;

use crate::error::{PlanError, PlanResult};

/// Directed acyclic graph of artifact dependencies.
///
/// Nodes are artifact ids; an edge `u → v` means `u` appears in `v`'s
/// inputs. Construction fails with [`PlanError::CyclicDependency`] naming
/// one cycle when the edges are not acyclic.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    graph: DiGraph<ArtifactId, ()>,
    node_indices: HashMap<ArtifactId, NodeIndex>,
}

impl ExecutionGraph {
    /// Builds a graph from nodes and edges, verifying acyclicity.
    pub fn new(
        nodes: impl IntoIterator<Item = ArtifactId>,
        edges: impl IntoIterator<Item = (ArtifactId, ArtifactId)>,
    ) -> PlanResult<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for id in nodes {
            let index = graph.add_node(id.clone());
            node_indices.insert(id, index);
        }

        for (from, to) in edges {
            let from_index = node_indices
                .get(&from)
                .copied()
                .expect("edge endpoints are validated before graph construction");
            let to_index = node_indices
                .get(&to)
                .copied()
                .expect("edge endpoints are validated before graph construction");
            graph.add_edge(from_index, to_index, ());
        }

        let built = Self {
            graph,
            node_indices,
        };

        if let Err(cycle) = petgraph::algo::toposort(&built.graph, None) {
            return Err(PlanError::CyclicDependency {
                cycle: built.name_cycle(cycle.node_id()),
            });
        }

        Ok(built)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns whether an artifact is a node of this graph.
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.node_indices.contains_key(id)
    }

    /// Iterates all node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = &ArtifactId> {
        self.node_indices.keys()
    }

    /// Returns the direct predecessors of a node.
    pub fn predecessors(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Returns the direct successors of a node.
    pub fn successors(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Returns the nodes with no predecessors.
    pub fn roots(&self) -> Vec<ArtifactId> {
        let mut roots: Vec<ArtifactId> = self
            .node_indices
            .iter()
            .filter(|&(_, &index)| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|(id, _)| id.clone())
            .collect();
        roots.sort();
        roots
    }

    /// Returns every node reachable from `id` by following edges forward.
    pub fn descendants(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        let Some(&start) = self.node_indices.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();

        while let Some(index) = queue.pop_front() {
            for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if seen.insert(next) {
                    result.push(self.graph[next].clone());
                    queue.push_back(next);
                }
            }
        }

        result
    }

    /// Returns the node ids in topological order (sources first).
    pub fn topological_order(&self) -> Vec<ArtifactId> {
        petgraph::algo::toposort(&self.graph, None)
            .expect("graph was verified acyclic at construction")
            .into_iter()
            .map(|index| self.graph[index].clone())
            .collect()
    }

    fn neighbors(&self, id: &ArtifactId, direction: Direction) -> Vec<ArtifactId> {
        let Some(&index) = self.node_indices.get(id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<ArtifactId> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|neighbor| self.graph[neighbor].clone())
            .collect();
        neighbors.sort();
        neighbors
    }

    /// Walks forward from a node known to sit on a cycle until the walk
    /// returns to it, producing `a -> ... -> a`.
    fn name_cycle(&self, start: NodeIndex) -> Vec<ArtifactId> {
        let mut seen = HashSet::from([start]);
        let mut stack = vec![(start, vec![start])];

        while let Some((node, path)) = stack.pop() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if next == start {
                    let mut cycle: Vec<ArtifactId> =
                        path.iter().map(|&index| self.graph[index].clone()).collect();
                    cycle.push(self.graph[start].clone());
                    return cycle;
                }
                if seen.insert(next) {
                    let mut path = path.clone();
                    path.push(next);
                    stack.push((next, path));
                }
            }
        }

        vec![self.graph[start].clone()]
    }
}
