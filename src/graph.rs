//! Mutable road-network graph store.
//!
//! The store is a directed multigraph. Every road segment is represented by
//! two arcs, one in each storage direction, whose traversal flags mirror each
//! other. This way the full neighbourhood of a vertex can be read from its
//! outgoing arcs alone, which is what both the search and the contraction
//! engine rely on.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

/// Opaque handle into an external tag collection (road class, restrictions,
/// names). The graph never interprets it.
pub type TagsId = u32;

/// A vertex of the road network, i.e., a geographic location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RoadNode {
    /// Latitude, in degrees.
    pub lat: f64,
    /// Longitude, in degrees.
    pub lon: f64,
}

/// An arc of the road network.
///
/// The arc is stored from a source vertex to a target vertex but can be
/// traversable in either direction, both or neither, as given by the
/// `forward` and `backward` flags.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct RoadEdge {
    /// Whether the arc can be traversed from source to target.
    pub forward: bool,
    /// Whether the arc can be traversed from target to source.
    pub backward: bool,
    /// Non-negative traversal weight.
    pub weight: f64,
    /// The vertex this arc bypasses, when the arc is a shortcut added by the
    /// contraction engine.
    pub contracted: Option<NodeIndex>,
    /// Handle to the tags of the underlying road segment (0 for shortcuts).
    pub tags: TagsId,
}

impl RoadEdge {
    pub fn new(forward: bool, backward: bool, weight: f64, tags: TagsId) -> Self {
        RoadEdge {
            forward,
            backward,
            weight,
            contracted: None,
            tags,
        }
    }

    /// An arc bypassing the contracted vertex `via`.
    pub fn shortcut(forward: bool, backward: bool, weight: f64, via: NodeIndex) -> Self {
        RoadEdge {
            forward,
            backward,
            weight,
            contracted: Some(via),
            tags: 0,
        }
    }

    pub fn is_shortcut(&self) -> bool {
        self.contracted.is_some()
    }

    /// The same arc seen from the other endpoint: traversal flags are
    /// swapped, weight and payload are unchanged.
    pub fn reversed(&self) -> Self {
        RoadEdge {
            forward: self.backward,
            backward: self.forward,
            ..*self
        }
    }
}

/// Returns `true` if `existing` makes `candidate` redundant: it covers at
/// least the traversal directions of `candidate` at a weight that is no
/// larger.
pub fn overlaps(existing: &RoadEdge, candidate: &RoadEdge) -> bool {
    if candidate.forward && !existing.forward {
        return false;
    }
    if candidate.backward && !existing.backward {
        return false;
    }
    existing.weight <= candidate.weight
}

/// Outcome of [`RoadGraph::add_arc_with`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ArcInsertion {
    /// Whether the candidate arc was inserted.
    pub inserted: bool,
    /// Number of existing parallel arcs the candidate evicted.
    pub evicted: usize,
}

/// The road network.
///
/// Vertices are never removed, so a [`NodeIndex`] stays valid for the
/// lifetime of the graph. Arcs are added and removed freely by the
/// contraction engine.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RoadGraph {
    graph: DiGraph<RoadNode, RoadEdge>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, arcs: usize) -> Self {
        RoadGraph {
            graph: DiGraph::with_capacity(vertices, arcs),
        }
    }

    /// Adds a vertex at the given location and returns its id.
    pub fn add_vertex(&mut self, lat: f64, lon: f64) -> NodeIndex {
        self.graph.add_node(RoadNode { lat, lon })
    }

    pub fn get_vertex(&self, vertex: NodeIndex) -> Option<&RoadNode> {
        self.graph.node_weight(vertex)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn arc_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn vertices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Snapshot of the outgoing arcs of a vertex, as `(neighbour, arc)`
    /// pairs. Use [`RoadGraph::out_arcs`] on hot paths.
    pub fn get_arcs(&self, from: NodeIndex) -> Vec<(NodeIndex, RoadEdge)> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect()
    }

    /// Borrowing iterator over the outgoing arcs of a vertex.
    pub fn out_arcs(&self, from: NodeIndex) -> petgraph::graph::Edges<'_, RoadEdge, Directed> {
        self.graph.edges_directed(from, Direction::Outgoing)
    }

    /// Returns `true` if there is at least one arc stored from `from` to
    /// `to`, traversable or not.
    pub fn has_neighbour(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.graph.find_edge(from, to).is_some()
    }

    /// The lightest arc stored from `from` to `to`, if any.
    pub fn arc_between(&self, from: NodeIndex, to: NodeIndex) -> Option<RoadEdge> {
        self.graph
            .edges_connecting(from, to)
            .map(|e| *e.weight())
            .min_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Adds an arc unconditionally, allowing parallel arcs.
    pub fn add_arc(&mut self, from: NodeIndex, to: NodeIndex, edge: RoadEdge) {
        self.graph.add_edge(from, to, edge);
    }

    /// Adds an arc unless an existing parallel arc makes it redundant, as
    /// decided by `comparator`. Existing arcs that the new arc makes
    /// redundant are removed. The outcome reports both the insertion and the
    /// evictions, so callers tracking arc changes see the full effect.
    pub fn add_arc_with<C>(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: RoadEdge,
        comparator: C,
    ) -> ArcInsertion
    where
        C: Fn(&RoadEdge, &RoadEdge) -> bool,
    {
        if self
            .graph
            .edges_connecting(from, to)
            .any(|e| comparator(e.weight(), &edge))
        {
            return ArcInsertion::default();
        }
        let mut evicted = 0;
        // Removal invalidates edge ids, so evict one arc at a time.
        loop {
            let dominated: Option<EdgeIndex> = self
                .graph
                .edges_connecting(from, to)
                .find(|e| comparator(&edge, e.weight()))
                .map(|e| e.id());
            match dominated {
                Some(id) => {
                    self.graph.remove_edge(id);
                    evicted += 1;
                }
                None => break,
            }
        }
        self.graph.add_edge(from, to, edge);
        ArcInsertion {
            inserted: true,
            evicted,
        }
    }

    /// Adds an arc together with its mirrored arc in the other storage
    /// direction, preserving the two-arcs-per-segment invariant.
    pub fn add_arc_pair(&mut self, from: NodeIndex, to: NodeIndex, edge: RoadEdge) {
        self.graph.add_edge(from, to, edge);
        self.graph.add_edge(to, from, edge.reversed());
    }

    /// Removes every arc stored from `from` to `to`. Returns `true` if at
    /// least one arc was removed. The mirrored arc from `to` to `from` is
    /// left untouched.
    pub fn delete_arc(&mut self, from: NodeIndex, to: NodeIndex) -> bool {
        let mut removed = false;
        while let Some(id) = self.graph.find_edge(from, to) {
            self.graph.remove_edge(id);
            removed = true;
        }
        removed
    }

    /// Iterator over all arcs of the graph with their endpoints.
    pub fn arcs(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, RoadEdge)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), *e.weight()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vertices() -> (RoadGraph, NodeIndex, NodeIndex) {
        let mut graph = RoadGraph::new();
        let a = graph.add_vertex(0.0, 0.0);
        let b = graph.add_vertex(0.0, 1.0);
        (graph, a, b)
    }

    #[test]
    fn add_and_get_vertex_test() {
        let mut graph = RoadGraph::new();
        let v = graph.add_vertex(48.8, 2.3);
        assert_eq!(graph.get_vertex(v), Some(&RoadNode { lat: 48.8, lon: 2.3 }));
        assert_eq!(graph.vertex_count(), 1);
        assert!(graph.get_arcs(v).is_empty());
    }

    #[test]
    fn add_arc_pair_mirrors_flags_test() {
        let (mut graph, a, b) = two_vertices();
        graph.add_arc_pair(a, b, RoadEdge::new(true, false, 3.0, 7));
        let forward = graph.arc_between(a, b).unwrap();
        let mirrored = graph.arc_between(b, a).unwrap();
        assert!(forward.forward && !forward.backward);
        assert!(!mirrored.forward && mirrored.backward);
        assert_eq!(forward.weight, mirrored.weight);
        assert_eq!(forward.tags, mirrored.tags);
    }

    #[test]
    fn overlaps_requires_direction_coverage_test() {
        let one_way = RoadEdge::new(true, false, 1.0, 0);
        let two_way = RoadEdge::new(true, true, 2.0, 0);
        // A cheaper one-way arc does not make a two-way arc redundant.
        assert!(!overlaps(&one_way, &two_way));
        assert!(overlaps(&two_way, &one_way));
        // Equal weight counts as covering.
        assert!(overlaps(
            &RoadEdge::new(true, true, 2.0, 0),
            &RoadEdge::new(true, true, 2.0, 0)
        ));
        assert!(!overlaps(
            &RoadEdge::new(true, true, 3.0, 0),
            &RoadEdge::new(true, true, 2.0, 0)
        ));
    }

    #[test]
    fn add_arc_with_drops_redundant_candidate_test() {
        let (mut graph, a, b) = two_vertices();
        assert!(graph
            .add_arc_with(a, b, RoadEdge::new(true, true, 2.0, 0), overlaps)
            .inserted);
        let outcome = graph.add_arc_with(a, b, RoadEdge::new(true, false, 5.0, 0), overlaps);
        assert_eq!(outcome, ArcInsertion::default());
        assert_eq!(graph.arc_count(), 1);
        assert_eq!(graph.arc_between(a, b).unwrap().weight, 2.0);
    }

    #[test]
    fn add_arc_with_evicts_dominated_arcs_test() {
        let (mut graph, a, b) = two_vertices();
        graph.add_arc(a, b, RoadEdge::new(true, false, 5.0, 0));
        graph.add_arc(a, b, RoadEdge::new(false, true, 6.0, 0));
        let outcome = graph.add_arc_with(a, b, RoadEdge::new(true, true, 4.0, 0), overlaps);
        // Both one-way arcs are covered by the new two-way arc.
        assert!(outcome.inserted);
        assert_eq!(outcome.evicted, 2);
        assert_eq!(graph.arc_count(), 1);
        let arc = graph.arc_between(a, b).unwrap();
        assert!(arc.forward && arc.backward);
        assert_eq!(arc.weight, 4.0);
    }

    #[test]
    fn get_arcs_idempotent_test() {
        let (mut graph, a, b) = two_vertices();
        let c = graph.add_vertex(0.0, 2.0);
        graph.add_arc_pair(a, b, RoadEdge::new(true, true, 1.0, 0));
        graph.add_arc_pair(a, c, RoadEdge::new(true, false, 2.0, 1));
        graph.delete_arc(a, b);
        // Repeated snapshots without intervening mutation are identical.
        assert_eq!(graph.get_arcs(a), graph.get_arcs(a));
        assert_eq!(graph.get_arcs(b), graph.get_arcs(b));
        assert_eq!(graph.get_arcs(c), graph.get_arcs(c));
    }

    #[test]
    fn delete_arc_removes_parallel_arcs_test() {
        let (mut graph, a, b) = two_vertices();
        graph.add_arc(a, b, RoadEdge::new(true, false, 1.0, 0));
        graph.add_arc(a, b, RoadEdge::new(false, true, 2.0, 0));
        graph.add_arc(b, a, RoadEdge::new(true, true, 3.0, 0));
        assert!(graph.delete_arc(a, b));
        assert!(!graph.has_neighbour(a, b));
        // The arc stored in the other direction is untouched.
        assert!(graph.has_neighbour(b, a));
        assert!(!graph.delete_arc(a, b));
    }

    #[test]
    fn shortcut_round_trip_test() {
        let mut graph = RoadGraph::new();
        let v = graph.add_vertex(0.0, 0.0);
        let shortcut = RoadEdge::shortcut(true, false, 4.0, v);
        assert!(shortcut.is_shortcut());
        assert_eq!(shortcut.contracted, Some(v));
        let back = shortcut.reversed();
        assert!(!back.forward && back.backward);
        assert_eq!(back.contracted, Some(v));
    }
}
