//! Priority and witness calculators driving the contraction engine.

use crate::graph::{RoadEdge, RoadGraph};
use crate::search::ops::{AllowAll, Bound, HopData, HopLimitedDijkstra, RoadDijkstra};
use crate::search::query::SearchQuery;
use crate::search::DijkstraSearch;
use object_pool::Pool;
use petgraph::graph::NodeIndex;

/// Assigns a contraction priority to a vertex. Smaller is contracted first;
/// `f64::INFINITY` means the vertex must never be contracted.
pub trait VertexWeightCalculator {
    fn calculate(&self, graph: &RoadGraph, vertex: NodeIndex) -> f64;

    /// Called after a vertex has been contracted and its shortcuts inserted.
    fn notify_contracted(&mut self, _graph: &RoadGraph, _vertex: NodeIndex) {}
}

/// Decides whether a path from `from` to `to` that avoids `via` exists with a
/// weight of at most `max_weight`. A positive answer suppresses the shortcut
/// the path would duplicate, so implementations must never report a witness
/// that does not exist.
pub trait WitnessCalculator {
    fn exists(
        &self,
        graph: &RoadGraph,
        from: NodeIndex,
        to: NodeIndex,
        via: NodeIndex,
        max_weight: f64,
        max_hops: u8,
    ) -> bool;
}

type WitnessData = HopData<(f64, Option<NodeIndex>)>;

/// Witness calculator running a hop- and weight-bounded forward search on
/// the current graph, with the contracted vertex excluded.
///
/// Search allocations are pooled so that parallel priority evaluations do not
/// allocate a fresh search each.
pub struct DijkstraWitness {
    pool: Pool<DijkstraSearch<WitnessData>>,
}

impl Default for DijkstraWitness {
    fn default() -> Self {
        DijkstraWitness {
            pool: Pool::new(rayon::current_num_threads(), DijkstraSearch::new),
        }
    }
}

impl DijkstraWitness {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WitnessCalculator for DijkstraWitness {
    fn exists(
        &self,
        graph: &RoadGraph,
        from: NodeIndex,
        to: NodeIndex,
        via: NodeIndex,
        max_weight: f64,
        max_hops: u8,
    ) -> bool {
        debug_assert_ne!(from, to);
        let mut search = self.pool.pull(DijkstraSearch::new);
        let mut ops = HopLimitedDijkstra::new(
            RoadDijkstra::forward(graph, AllowAll)
                .bounded(Bound::at(max_weight))
                .excluding(via),
            max_hops,
        );
        // The bound guarantees the target is only settled at a weight of at
        // most `max_weight`, so reaching it is the witness.
        search
            .run(&SearchQuery::point_to_point(from, to), &mut ops)
            .is_some()
    }
}

/// The shortcut the contraction of `via` would insert between its neighbours
/// `x` and `y`, or `None` if nothing needs to be inserted.
///
/// `xe` and `ye` are the arcs stored from `via` to `x` and `y`. A through
/// path `x -> via -> y` exists when `xe` is traversable backward and `ye`
/// forward; each traversable direction is kept only if no witness path of
/// the same weight or less avoids `via`. A traversal-less shortcut is still
/// inserted when `x` and `y` are not yet neighbours, so that the adjacency
/// created by the contraction is recorded.
pub(crate) fn shortcut_between<C>(
    graph: &RoadGraph,
    witness: &C,
    via: NodeIndex,
    x: NodeIndex,
    xe: &RoadEdge,
    y: NodeIndex,
    ye: &RoadEdge,
    max_hops: u8,
) -> Option<RoadEdge>
where
    C: WitnessCalculator + ?Sized,
{
    let weight = xe.weight + ye.weight;
    let through_forward = xe.backward && ye.forward;
    let through_backward = ye.backward && xe.forward;
    if !through_forward && !through_backward {
        return None;
    }
    let forward = through_forward && !witness.exists(graph, x, y, via, weight, max_hops);
    let backward = through_backward && !witness.exists(graph, y, x, via, weight, max_hops);
    if forward || backward || !graph.has_neighbour(x, y) {
        Some(RoadEdge::shortcut(forward, backward, weight, via))
    } else {
        None
    }
}

/// Edge-difference priority: arcs a contraction would add minus arcs it
/// would remove, plus the number of already-contracted neighbours to keep
/// the hierarchy flat.
pub struct EdgeDifference<C = DijkstraWitness> {
    witness: C,
    max_hops: u8,
    contracted_neighbours: Vec<u32>,
}

impl EdgeDifference<DijkstraWitness> {
    pub fn new(max_hops: u8) -> Self {
        Self::with_witness(DijkstraWitness::default(), max_hops)
    }
}

impl<C: WitnessCalculator> EdgeDifference<C> {
    pub fn with_witness(witness: C, max_hops: u8) -> Self {
        EdgeDifference {
            witness,
            max_hops,
            contracted_neighbours: Vec::new(),
        }
    }

    fn depth(&self, vertex: NodeIndex) -> u32 {
        self.contracted_neighbours
            .get(vertex.index())
            .copied()
            .unwrap_or(0)
    }
}

impl<C: WitnessCalculator> VertexWeightCalculator for EdgeDifference<C> {
    fn calculate(&self, graph: &RoadGraph, vertex: NodeIndex) -> f64 {
        let arcs = graph.get_arcs(vertex);
        // Each outgoing arc dies together with its mirrored arc.
        let removed = 2 * arcs.len();
        let mut added = 0usize;
        for (i, &(x, ref xe)) in arcs.iter().enumerate() {
            for &(y, ref ye) in &arcs[..i] {
                if x == y {
                    continue;
                }
                if shortcut_between(graph, &self.witness, vertex, x, xe, y, ye, self.max_hops)
                    .is_some()
                {
                    added += 2;
                }
            }
        }
        added as f64 - removed as f64 + self.depth(vertex) as f64
    }

    fn notify_contracted(&mut self, graph: &RoadGraph, vertex: NodeIndex) {
        for (neighbour, _) in graph.get_arcs(vertex) {
            let index = neighbour.index();
            if self.contracted_neighbours.len() <= index {
                self.contracted_neighbours.resize(index + 1, 0);
            }
            self.contracted_neighbours[index] += 1;
        }
    }
}
