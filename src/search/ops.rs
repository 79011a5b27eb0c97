//! Expansion behaviour of the search.
//!
//! The core loop in [`super::DijkstraSearch`] is parameterized by a
//! [`SearchOps`] implementation which decides which arcs to follow, how to
//! accumulate weights and when to give up. [`RoadDijkstra`] is the plain
//! directed expansion over a [`RoadGraph`]; [`HopLimitedDijkstra`] and
//! [`ConstrainedDijkstra`] wrap another implementation to add a hop limit and
//! label-transition constraints.

use crate::graph::{RoadEdge, RoadGraph, TagsId};
use petgraph::graph::{Edges, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use std::cmp;

/// Reference to an arc of the road graph, valid for the graph borrow `'g`.
pub type ArcRef<'g> = petgraph::graph::EdgeReference<'g, RoadEdge>;

/// Per-vertex record maintained by the search.
pub trait VisitData {
    /// Best known weight from the sources to this vertex.
    fn weight(&self) -> f64;
    /// Vertex this one was best reached from, `None` for sources.
    fn predecessor(&self) -> Option<NodeIndex>;
}

/// The plain record: a weight and a predecessor.
impl VisitData for (f64, Option<NodeIndex>) {
    fn weight(&self) -> f64 {
        self.0
    }

    fn predecessor(&self) -> Option<NodeIndex> {
        self.1
    }
}

/// Decides whether an arc is usable at all, given its tags handle.
///
/// This is the seam to the external tag collection: a filter typically looks
/// up the road class behind the handle and checks it against a vehicle
/// profile.
pub trait EdgeFilter {
    fn can_traverse(&self, tags: TagsId) -> bool;
}

/// Filter accepting every arc.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl EdgeFilter for AllowAll {
    fn can_traverse(&self, _tags: TagsId) -> bool {
        true
    }
}

impl<F: EdgeFilter + ?Sized> EdgeFilter for &F {
    fn can_traverse(&self, tags: TagsId) -> bool {
        (*self).can_traverse(tags)
    }
}

/// Decides whether a route may continue on an arc, given the tags of the arc
/// the current vertex was reached by. Implementations can express turn
/// restrictions or label-sequence rules.
pub trait RouteConstraint {
    fn allows(&self, arrived_by: Option<TagsId>, next: TagsId) -> bool;
}

/// An optional upper bound on search keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bound(Option<f64>);

impl Bound {
    pub fn none() -> Self {
        Bound(None)
    }

    pub fn at(value: f64) -> Self {
        Bound(Some(value))
    }

    pub fn from_option(value: Option<f64>) -> Self {
        Bound(value)
    }

    /// `true` if the bound is set and `key` lies beyond it.
    pub fn exceeded_by(&self, key: f64) -> bool {
        self.0.map(|bound| key > bound).unwrap_or(false)
    }
}

/// Expansion behaviour of a search over a road graph.
pub trait SearchOps<'g> {
    type Data: VisitData;

    /// Arcs to consider when a vertex is settled.
    fn edges_from(&self, vertex: NodeIndex) -> Edges<'g, RoadEdge, Directed>;

    /// Whether the arc may be relaxed from a vertex holding `from`.
    fn allow_edge(&self, from: &Self::Data, edge: ArcRef<'g>) -> bool;

    /// Weight at the head of the arc when coming from a vertex holding
    /// `from`.
    fn link(&self, from: &Self::Data, edge: ArcRef<'g>) -> f64;

    /// Record for a vertex reached for the first time.
    fn new_data(&self, weight: f64, predecessor: Option<NodeIndex>) -> Self::Data;

    /// Updates an existing record with a better weight. Returns `true` if the
    /// record improved.
    fn improve(&self, weight: f64, predecessor: NodeIndex, data: &mut Self::Data) -> bool;

    /// Called after each relaxation, whether or not it improved the record.
    fn edge_relaxed(
        &mut self,
        _edge: ArcRef<'g>,
        _from: &Self::Data,
        _to: &mut Self::Data,
        _improved: bool,
    ) {
    }

    /// Whether the search should stop before settling a vertex with this key.
    fn cutoff(&self, _key: f64) -> bool {
        false
    }

    /// Whether the vertex should be settled without being expanded.
    fn skip(&self, _vertex: NodeIndex, _data: &Self::Data) -> bool {
        false
    }
}

/// Direction in which arcs are traversed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

/// Directed expansion over a road graph.
///
/// Only outgoing arcs are read: the mirrored-arc invariant of [`RoadGraph`]
/// guarantees that every arc reaching a vertex is also stored leaving it, so
/// a backward search simply follows outgoing arcs whose `backward` flag is
/// set.
pub struct RoadDijkstra<'g, F> {
    graph: &'g RoadGraph,
    direction: SearchDirection,
    filter: F,
    bound: Bound,
    excluded: Option<NodeIndex>,
}

impl<'g, F: EdgeFilter> RoadDijkstra<'g, F> {
    pub fn forward(graph: &'g RoadGraph, filter: F) -> Self {
        RoadDijkstra {
            graph,
            direction: SearchDirection::Forward,
            filter,
            bound: Bound::none(),
            excluded: None,
        }
    }

    pub fn backward(graph: &'g RoadGraph, filter: F) -> Self {
        RoadDijkstra {
            graph,
            direction: SearchDirection::Backward,
            filter,
            bound: Bound::none(),
            excluded: None,
        }
    }

    /// Stops the search once every key exceeds the bound.
    pub fn bounded(mut self, bound: Bound) -> Self {
        self.bound = bound;
        self
    }

    /// Never relaxes an arc leading to `vertex`, as if it were absent from
    /// the graph. Used by witness searches to bypass the contracted vertex.
    pub fn excluding(mut self, vertex: NodeIndex) -> Self {
        self.excluded = Some(vertex);
        self
    }
}

impl<'g, F: EdgeFilter> SearchOps<'g> for RoadDijkstra<'g, F> {
    type Data = (f64, Option<NodeIndex>);

    fn edges_from(&self, vertex: NodeIndex) -> Edges<'g, RoadEdge, Directed> {
        self.graph.out_arcs(vertex)
    }

    fn allow_edge(&self, _from: &Self::Data, edge: ArcRef<'g>) -> bool {
        let arc = edge.weight();
        let traversable = match self.direction {
            SearchDirection::Forward => arc.forward,
            SearchDirection::Backward => arc.backward,
        };
        traversable
            && self.excluded != Some(edge.target())
            && self.filter.can_traverse(arc.tags)
    }

    fn link(&self, from: &Self::Data, edge: ArcRef<'g>) -> f64 {
        from.0 + edge.weight().weight
    }

    fn new_data(&self, weight: f64, predecessor: Option<NodeIndex>) -> Self::Data {
        (weight, predecessor)
    }

    fn improve(&self, weight: f64, predecessor: NodeIndex, data: &mut Self::Data) -> bool {
        if weight < data.0 {
            *data = (weight, Some(predecessor));
            true
        } else {
            false
        }
    }

    fn cutoff(&self, key: f64) -> bool {
        self.bound.exceeded_by(key)
    }
}

/// Record of a wrapped search, extended with a hop count.
#[derive(Clone, Copy, Debug)]
pub struct HopData<D> {
    pub data: D,
    /// Number of arcs on the adopted path from the sources, 0 for sources.
    pub hops: u8,
}

impl<D: VisitData> VisitData for HopData<D> {
    fn weight(&self) -> f64 {
        self.data.weight()
    }

    fn predecessor(&self) -> Option<NodeIndex> {
        self.data.predecessor()
    }
}

/// Wraps a search to settle only vertices within a maximum number of hops
/// from the sources.
///
/// Vertices beyond the limit may still receive a label but are never
/// expanded, so the wrapped search explores a truncated neighbourhood. Used
/// to keep witness searches cheap.
pub struct HopLimitedDijkstra<O> {
    ops: O,
    limit: u8,
}

impl<O> HopLimitedDijkstra<O> {
    pub fn new(ops: O, limit: u8) -> Self {
        HopLimitedDijkstra { ops, limit }
    }
}

impl<'g, O: SearchOps<'g>> SearchOps<'g> for HopLimitedDijkstra<O> {
    type Data = HopData<O::Data>;

    fn edges_from(&self, vertex: NodeIndex) -> Edges<'g, RoadEdge, Directed> {
        self.ops.edges_from(vertex)
    }

    fn allow_edge(&self, from: &Self::Data, edge: ArcRef<'g>) -> bool {
        self.ops.allow_edge(&from.data, edge)
    }

    fn link(&self, from: &Self::Data, edge: ArcRef<'g>) -> f64 {
        self.ops.link(&from.data, edge)
    }

    fn new_data(&self, weight: f64, predecessor: Option<NodeIndex>) -> Self::Data {
        HopData {
            data: self.ops.new_data(weight, predecessor),
            hops: 0,
        }
    }

    fn improve(&self, weight: f64, predecessor: NodeIndex, data: &mut Self::Data) -> bool {
        self.ops.improve(weight, predecessor, &mut data.data)
    }

    fn edge_relaxed(
        &mut self,
        edge: ArcRef<'g>,
        from: &Self::Data,
        to: &mut Self::Data,
        improved: bool,
    ) {
        let hops = from.hops.saturating_add(1);
        to.hops = if to.hops == 0 {
            hops
        } else {
            cmp::min(to.hops, hops)
        };
        self.ops.edge_relaxed(edge, &from.data, &mut to.data, improved);
    }

    fn cutoff(&self, key: f64) -> bool {
        self.ops.cutoff(key)
    }

    fn skip(&self, vertex: NodeIndex, data: &Self::Data) -> bool {
        data.hops > self.limit || self.ops.skip(vertex, &data.data)
    }
}

/// Record of a wrapped search, extended with the tags of the arc the vertex
/// was reached by.
#[derive(Clone, Copy, Debug)]
pub struct TaggedData<D> {
    pub data: D,
    pub arrived_by: Option<TagsId>,
}

impl<D: VisitData> VisitData for TaggedData<D> {
    fn weight(&self) -> f64 {
        self.data.weight()
    }

    fn predecessor(&self) -> Option<NodeIndex> {
        self.data.predecessor()
    }
}

/// Wraps a search to reject arc transitions forbidden by a
/// [`RouteConstraint`].
pub struct ConstrainedDijkstra<O, C> {
    ops: O,
    constraint: C,
}

impl<O, C> ConstrainedDijkstra<O, C> {
    pub fn new(ops: O, constraint: C) -> Self {
        ConstrainedDijkstra { ops, constraint }
    }
}

impl<'g, O: SearchOps<'g>, C: RouteConstraint> SearchOps<'g> for ConstrainedDijkstra<O, C> {
    type Data = TaggedData<O::Data>;

    fn edges_from(&self, vertex: NodeIndex) -> Edges<'g, RoadEdge, Directed> {
        self.ops.edges_from(vertex)
    }

    fn allow_edge(&self, from: &Self::Data, edge: ArcRef<'g>) -> bool {
        self.ops.allow_edge(&from.data, edge)
            && self.constraint.allows(from.arrived_by, edge.weight().tags)
    }

    fn link(&self, from: &Self::Data, edge: ArcRef<'g>) -> f64 {
        self.ops.link(&from.data, edge)
    }

    fn new_data(&self, weight: f64, predecessor: Option<NodeIndex>) -> Self::Data {
        TaggedData {
            data: self.ops.new_data(weight, predecessor),
            arrived_by: None,
        }
    }

    fn improve(&self, weight: f64, predecessor: NodeIndex, data: &mut Self::Data) -> bool {
        self.ops.improve(weight, predecessor, &mut data.data)
    }

    fn edge_relaxed(
        &mut self,
        edge: ArcRef<'g>,
        from: &Self::Data,
        to: &mut Self::Data,
        improved: bool,
    ) {
        if improved {
            to.arrived_by = Some(edge.weight().tags);
        }
        self.ops.edge_relaxed(edge, &from.data, &mut to.data, improved);
    }

    fn cutoff(&self, key: f64) -> bool {
        self.ops.cutoff(key)
    }

    fn skip(&self, vertex: NodeIndex, data: &Self::Data) -> bool {
        self.ops.skip(vertex, &data.data)
    }
}
