//! Label-correcting shortest-path search.
//!
//! [`DijkstraSearch`] owns the reusable allocations of a search run: the map
//! from vertices to their records and the frontier queue. The expansion
//! behaviour is delegated to a [`SearchOps`] implementation and the start and
//! stop conditions to a [`SearchQuery`].

pub mod ops;
pub mod query;

use anyhow::{anyhow, Result};
use hashbrown::HashMap;
use ops::{SearchOps, VisitData};
use ordered_float::OrderedFloat;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use priority_queue::PriorityQueue;
use query::SearchQuery;
use std::cmp::Reverse;

/// A search with its allocations, reusable across runs.
#[derive(Debug, Default)]
pub struct DijkstraSearch<D = (f64, Option<NodeIndex>)> {
    data: HashMap<NodeIndex, D>,
    queue: PriorityQueue<NodeIndex, Reverse<OrderedFloat<f64>>>,
}

impl<D: VisitData> DijkstraSearch<D> {
    pub fn new() -> Self {
        DijkstraSearch {
            data: HashMap::new(),
            queue: PriorityQueue::new(),
        }
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.queue.clear();
    }

    /// Runs the search until the query's stop condition holds, the frontier
    /// is exhausted or the expansion's cutoff triggers.
    ///
    /// Returns the first settled target and its weight, if any target was
    /// reached. The records of every settled and frontier vertex stay
    /// readable until the next run.
    pub fn run<'g, O>(&mut self, query: &SearchQuery, ops: &mut O) -> Option<(NodeIndex, f64)>
    where
        O: SearchOps<'g, Data = D>,
    {
        self.reset();
        for (source, weight) in query.sources() {
            match self.data.get_mut(&source) {
                Some(data) if data.weight() <= weight => continue,
                Some(data) => *data = ops.new_data(weight, None),
                None => {
                    self.data.insert(source, ops.new_data(weight, None));
                }
            }
            self.queue
                .push_increase(source, Reverse(OrderedFloat(weight)));
        }
        let mut first_target = None;
        let mut remaining_targets = query.target_count();
        while let Some((vertex, Reverse(OrderedFloat(key)))) = self.queue.pop() {
            if ops.cutoff(key) {
                break;
            }
            // The record is put back after expansion; self-loops are skipped
            // below so the vertex cannot be relaxed while it is out.
            let vertex_data = self.data.remove(&vertex).unwrap();
            if ops.skip(vertex, &vertex_data) {
                self.data.insert(vertex, vertex_data);
                continue;
            }
            if query.is_target(vertex) {
                if first_target.is_none() {
                    first_target = Some((vertex, key));
                }
                remaining_targets -= 1;
                if query.stop_at_first() || remaining_targets == 0 {
                    self.data.insert(vertex, vertex_data);
                    break;
                }
            }
            for edge in ops.edges_from(vertex) {
                let neighbour = edge.target();
                if neighbour == vertex {
                    continue;
                }
                if !ops.allow_edge(&vertex_data, edge) {
                    continue;
                }
                let weight = ops.link(&vertex_data, edge);
                match self.data.get_mut(&neighbour) {
                    Some(neighbour_data) => {
                        let improved = ops.improve(weight, vertex, neighbour_data);
                        if improved {
                            self.queue
                                .push_increase(neighbour, Reverse(OrderedFloat(weight)));
                        }
                        ops.edge_relaxed(edge, &vertex_data, neighbour_data, improved);
                    }
                    None => {
                        let mut neighbour_data = ops.new_data(weight, Some(vertex));
                        ops.edge_relaxed(edge, &vertex_data, &mut neighbour_data, true);
                        self.data.insert(neighbour, neighbour_data);
                        self.queue.push(neighbour, Reverse(OrderedFloat(weight)));
                    }
                }
            }
            self.data.insert(vertex, vertex_data);
        }
        first_target
    }

    /// Best known weight of a vertex after a run.
    pub fn get_weight(&self, vertex: NodeIndex) -> Option<f64> {
        self.data.get(&vertex).map(|d| d.weight())
    }

    pub fn get_predecessor(&self, vertex: NodeIndex) -> Option<NodeIndex> {
        self.data.get(&vertex).and_then(|d| d.predecessor())
    }

    /// Labelled vertices of the last run with their weights. Vertices still
    /// on the frontier when the run ended carry tentative weights.
    pub fn iter_weights(&self) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
        self.data.iter().map(|(&v, d)| (v, d.weight()))
    }

    /// Path from a source to `end`, following predecessors, as a vertex
    /// sequence ending at `end`.
    ///
    /// Fails if predecessors form a cycle, which means the expansion produced
    /// inconsistent weights (e.g. a negative arc weight).
    pub fn get_path(&self, end: NodeIndex) -> Result<Vec<NodeIndex>> {
        let mut path = vec![end];
        let mut current = end;
        while let Some(predecessor) = self.get_predecessor(current) {
            if path.len() > self.data.len() {
                return Err(anyhow!(
                    "predecessor cycle detected while rebuilding the path to vertex {}",
                    end.index()
                ));
            }
            path.push(predecessor);
            current = predecessor;
        }
        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::ops::{AllowAll, Bound, HopLimitedDijkstra, RoadDijkstra};
    use super::*;
    use crate::graph::{RoadEdge, RoadGraph};

    /// 0 --1-- 1 --1-- 2
    ///  \             /
    ///   ----5.0-----
    /// All arcs bidirectional.
    fn triangle() -> (RoadGraph, Vec<NodeIndex>) {
        let mut graph = RoadGraph::new();
        let nodes: Vec<_> = (0..3).map(|i| graph.add_vertex(0.0, i as f64)).collect();
        graph.add_arc_pair(nodes[0], nodes[1], RoadEdge::new(true, true, 1.0, 0));
        graph.add_arc_pair(nodes[1], nodes[2], RoadEdge::new(true, true, 1.0, 0));
        graph.add_arc_pair(nodes[0], nodes[2], RoadEdge::new(true, true, 5.0, 0));
        (graph, nodes)
    }

    #[test]
    fn point_to_point_test() {
        let (graph, nodes) = triangle();
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(&graph, AllowAll);
        let reached = search.run(&SearchQuery::point_to_point(nodes[0], nodes[2]), &mut ops);
        assert_eq!(reached, Some((nodes[2], 2.0)));
        assert_eq!(search.get_path(nodes[2]).unwrap(), nodes);
    }

    #[test]
    fn one_way_is_respected_test() {
        let mut graph = RoadGraph::new();
        let a = graph.add_vertex(0.0, 0.0);
        let b = graph.add_vertex(0.0, 1.0);
        graph.add_arc_pair(a, b, RoadEdge::new(true, false, 1.0, 0));
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(&graph, AllowAll);
        assert!(search.run(&SearchQuery::point_to_point(b, a), &mut ops).is_none());
        assert_eq!(
            search.run(&SearchQuery::point_to_point(a, b), &mut ops),
            Some((b, 1.0))
        );
    }

    #[test]
    fn backward_search_test() {
        let mut graph = RoadGraph::new();
        let a = graph.add_vertex(0.0, 0.0);
        let b = graph.add_vertex(0.0, 1.0);
        graph.add_arc_pair(a, b, RoadEdge::new(true, false, 2.0, 0));
        // Backward from b follows the arc against its direction.
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::backward(&graph, AllowAll);
        assert_eq!(
            search.run(&SearchQuery::point_to_point(b, a), &mut ops),
            Some((a, 2.0))
        );
    }

    #[test]
    fn bounded_search_stops_test() {
        let (graph, nodes) = triangle();
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(&graph, AllowAll).bounded(Bound::at(1.5));
        assert!(search
            .run(&SearchQuery::point_to_point(nodes[0], nodes[2]), &mut ops)
            .is_none());
        // Vertex 1 was settled before the cutoff.
        assert_eq!(search.get_weight(nodes[1]), Some(1.0));
    }

    #[test]
    fn excluded_vertex_forces_detour_test() {
        let (graph, nodes) = triangle();
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(&graph, AllowAll).excluding(nodes[1]);
        assert_eq!(
            search.run(&SearchQuery::point_to_point(nodes[0], nodes[2]), &mut ops),
            Some((nodes[2], 5.0))
        );
    }

    #[test]
    fn hop_limit_truncates_search_test() {
        let mut graph = RoadGraph::new();
        let nodes: Vec<_> = (0..4).map(|i| graph.add_vertex(0.0, i as f64)).collect();
        for w in nodes.windows(2) {
            graph.add_arc_pair(w[0], w[1], RoadEdge::new(true, true, 1.0, 0));
        }
        let mut search = DijkstraSearch::new();
        let query = SearchQuery::point_to_point(nodes[0], nodes[3]);
        let mut limited =
            HopLimitedDijkstra::new(RoadDijkstra::forward(&graph, AllowAll), 2);
        assert!(search.run(&query, &mut limited).is_none());
        let mut unlimited =
            HopLimitedDijkstra::new(RoadDijkstra::forward(&graph, AllowAll), 3);
        assert_eq!(search.run(&query, &mut unlimited), Some((nodes[3], 3.0)));
    }

    #[test]
    fn one_to_many_settles_all_targets_test() {
        let (graph, nodes) = triangle();
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(&graph, AllowAll);
        let query = SearchQuery::one_to_many(nodes[0], &[nodes[1], nodes[2]]);
        search.run(&query, &mut ops);
        assert_eq!(search.get_weight(nodes[1]), Some(1.0));
        assert_eq!(search.get_weight(nodes[2]), Some(2.0));
    }
}
