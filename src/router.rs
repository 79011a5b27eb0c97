//! High-level routing operations.
//!
//! A [`Router`] borrows a road graph and a traversability filter and exposes
//! the routing operations built on the generic search: point-to-point
//! routes, one-to-many and many-to-many weight matrices, range queries and
//! closest-target routes starting from visit lists. Routes over a contracted
//! graph contain shortcut arcs; [`Router::expand_route`] unpacks them back
//! to original vertices.

use crate::graph::RoadGraph;
use crate::search::ops::{
    AllowAll, Bound, ConstrainedDijkstra, EdgeFilter, RoadDijkstra, RouteConstraint,
};
use crate::search::query::{SearchQuery, VisitList};
use crate::search::DijkstraSearch;
use anyhow::{ensure, Context, Result};
use object_pool::Pool;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use rayon::prelude::*;

/// A route over the graph: the vertices crossed, in order, and the total
/// weight.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub vertices: Vec<NodeIndex>,
    pub weight: f64,
}

pub struct Router<'g, F = AllowAll> {
    graph: &'g RoadGraph,
    filter: F,
}

impl<'g> Router<'g, AllowAll> {
    pub fn new(graph: &'g RoadGraph) -> Self {
        Router {
            graph,
            filter: AllowAll,
        }
    }
}

impl<'g, F: EdgeFilter> Router<'g, F> {
    pub fn with_filter(graph: &'g RoadGraph, filter: F) -> Self {
        Router { graph, filter }
    }

    pub fn graph(&self) -> &'g RoadGraph {
        self.graph
    }

    /// Shortest route from `source` to `target`, or `None` if the target is
    /// unreachable (within `max_weight`, if given).
    pub fn calculate(
        &self,
        source: NodeIndex,
        target: NodeIndex,
        max_weight: Option<f64>,
    ) -> Result<Option<Route>> {
        self.ensure_vertex(source)?;
        self.ensure_vertex(target)?;
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(self.graph, &self.filter)
            .bounded(Bound::from_option(max_weight));
        match search.run(&SearchQuery::point_to_point(source, target), &mut ops) {
            Some((vertex, weight)) => {
                let vertices = search.get_path(vertex)?;
                Ok(Some(Route { vertices, weight }))
            }
            None => Ok(None),
        }
    }

    /// Weight of the shortest route from `source` to `target`, without
    /// rebuilding the route itself. Unknown vertices yield `None`, like
    /// unreachable ones.
    pub fn calculate_weight(
        &self,
        source: NodeIndex,
        target: NodeIndex,
        max_weight: Option<f64>,
    ) -> Option<f64> {
        self.graph.get_vertex(source)?;
        self.graph.get_vertex(target)?;
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(self.graph, &self.filter)
            .bounded(Bound::from_option(max_weight));
        search
            .run(&SearchQuery::point_to_point(source, target), &mut ops)
            .map(|(_, weight)| weight)
    }

    /// Shortest route honouring a transition constraint.
    pub fn calculate_constrained<C: RouteConstraint>(
        &self,
        source: NodeIndex,
        target: NodeIndex,
        constraint: C,
        max_weight: Option<f64>,
    ) -> Result<Option<Route>> {
        self.ensure_vertex(source)?;
        self.ensure_vertex(target)?;
        let mut search = DijkstraSearch::new();
        let inner = RoadDijkstra::forward(self.graph, &self.filter)
            .bounded(Bound::from_option(max_weight));
        let mut ops = ConstrainedDijkstra::new(inner, constraint);
        match search.run(&SearchQuery::point_to_point(source, target), &mut ops) {
            Some((vertex, weight)) => {
                let vertices = search.get_path(vertex)?;
                Ok(Some(Route { vertices, weight }))
            }
            None => Ok(None),
        }
    }

    /// Shortest route from any source entry to the overall cheapest target
    /// entry. Entry weights and prefix paths are folded into the result.
    pub fn calculate_to_closest(
        &self,
        sources: &VisitList,
        targets: &VisitList,
        max_weight: Option<f64>,
    ) -> Result<Option<Route>> {
        if sources.is_empty() || targets.is_empty() {
            return Ok(None);
        }
        for entry in sources.entries().iter().chain(targets.entries()) {
            self.ensure_vertex(entry.vertex)?;
        }
        // The lists may already intersect, in which case no search can beat
        // going straight from one entry to the other.
        let direct = sources.best_common_vertex(targets);
        let mut search = DijkstraSearch::default();
        let mut ops = RoadDijkstra::forward(self.graph, &self.filter)
            .bounded(Bound::from_option(max_weight));
        search.run(
            &SearchQuery::from_visit_lists(sources, targets, false),
            &mut ops,
        );
        let mut best = None;
        for entry in targets.entries() {
            if let Some(weight) = search.get_weight(entry.vertex) {
                let total = weight + entry.weight;
                if best
                    .as_ref()
                    .map(|&(w, _)| total < w)
                    .unwrap_or(true)
                {
                    best = Some((total, entry));
                }
            }
        }
        if let Some((weight, source, target)) = direct {
            if best.as_ref().map(|&(w, _)| weight < w).unwrap_or(true) {
                if max_weight.map(|m| weight > m).unwrap_or(false) {
                    return Ok(None);
                }
                let mut vertices = source.path.clone();
                vertices.extend_from_slice(&target.path[1..]);
                return Ok(Some(Route { vertices, weight }));
            }
        }
        let Some((weight, target)) = best else {
            return Ok(None);
        };
        if max_weight.map(|m| weight > m).unwrap_or(false) {
            return Ok(None);
        }
        let path = search.get_path(target.vertex)?;
        let first = *path.first().context("empty path from the search")?;
        let source = sources
            .entries()
            .iter()
            .filter(|e| e.vertex == first)
            .min_by(|a, b| a.weight.total_cmp(&b.weight))
            .context("path does not start at a source entry")?;
        let mut vertices = source.path.clone();
        vertices.pop();
        vertices.extend_from_slice(&path);
        vertices.extend_from_slice(&target.path[1..]);
        Ok(Some(Route { vertices, weight }))
    }

    /// Weights from one source to each target, `None` for targets out of
    /// reach (or beyond `max_weight`).
    pub fn calculate_one_to_many(
        &self,
        source: NodeIndex,
        targets: &[NodeIndex],
        max_weight: Option<f64>,
    ) -> Vec<Option<f64>> {
        let mut search = DijkstraSearch::default();
        let query = SearchQuery::one_to_many(source, targets);
        self.weights_for(&query, targets, max_weight, &mut search)
    }

    /// Weights from a visit list to each target, with the entry weights
    /// folded in.
    pub fn calculate_one_to_many_visits(
        &self,
        sources: &VisitList,
        targets: &[NodeIndex],
        max_weight: Option<f64>,
    ) -> Vec<Option<f64>> {
        let mut search = DijkstraSearch::default();
        let query = SearchQuery::visits_to_many(sources, targets);
        self.weights_for(&query, targets, max_weight, &mut search)
    }

    /// Weight matrix between sources and targets, one source per row,
    /// computed in parallel.
    pub fn calculate_many_to_many(
        &self,
        sources: &[NodeIndex],
        targets: &[NodeIndex],
        max_weight: Option<f64>,
    ) -> Vec<Vec<Option<f64>>>
    where
        F: Sync,
    {
        let pool = Pool::new(rayon::current_num_threads(), DijkstraSearch::new);
        sources
            .par_iter()
            .map_init(
                || pool.pull(DijkstraSearch::new),
                |search, &source| {
                    let query = SearchQuery::one_to_many(source, targets);
                    self.weights_for(&query, targets, max_weight, search)
                },
            )
            .collect()
    }

    /// Weight matrix with one row per source visit list, computed in
    /// parallel.
    pub fn calculate_many_to_many_visits(
        &self,
        sources: &[VisitList],
        targets: &[NodeIndex],
        max_weight: Option<f64>,
    ) -> Vec<Vec<Option<f64>>>
    where
        F: Sync,
    {
        let pool = Pool::new(rayon::current_num_threads(), DijkstraSearch::new);
        sources
            .par_iter()
            .map_init(
                || pool.pull(DijkstraSearch::new),
                |search, source| {
                    let query = SearchQuery::visits_to_many(source, targets);
                    self.weights_for(&query, targets, max_weight, search)
                },
            )
            .collect()
    }

    /// Vertices reachable from `source` at a weight of at most `max_weight`,
    /// with their weights. The source itself is not reported.
    pub fn calculate_range(&self, source: NodeIndex, max_weight: f64) -> Vec<(NodeIndex, f64)> {
        let mut search = DijkstraSearch::default();
        let mut ops =
            RoadDijkstra::forward(self.graph, &self.filter).bounded(Bound::at(max_weight));
        search.run(&SearchQuery::range(source), &mut ops);
        search
            .iter_weights()
            .filter(|&(vertex, weight)| vertex != source && weight <= max_weight)
            .collect()
    }

    /// Whether `source` can reach anything at all within `max_weight`.
    pub fn check_connectivity(&self, source: NodeIndex, max_weight: f64) -> bool {
        !self.calculate_range(source, max_weight).is_empty()
    }

    /// Replaces every shortcut arc of a route by the pair of arcs it
    /// bypasses, recursively, yielding a route over original arcs only.
    pub fn expand_route(&self, route: &Route) -> Result<Route> {
        let mut vertices = Vec::with_capacity(route.vertices.len());
        for pair in route.vertices.windows(2) {
            self.expand_segment(pair[0], pair[1], &mut vertices)?;
        }
        if let Some(&last) = route.vertices.last() {
            vertices.push(last);
        }
        Ok(Route {
            vertices,
            weight: route.weight,
        })
    }

    fn ensure_vertex(&self, vertex: NodeIndex) -> Result<()> {
        ensure!(
            self.graph.get_vertex(vertex).is_some(),
            "vertex {} does not exist in the graph",
            vertex.index()
        );
        Ok(())
    }

    fn weights_for(
        &self,
        query: &SearchQuery,
        targets: &[NodeIndex],
        max_weight: Option<f64>,
        search: &mut DijkstraSearch,
    ) -> Vec<Option<f64>> {
        let mut ops = RoadDijkstra::forward(self.graph, &self.filter)
            .bounded(Bound::from_option(max_weight));
        search.run(query, &mut ops);
        targets
            .iter()
            .map(|&target| {
                search
                    .get_weight(target)
                    .filter(|&weight| max_weight.map(|m| weight <= m).unwrap_or(true))
            })
            .collect()
    }

    /// Appends the expansion of the segment `from -> to`, without its final
    /// vertex.
    fn expand_segment(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        out: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        let arc = self.traversable_arc(from, to).with_context(|| {
            format!(
                "no traversable arc from vertex {} to vertex {}",
                from.index(),
                to.index()
            )
        })?;
        if let Some(via) = arc {
            self.expand_segment(from, via, out)?;
            self.expand_segment(via, to, out)?;
        } else {
            out.push(from);
        }
        Ok(())
    }

    /// The bypassed vertex of the lightest arc traversable from `from` to
    /// `to`, looked up in both storage directions. `Some(None)` for an
    /// original arc, `None` if no arc is traversable.
    fn traversable_arc(&self, from: NodeIndex, to: NodeIndex) -> Option<Option<NodeIndex>> {
        let outgoing = self
            .graph
            .out_arcs(from)
            .filter(|e| e.target() == to && e.weight().forward)
            .map(|e| *e.weight());
        let incoming = self
            .graph
            .out_arcs(to)
            .filter(|e| e.target() == from && e.weight().backward)
            .map(|e| *e.weight());
        outgoing
            .chain(incoming)
            .min_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|arc| arc.contracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RoadEdge, TagsId};
    use crate::search::query::VisitEntry;

    /// 0 ==1== 1 --1-> 2 ==1== 3 ==1== 4 ==2.5== 0
    ///
    /// `==` arcs are two-way, `-->` is one-way.
    fn network() -> (RoadGraph, Vec<NodeIndex>) {
        let mut graph = RoadGraph::new();
        let nodes: Vec<_> = (0..5).map(|i| graph.add_vertex(0.0, i as f64)).collect();
        graph.add_arc_pair(nodes[0], nodes[1], RoadEdge::new(true, true, 1.0, 0));
        graph.add_arc_pair(nodes[1], nodes[2], RoadEdge::new(true, false, 1.0, 0));
        graph.add_arc_pair(nodes[2], nodes[3], RoadEdge::new(true, true, 1.0, 0));
        graph.add_arc_pair(nodes[3], nodes[4], RoadEdge::new(true, true, 1.0, 0));
        graph.add_arc_pair(nodes[4], nodes[0], RoadEdge::new(true, true, 2.5, 0));
        (graph, nodes)
    }

    #[test]
    fn calculate_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let route = router.calculate(nodes[0], nodes[3], None).unwrap().unwrap();
        assert_eq!(route.weight, 3.0);
        assert_eq!(route.vertices, vec![nodes[0], nodes[1], nodes[2], nodes[3]]);
        // The way back cannot use the one-way arc 1 -> 2.
        let back = router.calculate(nodes[3], nodes[0], None).unwrap().unwrap();
        assert_eq!(back.weight, 3.5);
        assert_eq!(back.vertices, vec![nodes[3], nodes[4], nodes[0]]);
    }

    #[test]
    fn calculate_respects_max_weight_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        assert!(router.calculate(nodes[0], nodes[3], Some(2.5)).unwrap().is_none());
        assert_eq!(router.calculate_weight(nodes[0], nodes[3], Some(3.0)), Some(3.0));
    }

    #[test]
    fn unknown_vertex_is_an_error_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let missing = petgraph::graph::node_index(99);
        assert!(router.calculate(nodes[0], missing, None).is_err());
        assert!(router.calculate(missing, nodes[0], None).is_err());
        // The weight-only variant reports unknown vertices as unreachable.
        assert_eq!(router.calculate_weight(nodes[0], missing, None), None);
        assert_eq!(router.calculate_weight(missing, nodes[0], None), None);
    }

    #[test]
    fn one_to_many_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let weights =
            router.calculate_one_to_many(nodes[0], &[nodes[1], nodes[3], nodes[4]], None);
        assert_eq!(weights, vec![Some(1.0), Some(3.0), Some(2.5)]);
    }

    #[test]
    fn one_to_many_visits_folds_entry_weights_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let mut sources = VisitList::new();
        sources.push(VisitEntry::new(nodes[1], 0.5, vec![nodes[0], nodes[1]]));
        let weights =
            router.calculate_one_to_many_visits(&sources, &[nodes[3], nodes[4]], None);
        // Entry weight 0.5 plus travel from vertex 1.
        assert_eq!(weights, vec![Some(2.5), Some(3.5)]);
    }

    #[test]
    fn many_to_many_visits_matches_rows_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let lists = [
            VisitList::from_vertex(nodes[0]),
            VisitList::from_vertex(nodes[3]),
        ];
        let targets = [nodes[1], nodes[4]];
        let matrix = router.calculate_many_to_many_visits(&lists, &targets, None);
        for (row, list) in matrix.iter().zip(&lists) {
            assert_eq!(
                *row,
                router.calculate_one_to_many_visits(list, &targets, None)
            );
        }
    }

    #[test]
    fn many_to_many_matches_pairwise_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let sources = [nodes[0], nodes[3]];
        let targets = [nodes[1], nodes[4]];
        let matrix = router.calculate_many_to_many(&sources, &targets, None);
        for (i, &source) in sources.iter().enumerate() {
            for (j, &target) in targets.iter().enumerate() {
                assert_eq!(matrix[i][j], router.calculate_weight(source, target, None));
            }
        }
    }

    #[test]
    fn range_and_connectivity_test() {
        let (mut graph, nodes) = network();
        let router = Router::new(&graph);
        let mut range = router.calculate_range(nodes[0], 2.0);
        range.sort_by_key(|&(vertex, _)| vertex);
        assert_eq!(range, vec![(nodes[1], 1.0), (nodes[2], 2.0)]);
        assert!(router.check_connectivity(nodes[0], 1.0));
        drop(router);
        let isolated = graph.add_vertex(9.0, 9.0);
        let router = Router::new(&graph);
        assert!(!router.check_connectivity(isolated, 100.0));
    }

    #[test]
    fn to_closest_picks_global_minimum_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let sources = VisitList::from_vertex(nodes[0]);
        let mut targets = VisitList::new();
        targets.push(VisitEntry::new(nodes[3], 0.0, vec![nodes[3]]));
        targets.push(VisitEntry::new(nodes[4], 0.0, vec![nodes[4]]));
        let route = router
            .calculate_to_closest(&sources, &targets, None)
            .unwrap()
            .unwrap();
        // Vertex 4 is the cheaper target (2.5 against 3.0 for vertex 3).
        assert_eq!(route.weight, 2.5);
        assert_eq!(route.vertices, vec![nodes[0], nodes[4]]);
    }

    #[test]
    fn to_closest_folds_entry_weights_and_paths_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let mut sources = VisitList::new();
        sources.push(VisitEntry::new(nodes[1], 0.5, vec![nodes[0], nodes[1]]));
        let mut targets = VisitList::new();
        targets.push(VisitEntry::new(nodes[3], 0.25, vec![nodes[3], nodes[4]]));
        let route = router
            .calculate_to_closest(&sources, &targets, None)
            .unwrap()
            .unwrap();
        assert_eq!(route.weight, 0.5 + 2.0 + 0.25);
        assert_eq!(
            route.vertices,
            vec![nodes[0], nodes[1], nodes[2], nodes[3], nodes[4]]
        );
    }

    #[test]
    fn to_closest_uses_common_vertex_test() {
        let (graph, nodes) = network();
        let router = Router::new(&graph);
        let sources = VisitList::from_vertex(nodes[2]);
        let mut targets = VisitList::new();
        targets.push(VisitEntry::new(nodes[2], 0.1, vec![nodes[2]]));
        targets.push(VisitEntry::new(nodes[3], 5.0, vec![nodes[3]]));
        let route = router
            .calculate_to_closest(&sources, &targets, None)
            .unwrap()
            .unwrap();
        assert_eq!(route.weight, 0.1);
        assert_eq!(route.vertices, vec![nodes[2]]);
    }

    #[test]
    fn expand_route_unpacks_nested_shortcuts_test() {
        let mut graph = RoadGraph::new();
        let nodes: Vec<_> = (0..4).map(|i| graph.add_vertex(0.0, i as f64)).collect();
        for w in nodes.windows(2) {
            graph.add_arc_pair(w[0], w[1], RoadEdge::new(true, true, 1.0, 0));
        }
        graph.add_arc_pair(nodes[0], nodes[2], RoadEdge::shortcut(true, true, 2.0, nodes[1]));
        graph.add_arc_pair(nodes[0], nodes[3], RoadEdge::shortcut(true, true, 3.0, nodes[2]));
        let router = Router::new(&graph);
        let route = Route {
            vertices: vec![nodes[0], nodes[3]],
            weight: 3.0,
        };
        let expanded = router.expand_route(&route).unwrap();
        assert_eq!(expanded.vertices, nodes);
        assert_eq!(expanded.weight, 3.0);
    }

    struct ForbidTransition {
        from: TagsId,
        to: TagsId,
    }

    impl RouteConstraint for ForbidTransition {
        fn allows(&self, arrived_by: Option<TagsId>, next: TagsId) -> bool {
            arrived_by != Some(self.from) || next != self.to
        }
    }

    #[test]
    fn constrained_route_avoids_forbidden_transition_test() {
        let mut graph = RoadGraph::new();
        let nodes: Vec<_> = (0..3).map(|i| graph.add_vertex(0.0, i as f64)).collect();
        graph.add_arc_pair(nodes[0], nodes[1], RoadEdge::new(true, true, 1.0, 1));
        graph.add_arc_pair(nodes[1], nodes[2], RoadEdge::new(true, true, 1.0, 2));
        graph.add_arc_pair(nodes[1], nodes[2], RoadEdge::new(true, true, 5.0, 3));
        let router = Router::new(&graph);
        let unconstrained = router.calculate(nodes[0], nodes[2], None).unwrap().unwrap();
        assert_eq!(unconstrained.weight, 2.0);
        let route = router
            .calculate_constrained(nodes[0], nodes[2], ForbidTransition { from: 1, to: 2 }, None)
            .unwrap()
            .unwrap();
        // The tags-2 arc cannot follow the tags-1 arc, only the heavier
        // parallel arc can.
        assert_eq!(route.weight, 6.0);
    }
}
