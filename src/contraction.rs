//! Vertex contraction engine.
//!
//! Vertices are contracted one by one in priority order. Contracting a
//! vertex removes every arc pointing at it and inserts witness-checked
//! shortcut arcs between its neighbours, so that shortest-path weights
//! between the remaining vertices are preserved. Priorities are kept lazily:
//! the cached priority of the queue head is re-evaluated on selection, and a
//! long streak of stale heads triggers a parallel rebuild of the whole
//! queue.

use crate::calculators::{shortcut_between, VertexWeightCalculator, WitnessCalculator};
use crate::calculators::{DijkstraWitness, EdgeDifference};
use crate::graph::{overlaps, ArcInsertion, RoadEdge, RoadGraph};
use crate::vertex_queue::VertexQueue;
use fixedbitset::FixedBitSet;
use indicatif::ProgressBar;
use log::{debug, log_enabled, Level};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tuning knobs of the contraction engine.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractionParameters {
    /// Maximum number of hops a witness search may explore.
    pub witness_hop_limit: u8,
    /// Length of the window of recent priority re-evaluations; a window full
    /// of stale evaluations triggers a queue rebuild.
    pub miss_window: usize,
}

impl Default for ContractionParameters {
    fn default() -> Self {
        ContractionParameters {
            witness_hop_limit: 20,
            miss_window: 40,
        }
    }
}

/// Hooks into the contraction process, e.g. to build an index of shortcut
/// arcs or record contraction order.
pub trait ContractionObserver {
    /// Called before the arcs of `vertex` are touched, with a snapshot of
    /// its outgoing arcs.
    fn before_contraction(&mut self, _vertex: NodeIndex, _arcs: &[(NodeIndex, RoadEdge)]) {}

    /// Called once `vertex` is fully contracted.
    fn after_contraction(&mut self, _vertex: NodeIndex) {}

    fn arc_added(&mut self, _from: NodeIndex, _to: NodeIndex, _edge: &RoadEdge) {}

    fn arc_removed(&mut self, _from: NodeIndex, _to: NodeIndex) {}
}

pub struct ContractionEngine<W, C> {
    graph: RoadGraph,
    weight_calculator: W,
    witness_calculator: C,
    parameters: ContractionParameters,
    queue: VertexQueue,
    contracted: FixedBitSet,
    /// Window of recent head re-evaluations, `true` for a stale one.
    window: VecDeque<bool>,
    stale_count: usize,
    observer: Option<Box<dyn ContractionObserver>>,
}

impl ContractionEngine<EdgeDifference, DijkstraWitness> {
    /// An engine with the edge-difference priority and the Dijkstra witness
    /// calculator.
    pub fn with_default_calculators(graph: RoadGraph, parameters: ContractionParameters) -> Self {
        Self::new(
            graph,
            EdgeDifference::new(parameters.witness_hop_limit),
            DijkstraWitness::new(),
            parameters,
        )
    }
}

impl<W, C> ContractionEngine<W, C>
where
    W: VertexWeightCalculator + Sync,
    C: WitnessCalculator,
{
    pub fn new(
        graph: RoadGraph,
        weight_calculator: W,
        witness_calculator: C,
        parameters: ContractionParameters,
    ) -> Self {
        let vertex_count = graph.vertex_count();
        ContractionEngine {
            graph,
            weight_calculator,
            witness_calculator,
            parameters,
            queue: VertexQueue::new(),
            contracted: FixedBitSet::with_capacity(vertex_count),
            window: VecDeque::new(),
            stale_count: 0,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn ContractionObserver>) {
        self.observer = Some(observer);
    }

    /// Contracts every selectable vertex and returns the graph with its
    /// shortcut arcs.
    pub fn run(mut self) -> RoadGraph {
        self.initialize_queue();
        debug!(
            "contracting {} of {} vertices",
            self.queue.len(),
            self.graph.vertex_count()
        );
        let bar = if log_enabled!(Level::Debug) {
            ProgressBar::new(self.queue.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        while let Some(vertex) = self.select_next() {
            self.contract(vertex);
            bar.inc(1);
        }
        bar.finish_and_clear();
        debug!(
            "contraction done, {} arcs in the hierarchy",
            self.graph.arc_count()
        );
        self.graph
    }

    /// Computes every initial priority in parallel. Vertices with an
    /// infinite priority are left out of the queue.
    fn initialize_queue(&mut self) {
        let graph = &self.graph;
        let calculator = &self.weight_calculator;
        let vertices: Vec<NodeIndex> = graph.vertices().collect();
        let priorities: Vec<(NodeIndex, f64)> = vertices
            .par_iter()
            .map(|&vertex| (vertex, calculator.calculate(graph, vertex)))
            .collect();
        for (vertex, priority) in priorities {
            if priority.is_finite() {
                self.queue.enqueue(vertex, priority);
            }
        }
    }

    /// The next vertex to contract, under the lazy update rule: the head of
    /// the queue is selected only if its cached priority is still current,
    /// otherwise it is re-queued (or dropped, if it became infinite) and the
    /// new head is inspected.
    fn select_next(&mut self) -> Option<NodeIndex> {
        loop {
            let (vertex, cached) = self.queue.peek_min()?;
            let fresh = self.weight_calculator.calculate(&self.graph, vertex);
            if fresh == cached {
                self.record_evaluation(false);
                self.queue.pop_min();
                return Some(vertex);
            }
            self.record_evaluation(true);
            if fresh.is_finite() {
                self.queue.enqueue(vertex, fresh);
            } else {
                self.queue.remove(vertex);
            }
            if self.stale_count >= self.parameters.miss_window {
                self.rebuild_queue();
                let (vertex, cached) = self.queue.peek_min()?;
                let fresh = self.weight_calculator.calculate(&self.graph, vertex);
                if fresh != cached {
                    // Priorities were just recomputed; a stale head here
                    // means the calculator is not deterministic.
                    panic!(
                        "no selectable vertex in a non-empty queue of {} vertices",
                        self.queue.len()
                    );
                }
                self.record_evaluation(false);
                self.queue.pop_min();
                return Some(vertex);
            }
        }
    }

    fn record_evaluation(&mut self, stale: bool) {
        self.window.push_back(stale);
        self.stale_count += stale as usize;
        if self.window.len() > self.parameters.miss_window {
            if self.window.pop_front() == Some(true) {
                self.stale_count -= 1;
            }
        }
    }

    fn rebuild_queue(&mut self) {
        debug!("rebuilding contraction queue, {} vertices", self.queue.len());
        let vertices = self.queue.drain();
        let graph = &self.graph;
        let calculator = &self.weight_calculator;
        let priorities: Vec<(NodeIndex, f64)> = vertices
            .par_iter()
            .map(|&vertex| (vertex, calculator.calculate(graph, vertex)))
            .collect();
        for (vertex, priority) in priorities {
            if priority.is_finite() {
                self.queue.enqueue(vertex, priority);
            }
        }
        self.window.clear();
        self.stale_count = 0;
    }

    /// Contracts one vertex: removes every arc pointing at it, then inserts
    /// a shortcut between each pair of neighbours whose through path has no
    /// witness.
    fn contract(&mut self, vertex: NodeIndex) {
        let arcs = self.graph.get_arcs(vertex);
        if let Some(observer) = self.observer.as_mut() {
            observer.before_contraction(vertex, &arcs);
        }
        // The vertex keeps its outgoing arcs but no arc reaches it anymore,
        // so later searches and contractions pass it by.
        for &(neighbour, _) in &arcs {
            if self.graph.delete_arc(neighbour, vertex) {
                if let Some(observer) = self.observer.as_mut() {
                    observer.arc_removed(neighbour, vertex);
                }
            }
        }
        for (i, &(x, ref xe)) in arcs.iter().enumerate() {
            for &(y, ref ye) in &arcs[..i] {
                if x == y {
                    continue;
                }
                let shortcut = shortcut_between(
                    &self.graph,
                    &self.witness_calculator,
                    vertex,
                    x,
                    xe,
                    y,
                    ye,
                    self.parameters.witness_hop_limit,
                );
                if let Some(shortcut) = shortcut {
                    let outcome = self.graph.add_arc_with(x, y, shortcut, overlaps);
                    self.notify_insertion(x, y, &shortcut, outcome);
                    let mirrored = shortcut.reversed();
                    let outcome = self.graph.add_arc_with(y, x, mirrored, overlaps);
                    self.notify_insertion(y, x, &mirrored, outcome);
                }
            }
        }
        self.mark_contracted(vertex);
        self.weight_calculator.notify_contracted(&self.graph, vertex);
        if let Some(observer) = self.observer.as_mut() {
            observer.after_contraction(vertex);
        }
    }

    /// Reports an insertion outcome to the observer: one removal per evicted
    /// arc, then the insertion itself.
    fn notify_insertion(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: &RoadEdge,
        outcome: ArcInsertion,
    ) {
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        for _ in 0..outcome.evicted {
            observer.arc_removed(from, to);
        }
        if outcome.inserted {
            observer.arc_added(from, to, edge);
        }
    }

    fn mark_contracted(&mut self, vertex: NodeIndex) {
        if self.contracted.len() <= vertex.index() {
            self.contracted.grow(vertex.index() + 1);
        }
        assert!(
            !self.contracted.put(vertex.index()),
            "vertex {} was contracted twice",
            vertex.index()
        );
    }
}
