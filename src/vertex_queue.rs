//! Bucket priority queue over contraction candidates.
//!
//! Vertices with equal priority share a bucket and are popped in insertion
//! order. Unlike the frontier queue of the search, this queue supports
//! arbitrary re-prioritization, which the contraction engine uses for its
//! lazy priority updates.

use hashbrown::HashMap;
use ordered_float::OrderedFloat;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Default)]
pub struct VertexQueue {
    buckets: BTreeMap<OrderedFloat<f64>, VecDeque<NodeIndex>>,
    priorities: HashMap<NodeIndex, OrderedFloat<f64>>,
}

impl VertexQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }

    pub fn contains(&self, vertex: NodeIndex) -> bool {
        self.priorities.contains_key(&vertex)
    }

    pub fn priority(&self, vertex: NodeIndex) -> Option<f64> {
        self.priorities.get(&vertex).map(|p| p.0)
    }

    /// Inserts a vertex with the given priority, or re-prioritizes it if
    /// already queued. The vertex goes to the back of its bucket.
    pub fn enqueue(&mut self, vertex: NodeIndex, priority: f64) {
        let priority = OrderedFloat(priority);
        if let Some(old) = self.priorities.insert(vertex, priority) {
            if old == priority {
                // Already queued at this priority, keep its bucket position.
                return;
            }
            self.remove_from_bucket(old, vertex);
        }
        self.buckets.entry(priority).or_default().push_back(vertex);
    }

    /// The vertex with the smallest priority, without removing it. Ties are
    /// broken by insertion order.
    pub fn peek_min(&self) -> Option<(NodeIndex, f64)> {
        self.buckets
            .first_key_value()
            .map(|(&priority, bucket)| (bucket[0], priority.0))
    }

    /// Removes and returns the vertex with the smallest priority.
    pub fn pop_min(&mut self) -> Option<(NodeIndex, f64)> {
        let mut entry = self.buckets.first_entry()?;
        let priority = *entry.key();
        let bucket = entry.get_mut();
        let vertex = bucket.pop_front().unwrap();
        if bucket.is_empty() {
            entry.remove();
        }
        self.priorities.remove(&vertex);
        Some((vertex, priority.0))
    }

    /// Removes a vertex from the queue. Returns `true` if it was queued.
    pub fn remove(&mut self, vertex: NodeIndex) -> bool {
        match self.priorities.remove(&vertex) {
            Some(priority) => {
                self.remove_from_bucket(priority, vertex);
                true
            }
            None => false,
        }
    }

    /// Iterator over the queued vertices, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.priorities.keys().copied()
    }

    /// Empties the queue and returns the vertices it held, in no particular
    /// order. Used when every priority is recomputed at once.
    pub fn drain(&mut self) -> Vec<NodeIndex> {
        self.buckets.clear();
        self.priorities.drain().map(|(vertex, _)| vertex).collect()
    }

    fn remove_from_bucket(&mut self, priority: OrderedFloat<f64>, vertex: NodeIndex) {
        let bucket = self
            .buckets
            .get_mut(&priority)
            .expect("bucket missing for a queued vertex");
        let pos = bucket
            .iter()
            .position(|&v| v == vertex)
            .expect("vertex missing from its bucket");
        bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(&priority);
        }
    }
}
