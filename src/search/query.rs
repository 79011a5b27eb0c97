//! Description of what a search starts from and where it stops.

use hashbrown::HashSet;
use petgraph::graph::NodeIndex;

/// Sources, targets and stopping behaviour of one search run.
#[derive(Clone, Debug)]
pub struct SearchQuery {
    sources: Vec<(NodeIndex, f64)>,
    targets: Option<HashSet<NodeIndex>>,
    stop_at_first: bool,
}

impl SearchQuery {
    /// A single source and a single target, stopping as soon as the target is
    /// settled.
    pub fn point_to_point(source: NodeIndex, target: NodeIndex) -> Self {
        SearchQuery {
            sources: vec![(source, 0.0)],
            targets: Some(std::iter::once(target).collect()),
            stop_at_first: true,
        }
    }

    /// A single source and several targets, running until every target is
    /// settled or the frontier is exhausted.
    pub fn one_to_many(source: NodeIndex, targets: &[NodeIndex]) -> Self {
        SearchQuery {
            sources: vec![(source, 0.0)],
            targets: Some(targets.iter().copied().collect()),
            stop_at_first: false,
        }
    }

    /// A single source and no target: the search settles everything it can
    /// reach (within the bound of the expansion, if any).
    pub fn range(source: NodeIndex) -> Self {
        SearchQuery {
            sources: vec![(source, 0.0)],
            targets: None,
            stop_at_first: false,
        }
    }

    /// Pre-weighted sources and a plain set of target vertices, running until
    /// every target is settled.
    pub fn visits_to_many(sources: &VisitList, targets: &[NodeIndex]) -> Self {
        SearchQuery {
            sources: sources
                .entries()
                .iter()
                .map(|e| (e.vertex, e.weight))
                .collect(),
            targets: Some(targets.iter().copied().collect()),
            stop_at_first: false,
        }
    }

    /// Pre-weighted sources and a set of target vertices.
    pub fn from_visit_lists(sources: &VisitList, targets: &VisitList, stop_at_first: bool) -> Self {
        SearchQuery {
            sources: sources
                .entries()
                .iter()
                .map(|e| (e.vertex, e.weight))
                .collect(),
            targets: Some(targets.entries().iter().map(|e| e.vertex).collect()),
            stop_at_first,
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
        self.sources.iter().copied()
    }

    pub fn is_target(&self, vertex: NodeIndex) -> bool {
        self.targets
            .as_ref()
            .map(|t| t.contains(&vertex))
            .unwrap_or(false)
    }

    pub fn target_count(&self) -> usize {
        self.targets.as_ref().map(|t| t.len()).unwrap_or(0)
    }

    pub fn stop_at_first(&self) -> bool {
        self.stop_at_first
    }
}

/// A possible start (or end) of a route: a vertex, the weight already paid to
/// reach it, and the vertices crossed while paying it.
///
/// For sources, `path` ends at `vertex`; for targets, it starts at `vertex`.
/// A visit list built from a resolved mid-arc point has one entry per
/// traversable arc endpoint.
#[derive(Clone, Debug)]
pub struct VisitEntry {
    pub vertex: NodeIndex,
    pub weight: f64,
    pub path: Vec<NodeIndex>,
}

impl VisitEntry {
    pub fn new(vertex: NodeIndex, weight: f64, path: Vec<NodeIndex>) -> Self {
        VisitEntry {
            vertex,
            weight,
            path,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VisitList {
    entries: Vec<VisitEntry>,
}

impl VisitList {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list with a single zero-weight entry at the given vertex.
    pub fn from_vertex(vertex: NodeIndex) -> Self {
        VisitList {
            entries: vec![VisitEntry::new(vertex, 0.0, vec![vertex])],
        }
    }

    pub fn push(&mut self, entry: VisitEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[VisitEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for(&self, vertex: NodeIndex) -> Option<&VisitEntry> {
        self.entries.iter().find(|e| e.vertex == vertex)
    }

    /// The cheapest pair of entries of this list and `other` sharing a
    /// vertex, with their combined weight, if the lists intersect.
    pub fn best_common_vertex<'a>(
        &'a self,
        other: &'a VisitList,
    ) -> Option<(f64, &'a VisitEntry, &'a VisitEntry)> {
        let mut best: Option<(f64, &VisitEntry, &VisitEntry)> = None;
        for source in &self.entries {
            for target in other.entries.iter().filter(|t| t.vertex == source.vertex) {
                let weight = source.weight + target.weight;
                if best.map(|(w, _, _)| weight < w).unwrap_or(true) {
                    best = Some((weight, source, target));
                }
            }
        }
        best
    }
}
