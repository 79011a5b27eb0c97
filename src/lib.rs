//! Road-network routing based on Contraction Hierarchies.
//!
//! The crate is organized around three layers:
//!
//! - [`graph`]: a mutable directed multigraph of road vertices and arcs, where
//!   each arc carries traversal flags, a weight, an opaque tags handle and,
//!   for shortcut arcs, the vertex they bypass.
//! - [`contraction`]: the preprocessing engine that contracts vertices one by
//!   one in priority order, inserting witness-checked shortcut arcs, driven by
//!   the calculators in [`calculators`] and the bucket queue in
//!   [`vertex_queue`].
//! - [`search`] and [`router`]: a label-correcting shortest-path search with
//!   pluggable expansion behaviour, and the high-level routing operations
//!   built on top of it (point-to-point, one-to-many, range, closest-target).
//!
//! [`resolve`] maps geographic coordinates to positions on the network so that
//! routes can start and end in the middle of an arc.

pub mod calculators;
pub mod contraction;
pub mod graph;
pub mod resolve;
pub mod router;
pub mod search;
pub mod vertex_queue;

pub use calculators::{DijkstraWitness, EdgeDifference, VertexWeightCalculator, WitnessCalculator};
pub use contraction::{ContractionEngine, ContractionObserver, ContractionParameters};
pub use graph::{overlaps, ArcInsertion, RoadEdge, RoadGraph, RoadNode, TagsId};
pub use resolve::{search_closest, ResolvedPoint, TagMatcher};
pub use router::{Route, Router};
pub use search::ops::{
    AllowAll, Bound, ConstrainedDijkstra, EdgeFilter, HopLimitedDijkstra, RoadDijkstra,
    RouteConstraint, SearchOps,
};
pub use search::query::{SearchQuery, VisitEntry, VisitList};
pub use search::DijkstraSearch;
pub use vertex_queue::VertexQueue;
