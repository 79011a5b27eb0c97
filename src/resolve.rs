//! Resolution of geographic coordinates onto the road network.
//!
//! A resolved point is the closest position on a traversable arc, possibly
//! in the middle of it. It converts to source and target visit lists so that
//! routes can start and end mid-arc, with the partial arc weight folded into
//! the entry weights.

use crate::graph::{RoadEdge, RoadGraph, TagsId};
use crate::search::ops::EdgeFilter;
use crate::search::query::{VisitEntry, VisitList};
use geo::{Closest, ClosestPoint, Distance, Haversine, Line, Point};
use petgraph::graph::NodeIndex;

/// Metres per degree of latitude, used for the bounding-box pre-filter.
const METRES_PER_DEGREE: f64 = 111_319.9;

/// Expresses a preference among arcs during resolution, e.g. for arcs whose
/// tags mark a road open to the requested vehicle profile.
pub trait TagMatcher {
    fn matches(&self, tags: TagsId) -> bool;
}

/// A position on an arc of the network.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedPoint {
    /// Storage endpoints of the arc the point lies on.
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub edge: RoadEdge,
    /// Position of the point, projected onto the arc.
    pub lat: f64,
    pub lon: f64,
    /// Fraction of the arc between `from` and the point, in `[0, 1]`.
    pub offset: f64,
    /// Distance from the query location to the projected point, in metres.
    pub distance: f64,
}

impl ResolvedPoint {
    /// Visit list for a route leaving this point.
    pub fn source_visits(&self) -> VisitList {
        let mut list = VisitList::new();
        if self.edge.forward {
            let weight = (1.0 - self.offset) * self.edge.weight;
            list.push(VisitEntry::new(self.to, weight, vec![self.to]));
        }
        if self.edge.backward {
            let weight = self.offset * self.edge.weight;
            list.push(VisitEntry::new(self.from, weight, vec![self.from]));
        }
        list
    }

    /// Visit list for a route arriving at this point.
    pub fn target_visits(&self) -> VisitList {
        let mut list = VisitList::new();
        if self.edge.forward {
            let weight = self.offset * self.edge.weight;
            list.push(VisitEntry::new(self.from, weight, vec![self.from]));
        }
        if self.edge.backward {
            let weight = (1.0 - self.offset) * self.edge.weight;
            list.push(VisitEntry::new(self.to, weight, vec![self.to]));
        }
        list
    }
}

/// Finds the closest traversable arc position within `radius` metres of
/// `(lat, lon)`.
///
/// Shortcut arcs and arcs rejected by the filter are never resolved to. When
/// a matcher is given and at least one arc within the radius satisfies it,
/// the closest matching arc wins; otherwise the closest arc overall is
/// returned.
pub fn search_closest<F: EdgeFilter>(
    graph: &RoadGraph,
    filter: &F,
    lat: f64,
    lon: f64,
    radius: f64,
    matcher: Option<&dyn TagMatcher>,
) -> Option<ResolvedPoint> {
    let query = Point::new(lon, lat);
    let delta_lat = radius / METRES_PER_DEGREE;
    let delta_lon = radius / (METRES_PER_DEGREE * lat.to_radians().cos().max(0.01));
    let mut best: Option<ResolvedPoint> = None;
    let mut best_matching: Option<ResolvedPoint> = None;
    for (from, to, edge) in graph.arcs() {
        if edge.is_shortcut() || !(edge.forward || edge.backward) {
            continue;
        }
        if !filter.can_traverse(edge.tags) {
            continue;
        }
        let (Some(a), Some(b)) = (graph.get_vertex(from), graph.get_vertex(to)) else {
            continue;
        };
        // Cheap reject before any trigonometry.
        if lat < a.lat.min(b.lat) - delta_lat
            || lat > a.lat.max(b.lat) + delta_lat
            || lon < a.lon.min(b.lon) - delta_lon
            || lon > a.lon.max(b.lon) + delta_lon
        {
            continue;
        }
        let start = Point::new(a.lon, a.lat);
        let end = Point::new(b.lon, b.lat);
        let line = Line::new(start, end);
        let projected = match line.closest_point(&query) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p,
            Closest::Indeterminate => start,
        };
        let distance = Haversine.distance(query, projected);
        if distance > radius {
            continue;
        }
        let length = Haversine.distance(start, end);
        let offset = if length > 0.0 {
            (Haversine.distance(start, projected) / length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let resolved = ResolvedPoint {
            from,
            to,
            edge,
            lat: projected.y(),
            lon: projected.x(),
            offset,
            distance,
        };
        if best.as_ref().map(|b| distance < b.distance).unwrap_or(true) {
            best = Some(resolved);
        }
        if matcher.map(|m| m.matches(edge.tags)).unwrap_or(false)
            && best_matching
                .as_ref()
                .map(|b| distance < b.distance)
                .unwrap_or(true)
        {
            best_matching = Some(resolved);
        }
    }
    best_matching.or(best)
}
