//! POI visiting order via greedy nearest-neighbour
//!
//! Greedy and O(n²). The order must stay deterministic: tours and narrations
//! are keyed off it.

use crate::domain::geo;
use crate::domain::types::{Coordinate, Poi};
use std::cmp::Ordering;

/// Order `pois` by repeatedly visiting the closest unvisited one.
///
/// Ties on distance are broken by POI id so identical input always yields
/// identical output. The result is a permutation of the input.
pub fn optimize_route(start: Coordinate, pois: &[Poi]) -> Vec<Poi> {
    let mut remaining: Vec<&Poi> = pois.iter().collect();
    let mut ordered = Vec::with_capacity(pois.len());
    let mut position = start;

    while !remaining.is_empty() {
        let (idx, _) = remaining
            .iter()
            .enumerate()
            .map(|(i, poi)| (i, geo::distance_miles(position, poi.location)))
            .min_by(|(ia, da), (ib, db)| {
                da.total_cmp(db).then_with(|| remaining[*ia].id.cmp(&remaining[*ib].id))
            })
            .unwrap_or((0, 0.0));

        let next = remaining.swap_remove(idx);
        position = next.location;
        ordered.push(next.clone());
    }

    ordered
}

/// Length of the path `start → ordered[0] → … → ordered[n-1]`
pub fn route_length_miles(start: Coordinate, ordered: &[Poi]) -> f64 {
    geo::path_length_miles(std::iter::once(start).chain(ordered.iter().map(|p| p.location)))
}

/// Compare two candidates by distance then id; shared with the charger search
pub(crate) fn closest_first(a: (f64, &Poi), b: (f64, &Poi)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id))
}
