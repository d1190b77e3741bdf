//! Great-circle geometry on WGS84 coordinates
//!
//! Distances are in statute miles. The spherical model is accurate to a few
//! tenths of a percent, which is well inside the range model's own error.

use crate::domain::types::Coordinate;

/// Mean Earth radius in statute miles
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance between two coordinates in miles
#[inline]
pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_MILES * c
}

/// Initial bearing from `a` towards `b`, degrees clockwise from north in [0, 360)
pub fn bearing_degrees(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Total length of a polyline through the given points
pub fn path_length_miles<I>(points: I) -> f64
where
    I: IntoIterator<Item = Coordinate>,
{
    let mut iter = points.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0.0;
    };
    let mut total = 0.0;
    for point in iter {
        total += distance_miles(prev, point);
        prev = point;
    }
    total
}
