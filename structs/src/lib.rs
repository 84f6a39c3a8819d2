use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fleet;
pub mod loader;
pub mod network;
pub mod problem;
pub mod solution;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Inconsistent network, fleet or cost data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("network has no depot")]
    NoDepot,
    #[error("network has {0} depots, exactly one is required")]
    MultipleDepots(usize),
    #[error("duplicate node id {0}")]
    DuplicateNode(String),
    #[error("duplicate vehicle id {0}")]
    DuplicateVehicle(String),
    #[error("distance matrix is {rows}x{cols}, expected {n}x{n}")]
    DistanceShape { rows: usize, cols: usize, n: usize },
    #[error("invalid distance {value} on arc {from} -> {to}")]
    InvalidDistance { from: String, to: String, value: f64 },
    #[error("node index {0} is out of range")]
    NodeOutOfRange(usize),
    #[error("vehicle index {0} is out of range")]
    VehicleOutOfRange(usize),
    #[error("self-loop on node {0} cannot carry tolls or restrictions")]
    SelfLoop(String),
    #[error("{what} of {id} must be {expected}, got {value}")]
    InvalidValue {
        id: String,
        what: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("fleet has no vehicles")]
    EmptyFleet,
}

pub(crate) fn check_value(
    id: &str,
    what: &'static str,
    value: f64,
    positive: bool,
) -> Result<(), ModelError> {
    let ok = value.is_finite() && if positive { value > 0.0 } else { value >= 0.0 };
    if ok {
        Ok(())
    } else {
        Err(ModelError::InvalidValue {
            id: id.to_string(),
            what,
            expected: if positive { "positive" } else { "non-negative" },
            value,
        })
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Haversine distance in kilometres.
    pub fn great_circle_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }

    pub fn eq_latlon(&self, other: &GeoPoint) -> bool {
        self.great_circle_km(other) < 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::GeoPoint;

    #[test]
    fn one_degree_of_longitude_on_equator() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let d = a.great_circle_km(&b);
        assert!((d - 111.19).abs() < 0.01, "got {}", d);
        assert!((b.great_circle_km(&a) - d).abs() < 1e-12);
    }

    #[test]
    fn same_point_is_zero() {
        let p = GeoPoint::new(4.65, -74.1);
        assert_eq!(p.great_circle_km(&p), 0.0);
        assert!(p.eq_latlon(&GeoPoint::new(4.65, -74.1)));
    }
}
