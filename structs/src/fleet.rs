use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    check_value,
    network::{Network, NodeIdx},
    ModelError,
};

pub type VehicleIdx = usize;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    /// kg
    pub load_capacity: f64,
    /// gallons
    pub tank_capacity: f64,
    pub km_per_gallon: f64,
}

impl Vehicle {
    pub fn new(
        id: impl Into<String>,
        load_capacity: f64,
        tank_capacity: f64,
        km_per_gallon: f64,
    ) -> Self {
        Vehicle { id: id.into(), load_capacity, tank_capacity, km_per_gallon }
    }

    /// Vehicle described by its autonomy instead of its tank size.
    pub fn from_range(
        id: impl Into<String>,
        load_capacity: f64,
        range_km: f64,
        km_per_gallon: f64,
    ) -> Self {
        Self::new(id, load_capacity, range_km / km_per_gallon, km_per_gallon)
    }

    pub fn max_range_km(&self) -> f64 {
        self.tank_capacity * self.km_per_gallon
    }

    /// Gallons burnt driving `dist_km`.
    pub fn consumption(&self, dist_km: f64) -> f64 {
        dist_km / self.km_per_gallon
    }

    fn check(&self) -> Result<(), ModelError> {
        check_value(&self.id, "load capacity", self.load_capacity, true)?;
        check_value(&self.id, "tank capacity", self.tank_capacity, true)?;
        check_value(&self.id, "fuel efficiency", self.km_per_gallon, true)
    }
}

#[derive(Clone, Debug)]
pub struct Fleet {
    vehicles: Vec<Vehicle>,
    restricted: Vec<BTreeSet<(NodeIdx, NodeIdx)>>,
}

impl Fleet {
    pub fn new(vehicles: Vec<Vehicle>) -> Result<Self, ModelError> {
        let mut seen = HashSet::new();
        for v in vehicles.iter() {
            v.check()?;
            if !seen.insert(v.id.as_str()) {
                return Err(ModelError::DuplicateVehicle(v.id.clone()));
            }
        }
        let restricted = vec![BTreeSet::new(); vehicles.len()];
        Ok(Fleet { vehicles, restricted })
    }

    /// Forbids arc `from -> to` for vehicle `v` only.
    pub fn restrict(mut self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> Result<Self, ModelError> {
        if v >= self.vehicles.len() {
            return Err(ModelError::VehicleOutOfRange(v));
        }
        self.restricted[v].insert((from, to));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, v: VehicleIdx) -> &Vehicle {
        &self.vehicles[v]
    }

    pub fn index_of(&self, id: &str) -> Option<VehicleIdx> {
        self.vehicles.iter().position(|v| v.id == id)
    }

    pub fn total_capacity(&self) -> f64 {
        self.vehicles.iter().map(|v| v.load_capacity).sum()
    }

    pub fn is_restricted(&self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> bool {
        self.restricted[v].contains(&(from, to))
    }

    pub fn restricted_arcs(&self, v: VehicleIdx) -> impl Iterator<Item = (NodeIdx, NodeIdx)> + '_ {
        self.restricted[v].iter().copied()
    }

    pub fn eligible_arcs(&self, network: &Network) -> EligibleArcs {
        let n = network.len();
        let arcs = (0..self.vehicles.len())
            .map(|v| {
                network
                    .arcs()
                    .filter(|&(i, j)| !self.is_restricted(v, i, j))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let mask = arcs
            .iter()
            .map(|list| {
                let mut m = vec![false; n * n];
                for (i, j) in list.iter() {
                    m[i * n + j] = true;
                }
                m
            })
            .collect();
        EligibleArcs { n, arcs, mask }
    }
}

/// Per-vehicle arc sets, computed once. An arc is eligible for a vehicle when
/// it is not a self-loop, not globally forbidden and not restricted for it.
#[derive(Clone, Debug)]
pub struct EligibleArcs {
    n: usize,
    arcs: Vec<Vec<(NodeIdx, NodeIdx)>>,
    mask: Vec<Vec<bool>>,
}

impl EligibleArcs {
    /// Eligible arcs of vehicle `v` ordered by (from, to).
    pub fn for_vehicle(&self, v: VehicleIdx) -> &[(NodeIdx, NodeIdx)] {
        &self.arcs[v]
    }

    pub fn contains(&self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> bool {
        from < self.n && to < self.n && self.mask[v][from * self.n + to]
    }

    pub fn total(&self) -> usize {
        self.arcs.iter().map(|a| a.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::uniform_network;

    #[test]
    fn range_and_consumption() {
        let v = Vehicle::from_range("T1", 1000.0, 400.0, 8.0);
        assert_eq!(v.tank_capacity, 50.0);
        assert_eq!(v.max_range_km(), 400.0);
        assert_eq!(v.consumption(16.0), 2.0);
    }

    #[test]
    fn rejects_invalid_vehicles() {
        assert!(matches!(
            Fleet::new(vec![Vehicle::new("T1", 0.0, 10.0, 5.0)]),
            Err(ModelError::InvalidValue { what: "load capacity", .. })
        ));
        assert!(matches!(
            Fleet::new(vec![Vehicle::new("T1", 1.0, 10.0, 5.0), Vehicle::new("T1", 1.0, 10.0, 5.0)]),
            Err(ModelError::DuplicateVehicle(_))
        ));
        let fleet = Fleet::new(vec![Vehicle::new("T1", 1.0, 10.0, 5.0)]).unwrap();
        assert!(matches!(fleet.restrict(3, 0, 1), Err(ModelError::VehicleOutOfRange(3))));
    }

    #[test]
    fn eligible_arcs_omit_forbidden_and_restricted() {
        let network = uniform_network(5.0).forbid(0, 1).unwrap();
        let fleet = Fleet::new(vec![
            Vehicle::new("T1", 30.0, 100.0, 5.0),
            Vehicle::new("T2", 30.0, 100.0, 5.0),
        ])
        .unwrap()
        .restrict(1, 1, 2)
        .unwrap();

        let eligible = fleet.eligible_arcs(&network);
        assert_eq!(eligible.for_vehicle(0).len(), 11);
        assert_eq!(eligible.for_vehicle(1).len(), 10);
        assert_eq!(eligible.total(), 21);

        assert!(!eligible.contains(0, 0, 1));
        assert!(!eligible.contains(1, 0, 1));
        assert!(eligible.contains(0, 1, 2));
        assert!(!eligible.contains(1, 1, 2));
        assert!(eligible.contains(1, 2, 1));
        assert!(!eligible.contains(0, 2, 2));

        let list = eligible.for_vehicle(0);
        assert!(list.windows(2).all(|w| w[0] < w[1]));
    }
}
