//! Small hand-made instances shared by the unit and scenario tests.

use fleetmip_structs::{
    fleet::{Fleet, Vehicle},
    network::{Network, Node, Toll},
    problem::{CostParams, Problem},
    GeoPoint,
};

pub fn costs() -> CostParams {
    CostParams { fixed_cost_per_vehicle: 1000.0, cost_per_km: 10.0, average_speed_kmh: 50.0 }
}

fn uniform(nodes: Vec<Node>, d: f64) -> Network {
    let n = nodes.len();
    let dist = (0..n).map(|i| (0..n).map(|j| if i == j { 0.0 } else { d }).collect()).collect();
    Network::with_distances(nodes, dist).unwrap()
}

fn origin() -> GeoPoint {
    GeoPoint::new(0.0, 0.0)
}

/// Depot and clients A (10) and B (15), all 5 km apart, one vehicle with
/// capacity 30 and ample fuel.
pub fn two_clients() -> Problem {
    let p = origin();
    let network =
        uniform(vec![Node::depot("D", p), Node::client("A", 10.0, p), Node::client("B", 15.0, p)], 5.0);
    let fleet = Fleet::new(vec![Vehicle::new("T1", 30.0, 100.0, 10.0)]).unwrap();
    Problem::new(network, fleet, costs()).unwrap()
}

/// Like `two_clients`, plus a station S at 5 km from everything.
pub fn clients_and_station() -> Problem {
    let p = origin();
    let network = uniform(
        vec![
            Node::depot("D", p),
            Node::client("A", 10.0, p),
            Node::client("B", 15.0, p),
            Node::station("S", 3.0, p),
        ],
        5.0,
    );
    let fleet = Fleet::new(vec![Vehicle::new("T1", 30.0, 100.0, 10.0)]).unwrap();
    Problem::new(network, fleet, costs()).unwrap()
}

/// Clients A and B with 20 kg each against vehicles of 30 kg.
pub fn capacity_split(vehicles: usize) -> Problem {
    let p = origin();
    let network =
        uniform(vec![Node::depot("D", p), Node::client("A", 20.0, p), Node::client("B", 20.0, p)], 5.0);
    let fleet = Fleet::new(
        (1..=vehicles).map(|i| Vehicle::new(format!("T{}", i), 30.0, 100.0, 10.0)).collect(),
    )
    .unwrap();
    Problem::new(network, fleet, costs()).unwrap()
}

/// Client C 100 km from the depot, station S halfway. The vehicle covers
/// 160 km on a full tank, so the 200 km round trip needs a refuel at S.
pub fn station_detour() -> Problem {
    let p = origin();
    let nodes = vec![Node::depot("D", p), Node::station("S", 2.0, p), Node::client("C", 5.0, p)];
    let dist = vec![
        vec![0.0, 50.0, 100.0],
        vec![50.0, 0.0, 50.0],
        vec![100.0, 50.0, 0.0],
    ];
    let network = Network::with_distances(nodes, dist).unwrap();
    let fleet = Fleet::new(vec![Vehicle::new("T1", 30.0, 160.0, 1.0)]).unwrap();
    Problem::new(network, fleet, costs()).unwrap()
}

/// `station_detour` distances with the station removed.
pub fn out_of_range() -> Problem {
    let p = origin();
    let nodes = vec![Node::depot("D", p), Node::client("C", 5.0, p)];
    let network = Network::with_distances(nodes, vec![vec![0.0, 100.0], vec![100.0, 0.0]]).unwrap();
    let fleet = Fleet::new(vec![Vehicle::new("T1", 30.0, 160.0, 1.0)]).unwrap();
    Problem::new(network, fleet, costs()).unwrap()
}

/// Direct arc D->C is forbidden; C is reachable through client B.
pub fn forbidden_direct() -> Problem {
    let p = origin();
    let nodes = vec![Node::depot("D", p), Node::client("B", 1.0, p), Node::client("C", 5.0, p)];
    let dist = vec![
        vec![0.0, 6.0, 10.0],
        vec![6.0, 0.0, 6.0],
        vec![10.0, 6.0, 0.0],
    ];
    let network = Network::with_distances(nodes, dist).unwrap().forbid(0, 2).unwrap();
    let fleet = Fleet::new(vec![Vehicle::new("T1", 30.0, 100.0, 10.0)]).unwrap();
    Problem::new(network, fleet, costs()).unwrap()
}

/// `two_clients` with a second vehicle. T1 may not touch B; entering A from
/// the depot costs a 500 toll, leaving A for the depot 100 + 2 per rated kg.
pub fn restricted_and_tolled() -> Problem {
    let p = origin();
    let network =
        uniform(vec![Node::depot("D", p), Node::client("A", 10.0, p), Node::client("B", 15.0, p)], 5.0)
            .with_toll(0, 1, Toll::flat(500.0))
            .unwrap()
            .with_toll(1, 0, Toll { base_rate: 100.0, rate_per_kg: 2.0 })
            .unwrap();
    let mut fleet = Fleet::new(vec![
        Vehicle::new("T1", 30.0, 100.0, 10.0),
        Vehicle::new("T2", 30.0, 100.0, 10.0),
    ])
    .unwrap();
    for (i, j) in [(0, 2), (2, 0), (1, 2), (2, 1)] {
        fleet = fleet.restrict(0, i, j).unwrap();
    }
    Problem::new(network, fleet, costs()).unwrap()
}
