use fleetmip_structs::{
    fleet::VehicleIdx,
    network::NodeIdx,
    problem::Problem,
    solution::DecodeAnomaly,
};
use log::{debug, warn};
use tinyvec::TinyVec;

use crate::milp::{Formulation, VehicleVars};

/// Arc and use columns above this value count as selected.
pub const SELECTED: f64 = 0.5;
pub const DEFAULT_REFUEL_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRoute {
    pub vehicle: VehicleIdx,
    /// Starts and ends at the depot.
    pub nodes: Vec<NodeIdx>,
    /// Gallons bought at each station on the route, in route order.
    pub refuels: Vec<(NodeIdx, f64)>,
}

impl DecodedRoute {
    pub fn arcs(&self) -> impl Iterator<Item = (NodeIdx, NodeIdx)> + '_ {
        self.nodes.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn refuel_at(&self, node: NodeIdx) -> f64 {
        self.refuels.iter().filter(|(n, _)| *n == node).map(|(_, r)| *r).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteFailure {
    pub vehicle: VehicleIdx,
    pub anomaly: DecodeAnomaly,
    /// Nodes walked before the anomaly, starting at the depot.
    pub partial: Vec<NodeIdx>,
}

#[derive(Debug, Clone, Default)]
pub struct Decoding {
    /// One entry per vehicle that is used or has selected arcs.
    pub vehicles: Vec<Result<DecodedRoute, RouteFailure>>,
    pub warnings: Vec<String>,
}

impl Decoding {
    pub fn routes(&self) -> impl Iterator<Item = &DecodedRoute> + '_ {
        self.vehicles.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RouteFailure> + '_ {
        self.vehicles.iter().filter_map(|r| r.as_ref().err())
    }
}

pub fn decode(
    problem: &Problem,
    formulation: &Formulation,
    values: &[f64],
    refuel_threshold: f64,
) -> Decoding {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("decode");

    let mut decoding = Decoding::default();
    for (v_idx, vars) in formulation.vehicles.iter().enumerate() {
        if let Some(result) =
            decode_vehicle(problem, v_idx, vars, values, refuel_threshold, &mut decoding.warnings)
        {
            decoding.vehicles.push(result);
        }
    }
    decoding
}

/// Walks the selected arcs of one vehicle from the depot. Returns `None` for
/// an idle vehicle.
pub fn decode_vehicle(
    problem: &Problem,
    v_idx: VehicleIdx,
    vars: &VehicleVars,
    values: &[f64],
    refuel_threshold: f64,
    warnings: &mut Vec<String>,
) -> Option<Result<DecodedRoute, RouteFailure>> {
    let network = &problem.network;
    let vehicle_id = &problem.fleet.vehicle(v_idx).id;
    let n = network.len();
    let depot = network.depot();
    let id = |node: NodeIdx| network.node(node).id.clone();

    // Arcs are stored in (from, to) order, so successor lists are too.
    let mut succ: Vec<TinyVec<[NodeIdx; 2]>> = vec![TinyVec::new(); n];
    let mut selected = Vec::new();
    for &(i, j, col) in vars.arcs.iter() {
        if values[col] > SELECTED {
            succ[i].push(j);
            selected.push((i, j));
        }
    }

    let used = values[vars.used] > SELECTED;
    if !used {
        if selected.is_empty() {
            return None;
        }
        let msg = format!(
            "vehicle {} is not marked used but has {} selected arcs, decoding anyway",
            vehicle_id,
            selected.len()
        );
        warn!("{}", msg);
        warnings.push(msg);
    }

    let fail = |anomaly: DecodeAnomaly, partial: Vec<NodeIdx>| {
        debug!("vehicle {}: {}", vehicle_id, anomaly);
        Some(Err(RouteFailure { vehicle: v_idx, anomaly, partial }))
    };

    let limit = n + 1;
    let mut route = vec![depot];
    let mut visited = vec![false; n];
    let mut current = depot;
    let mut closed = false;
    for _ in 0..limit {
        let next = match succ[current].as_slice() {
            [] => return fail(DecodeAnomaly::Dangling { at: id(current) }, route),
            [next] => *next,
            [next, ..] => {
                let msg = format!(
                    "vehicle {} leaves {} on {} arcs, following {}",
                    vehicle_id,
                    id(current),
                    succ[current].len(),
                    id(*next)
                );
                warn!("{}", msg);
                warnings.push(msg);
                *next
            }
        };
        if next == depot {
            route.push(depot);
            closed = true;
            break;
        }
        if visited[next] {
            return fail(DecodeAnomaly::Cycle { repeated: id(next) }, route);
        }
        visited[next] = true;
        route.push(next);
        current = next;
    }
    if !closed {
        return fail(DecodeAnomaly::IterationLimit { limit }, route);
    }

    let on_route = route.windows(2).map(|w| (w[0], w[1])).collect::<Vec<_>>();
    let stray = selected
        .iter()
        .filter(|arc| !on_route.contains(arc))
        .map(|(i, j)| (id(*i), id(*j)))
        .collect::<Vec<_>>();
    if !stray.is_empty() {
        return fail(DecodeAnomaly::StrayArcs { arcs: stray }, route);
    }

    let refuels = route[1..route.len() - 1]
        .iter()
        .filter(|node| network.node(**node).role.is_station())
        .map(|node| (*node, values[vars.refuel[*node]]))
        .filter(|(_, gallons)| *gallons > refuel_threshold)
        .collect();

    Some(Ok(DecodedRoute { vehicle: v_idx, nodes: route, refuels }))
}

#[cfg(test)]
mod tests {
    use fleetmip_structs::solution::CostScaling;

    use super::*;
    use crate::{
        extsolvers::lpmodel::LpModel,
        milp::build,
        test_instances::{capacity_split, station_detour, two_clients},
    };

    fn setup(problem: &Problem) -> (Formulation, Vec<f64>) {
        let mut lp = LpModel::default();
        let f = build(&mut lp, problem, &CostScaling::identity()).unwrap();
        let values = vec![0.0; f.num_cols()];
        (f, values)
    }

    fn select(f: &Formulation, values: &mut [f64], v: VehicleIdx, arcs: &[(NodeIdx, NodeIdx)]) {
        values[f.vehicles[v].used] = 1.0;
        for (i, j) in arcs {
            values[f.vehicles[v].arc(*i, *j).unwrap()] = 1.0;
        }
    }

    #[test]
    fn clean_route() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[(0, 2), (2, 1), (1, 0)]);
        // Near-integral values still count.
        x[f.vehicles[0].arc(2, 1).unwrap()] = 0.9999;
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        assert!(d.warnings.is_empty());
        assert_eq!(d.vehicles, vec![Ok(DecodedRoute { vehicle: 0, nodes: vec![0, 2, 1, 0], refuels: vec![] })]);
    }

    #[test]
    fn idle_vehicles_are_skipped() {
        let p = capacity_split(3);
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 1, &[(0, 1), (1, 2), (2, 0)]);
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        assert_eq!(d.vehicles.len(), 1);
        assert_eq!(d.routes().next().unwrap().vehicle, 1);
    }

    #[test]
    fn dangling_route() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[(0, 1)]);
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        let failure = d.failures().next().unwrap();
        assert_eq!(failure.anomaly, DecodeAnomaly::Dangling { at: "A".to_string() });
        assert_eq!(failure.partial, vec![0, 1]);
    }

    #[test]
    fn used_without_arcs_dangles_at_depot() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[]);
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        assert_eq!(d.failures().next().unwrap().anomaly, DecodeAnomaly::Dangling { at: "D".to_string() });
    }

    #[test]
    fn cycle_is_truncated_at_repeat() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[(0, 1), (1, 2), (2, 1)]);
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        let failure = d.failures().next().unwrap();
        assert_eq!(failure.anomaly, DecodeAnomaly::Cycle { repeated: "A".to_string() });
        assert_eq!(failure.partial, vec![0, 1, 2]);
    }

    #[test]
    fn disconnected_fragment_is_reported() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[(0, 1), (1, 0), (2, 1)]);
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        let failure = d.failures().next().unwrap();
        assert_eq!(
            failure.anomaly,
            DecodeAnomaly::StrayArcs { arcs: vec![("B".to_string(), "A".to_string())] }
        );
        assert_eq!(failure.partial, vec![0, 1, 0]);
    }

    #[test]
    fn branching_follows_first_arc_and_warns() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[(0, 1), (1, 0), (1, 2), (2, 0)]);
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        assert_eq!(d.warnings.len(), 1);
        assert!(d.warnings[0].contains("leaves A on 2 arcs"));
        let failure = d.failures().next().unwrap();
        assert_eq!(failure.partial, vec![0, 1, 0]);
        assert!(matches!(failure.anomaly, DecodeAnomaly::StrayArcs { .. }));
    }

    #[test]
    fn unused_vehicle_with_arcs_is_decoded_with_warning() {
        let p = two_clients();
        let (f, mut x) = setup(&p);
        select(&f, &mut x, 0, &[(0, 1), (1, 2), (2, 0)]);
        x[f.vehicles[0].used] = 0.0;
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        assert_eq!(d.routes().count(), 1);
        assert!(d.warnings[0].contains("not marked used"));
    }

    #[test]
    fn refuels_above_threshold() {
        let p = station_detour();
        let (f, mut x) = setup(&p);
        let (s, c) = (p.network.index_of("S").unwrap(), p.network.index_of("C").unwrap());
        select(&f, &mut x, 0, &[(0, s), (s, c), (c, 0)]);
        x[f.vehicles[0].refuel[s]] = 42.5;
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        let route = d.routes().next().unwrap();
        assert_eq!(route.refuels, vec![(s, 42.5)]);
        assert_eq!(route.refuel_at(s), 42.5);

        x[f.vehicles[0].refuel[s]] = 0.005;
        let d = decode(&p, &f, &x, DEFAULT_REFUEL_THRESHOLD);
        assert!(d.routes().next().unwrap().refuels.is_empty());
    }
}
