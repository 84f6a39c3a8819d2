use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{check_value, GeoPoint, ModelError};

pub type NodeIdx = usize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeRole {
    Depot,
    Client { demand: f64 },
    Station { fuel_price: f64 },
}

impl NodeRole {
    pub fn is_depot(&self) -> bool {
        matches!(self, NodeRole::Depot)
    }

    pub fn is_client(&self) -> bool {
        matches!(self, NodeRole::Client { .. })
    }

    pub fn is_station(&self) -> bool {
        matches!(self, NodeRole::Station { .. })
    }

    pub fn demand(&self) -> f64 {
        match self {
            NodeRole::Client { demand } => *demand,
            _ => 0.0,
        }
    }

    pub fn fuel_price(&self) -> Option<f64> {
        match self {
            NodeRole::Station { fuel_price } => Some(*fuel_price),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub role: NodeRole,
    pub loc: GeoPoint,
}

impl Node {
    pub fn depot(id: impl Into<String>, loc: GeoPoint) -> Self {
        Node { id: id.into(), role: NodeRole::Depot, loc }
    }

    pub fn client(id: impl Into<String>, demand: f64, loc: GeoPoint) -> Self {
        Node { id: id.into(), role: NodeRole::Client { demand }, loc }
    }

    pub fn station(id: impl Into<String>, fuel_price: f64, loc: GeoPoint) -> Self {
        Node { id: id.into(), role: NodeRole::Station { fuel_price }, loc }
    }
}

/// Toll charged for crossing an arc. The per-kg part is charged on the
/// crossing vehicle's rated load capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Toll {
    pub base_rate: f64,
    pub rate_per_kg: f64,
}

impl Toll {
    pub fn flat(base_rate: f64) -> Self {
        Toll { base_rate, rate_per_kg: 0.0 }
    }

    pub fn cost_for(&self, weight_kg: f64) -> f64 {
        self.base_rate + self.rate_per_kg * weight_kg
    }
}

/// Complete directed graph over depot, clients and stations, minus self-loops
/// and globally forbidden arcs. Distances are fixed at construction.
#[derive(Clone, Debug)]
pub struct Network {
    nodes: Vec<Node>,
    by_id: HashMap<String, NodeIdx>,
    depot: NodeIdx,
    dist: Vec<Vec<f64>>,
    forbidden: BTreeSet<(NodeIdx, NodeIdx)>,
    tolls: BTreeMap<(NodeIdx, NodeIdx), Toll>,
}

impl Network {
    /// Builds the network with great-circle distances between node coordinates.
    pub fn from_coordinates(nodes: Vec<Node>) -> Result<Self, ModelError> {
        let dist = nodes
            .iter()
            .map(|a| nodes.iter().map(|b| a.loc.great_circle_km(&b.loc)).collect())
            .collect();
        Self::with_distances(nodes, dist)
    }

    pub fn with_distances(nodes: Vec<Node>, dist: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        let n = nodes.len();
        if dist.len() != n || dist.iter().any(|row| row.len() != n) {
            return Err(ModelError::DistanceShape {
                rows: dist.len(),
                cols: dist.iter().map(|r| r.len()).find(|l| *l != n).unwrap_or(n),
                n,
            });
        }

        let mut by_id = HashMap::new();
        let mut depots = Vec::new();
        for (idx, node) in nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), idx).is_some() {
                return Err(ModelError::DuplicateNode(node.id.clone()));
            }
            match node.role {
                NodeRole::Depot => depots.push(idx),
                NodeRole::Client { demand } => check_value(&node.id, "demand", demand, false)?,
                NodeRole::Station { fuel_price } => {
                    check_value(&node.id, "fuel price", fuel_price, false)?
                }
            }
        }
        let depot = match depots.as_slice() {
            [] => return Err(ModelError::NoDepot),
            [d] => *d,
            many => return Err(ModelError::MultipleDepots(many.len())),
        };

        for (i, row) in dist.iter().enumerate() {
            for (j, d) in row.iter().enumerate() {
                if i != j && !(d.is_finite() && *d >= 0.0) {
                    return Err(ModelError::InvalidDistance {
                        from: nodes[i].id.clone(),
                        to: nodes[j].id.clone(),
                        value: *d,
                    });
                }
            }
        }

        Ok(Network {
            nodes,
            by_id,
            depot,
            dist,
            forbidden: Default::default(),
            tolls: Default::default(),
        })
    }

    pub fn forbid(mut self, from: NodeIdx, to: NodeIdx) -> Result<Self, ModelError> {
        self.check_arc(from, to)?;
        self.forbidden.insert((from, to));
        Ok(self)
    }

    pub fn with_toll(mut self, from: NodeIdx, to: NodeIdx, toll: Toll) -> Result<Self, ModelError> {
        self.check_arc(from, to)?;
        let id = format!("{}->{}", self.nodes[from].id, self.nodes[to].id);
        check_value(&id, "toll base rate", toll.base_rate, false)?;
        check_value(&id, "toll rate per kg", toll.rate_per_kg, false)?;
        self.tolls.insert((from, to), toll);
        Ok(self)
    }

    pub(crate) fn check_arc(&self, from: NodeIdx, to: NodeIdx) -> Result<(), ModelError> {
        for n in [from, to] {
            if n >= self.nodes.len() {
                return Err(ModelError::NodeOutOfRange(n));
            }
        }
        if from == to {
            return Err(ModelError::SelfLoop(self.nodes[from].id.clone()));
        }
        Ok(())
    }

    /// Copy of the network with every station price multiplied by `factor`.
    pub fn scaled_fuel_prices(&self, factor: f64) -> Network {
        let mut network = self.clone();
        for node in network.nodes.iter_mut() {
            if let NodeRole::Station { fuel_price } = &mut node.role {
                *fuel_price *= factor;
            }
        }
        network
    }

    /// Copy of the network with every toll multiplied by `factor`.
    pub fn scaled_tolls(&self, factor: f64) -> Network {
        let mut network = self.clone();
        for toll in network.tolls.values_mut() {
            toll.base_rate *= factor;
            toll.rate_per_kg *= factor;
        }
        network
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn depot(&self) -> NodeIdx {
        self.depot
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIdx> {
        self.by_id.get(id).copied()
    }

    pub fn dist(&self, from: NodeIdx, to: NodeIdx) -> f64 {
        self.dist[from][to]
    }

    pub fn demand(&self, idx: NodeIdx) -> f64 {
        self.nodes[idx].role.demand()
    }

    pub fn is_forbidden(&self, from: NodeIdx, to: NodeIdx) -> bool {
        self.forbidden.contains(&(from, to))
    }

    pub fn forbidden_arcs(&self) -> impl Iterator<Item = (NodeIdx, NodeIdx)> + '_ {
        self.forbidden.iter().copied()
    }

    pub fn toll(&self, from: NodeIdx, to: NodeIdx) -> Option<&Toll> {
        self.tolls.get(&(from, to))
    }

    pub fn tolls(&self) -> impl Iterator<Item = ((NodeIdx, NodeIdx), &Toll)> + '_ {
        self.tolls.iter().map(|(k, t)| (*k, t))
    }

    pub fn clients(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.nodes.len()).filter(|i| self.nodes[*i].role.is_client())
    }

    pub fn stations(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.nodes.len()).filter(|i| self.nodes[*i].role.is_station())
    }

    pub fn total_demand(&self) -> f64 {
        self.nodes.iter().map(|n| n.role.demand()).sum()
    }

    /// Arcs that exist for at least one vehicle, in node order.
    pub fn arcs(&self) -> impl Iterator<Item = (NodeIdx, NodeIdx)> + '_ {
        let n = self.nodes.len();
        (0..n)
            .flat_map(move |i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| i != j && !self.is_forbidden(i, j))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Depot, two clients and a station with all distances set to `d`.
    pub fn uniform_network(d: f64) -> Network {
        let p = GeoPoint::new(0.0, 0.0);
        let nodes = vec![
            Node::depot("D", p),
            Node::client("A", 10.0, p),
            Node::client("B", 15.0, p),
            Node::station("S", 3.0, p),
        ];
        let dist = (0..4)
            .map(|i| (0..4).map(|j| if i == j { 0.0 } else { d }).collect())
            .collect();
        Network::with_distances(nodes, dist).unwrap()
    }

    #[test]
    fn requires_exactly_one_depot() {
        let p = GeoPoint::new(0.0, 0.0);
        let err = Network::from_coordinates(vec![Node::client("A", 1.0, p)]).unwrap_err();
        assert_eq!(err, ModelError::NoDepot);

        let err =
            Network::from_coordinates(vec![Node::depot("D1", p), Node::depot("D2", p)]).unwrap_err();
        assert_eq!(err, ModelError::MultipleDepots(2));
    }

    #[test]
    fn rejects_bad_input() {
        let p = GeoPoint::new(0.0, 0.0);
        let err = Network::from_coordinates(vec![Node::depot("D", p), Node::client("D", 1.0, p)])
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateNode("D".to_string()));

        let err = Network::from_coordinates(vec![Node::depot("D", p), Node::client("A", -1.0, p)])
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { what: "demand", .. }));

        let err =
            Network::with_distances(vec![Node::depot("D", p)], vec![vec![0.0, 1.0]]).unwrap_err();
        assert!(matches!(err, ModelError::DistanceShape { n: 1, .. }));
    }

    #[test]
    fn coordinates_give_symmetric_distances() {
        let network = Network::from_coordinates(vec![
            Node::depot("D", GeoPoint::new(4.6, -74.1)),
            Node::client("A", 5.0, GeoPoint::new(6.2, -75.6)),
        ])
        .unwrap();
        assert!(network.dist(0, 1) > 200.0);
        assert_eq!(network.dist(0, 1), network.dist(1, 0));
    }

    #[test]
    fn forbidden_arcs_are_directed() {
        let network = uniform_network(5.0).forbid(0, 1).unwrap();
        assert!(network.is_forbidden(0, 1));
        assert!(!network.is_forbidden(1, 0));
        let arcs = network.arcs().collect::<Vec<_>>();
        assert_eq!(arcs.len(), 4 * 3 - 1);
        assert!(!arcs.contains(&(0, 1)));
        assert!(arcs.contains(&(1, 0)));
        assert!(uniform_network(5.0).forbid(2, 2).is_err());
    }

    #[test]
    fn roles_and_lookups() {
        let network = uniform_network(5.0);
        assert_eq!(network.depot(), 0);
        assert_eq!(network.clients().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(network.stations().collect::<Vec<_>>(), vec![3]);
        assert_eq!(network.total_demand(), 25.0);
        assert_eq!(network.index_of("S"), Some(3));
        assert_eq!(network.index_of("X"), None);
    }

    #[test]
    fn scaled_copies_leave_source_untouched() {
        let network = uniform_network(5.0)
            .with_toll(1, 2, Toll { base_rate: 100.0, rate_per_kg: 0.5 })
            .unwrap();
        let pricier = network.scaled_fuel_prices(1.1);
        let cheaper_tolls = network.scaled_tolls(0.5);

        assert_eq!(network.node(3).role.fuel_price(), Some(3.0));
        assert!((pricier.node(3).role.fuel_price().unwrap() - 3.3).abs() < 1e-12);
        assert_eq!(network.toll(1, 2).unwrap().cost_for(10.0), 105.0);
        assert_eq!(cheaper_tolls.toll(1, 2).unwrap().cost_for(10.0), 52.5);
        assert!(network.toll(2, 1).is_none());
    }
}
