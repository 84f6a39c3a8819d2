//! Reads a problem instance from a directory of CSV tables.
//!
//! Mandatory: `depots.csv`, `clients.csv`, `stations.csv`, `vehicles.csv`.
//! Optional: `parameters.csv`, `tolls.csv`, `restrictions.csv`.

use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use crate::{
    fleet::{Fleet, Vehicle},
    network::{Network, Node, Toll},
    problem::{CostParams, Problem},
    GeoPoint, ModelError,
};

pub const DEFAULT_KM_PER_GALLON: f64 = 8.0;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing input file {0}")]
    MissingFile(PathBuf),
    #[error("cannot read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("{0} has no rows")]
    Empty(&'static str),
    #[error("vehicle {0} has neither FuelCapacity nor Range")]
    NoFuelCapacity(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DepotRow {
    pub depot_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientRow {
    pub client_id: String,
    pub demand: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StationRow {
    pub station_id: String,
    pub fuel_price: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleRow {
    pub vehicle_id: String,
    pub load_capacity: f64,
    #[serde(default)]
    pub fuel_capacity: Option<f64>,
    /// Autonomy in km, used when `FuelCapacity` is absent.
    #[serde(default)]
    pub range: Option<f64>,
    #[serde(default)]
    pub km_per_gallon: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterRow {
    pub parameter: String,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TollRow {
    pub origin_node_id: String,
    pub destination_node_id: String,
    pub toll_cost: f64,
    #[serde(default)]
    pub toll_rate_per_kg: Option<f64>,
    #[serde(default)]
    pub is_bidirectional: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestrictionRow {
    pub restriction_type: String,
    pub vehicle_id: String,
    pub origin_node_id: String,
    pub destination_node_id: String,
}

/// All tables of an instance, before cross-referencing.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub depots: Vec<DepotRow>,
    pub clients: Vec<ClientRow>,
    pub stations: Vec<StationRow>,
    pub vehicles: Vec<VehicleRow>,
    pub parameters: Vec<ParameterRow>,
    pub tolls: Vec<TollRow>,
    pub restrictions: Vec<RestrictionRow>,
}

pub fn read_rows<T: DeserializeOwned, R: Read>(file: &str, reader: R) -> Result<Vec<T>, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = vec![];
    for row in reader.deserialize() {
        rows.push(row.map_err(|source| LoadError::Csv { file: file.to_string(), source })?);
    }
    Ok(rows)
}

fn read_file<T: DeserializeOwned>(dir: &Path, name: &str, required: bool) -> Result<Vec<T>, LoadError> {
    let path = dir.join(name);
    if !path.exists() {
        if required {
            return Err(LoadError::MissingFile(path));
        }
        debug!("{} not found, skipping", name);
        return Ok(vec![]);
    }
    let file = File::open(&path).map_err(|source| LoadError::Io { file: name.to_string(), source })?;
    let rows = read_rows(name, file)?;
    debug!("read {} rows from {}", rows.len(), name);
    Ok(rows)
}

pub fn read_dir(dir: &Path) -> Result<Tables, LoadError> {
    Ok(Tables {
        depots: read_file(dir, "depots.csv", true)?,
        clients: read_file(dir, "clients.csv", true)?,
        stations: read_file(dir, "stations.csv", true)?,
        vehicles: read_file(dir, "vehicles.csv", true)?,
        parameters: read_file(dir, "parameters.csv", false)?,
        tolls: read_file(dir, "tolls.csv", false)?,
        restrictions: read_file(dir, "restrictions.csv", false)?,
    })
}

pub fn load_dir(dir: &Path) -> Result<Problem, LoadError> {
    info!("loading instance from {}", dir.display());
    build_problem(read_dir(dir)?)
}

fn is_truthy(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "y")
}

/// Cost parameters and the default fuel efficiency from `Parameter,Value` rows.
pub fn parameters(rows: &[ParameterRow]) -> (CostParams, f64) {
    let mut costs = CostParams::default();
    let mut km_per_gallon = DEFAULT_KM_PER_GALLON;
    for row in rows {
        match row.parameter.as_str() {
            "CostFixedVehicle" => costs.fixed_cost_per_vehicle = row.value,
            "CostPerKm" => costs.cost_per_km = row.value,
            "AverageSpeed" => costs.average_speed_kmh = row.value,
            "KmPerGallon" => km_per_gallon = row.value,
            other => debug!("ignoring parameter {}", other),
        }
    }
    (costs, km_per_gallon)
}

pub fn build_problem(tables: Tables) -> Result<Problem, LoadError> {
    if tables.depots.is_empty() {
        return Err(LoadError::Empty("depots.csv"));
    }
    if tables.vehicles.is_empty() {
        return Err(LoadError::Empty("vehicles.csv"));
    }
    let (costs, default_km_per_gallon) = parameters(&tables.parameters);

    let mut nodes = Vec::new();
    for d in tables.depots.iter() {
        nodes.push(Node::depot(d.depot_id.clone(), GeoPoint::new(d.latitude, d.longitude)));
    }
    for c in tables.clients.iter() {
        nodes.push(Node::client(c.client_id.clone(), c.demand, GeoPoint::new(c.latitude, c.longitude)));
    }
    for s in tables.stations.iter() {
        nodes.push(Node::station(
            s.station_id.clone(),
            s.fuel_price,
            GeoPoint::new(s.latitude, s.longitude),
        ));
    }
    let mut network = Network::from_coordinates(nodes)?;

    let mut vehicles = Vec::new();
    for row in tables.vehicles.iter() {
        let km_per_gallon = row.km_per_gallon.unwrap_or(default_km_per_gallon);
        let vehicle = match (row.fuel_capacity, row.range) {
            (Some(tank), _) => Vehicle::new(row.vehicle_id.clone(), row.load_capacity, tank, km_per_gallon),
            (None, Some(range)) => {
                Vehicle::from_range(row.vehicle_id.clone(), row.load_capacity, range, km_per_gallon)
            }
            (None, None) => return Err(LoadError::NoFuelCapacity(row.vehicle_id.clone())),
        };
        vehicles.push(vehicle);
    }
    let mut fleet = Fleet::new(vehicles)?;

    let arc_of = |network: &Network, from: &str, to: &str, file: &str| match (
        network.index_of(from),
        network.index_of(to),
    ) {
        (Some(i), Some(j)) if i != j => Some((i, j)),
        _ => {
            warn!("{}: skipping arc {} -> {}", file, from, to);
            None
        }
    };

    let mut tolls: HashMap<(usize, usize), Toll> = HashMap::new();
    for row in tables.tolls.iter() {
        let Some((i, j)) = arc_of(&network, &row.origin_node_id, &row.destination_node_id, "tolls.csv")
        else {
            continue;
        };
        let toll = Toll { base_rate: row.toll_cost, rate_per_kg: row.toll_rate_per_kg.unwrap_or(0.0) };
        tolls.insert((i, j), toll);
        if row.is_bidirectional.as_deref().map(is_truthy).unwrap_or(false) {
            tolls.insert((j, i), toll);
        }
    }
    let mut toll_arcs = tolls.into_iter().collect::<Vec<_>>();
    toll_arcs.sort_by_key(|(arc, _)| *arc);
    for ((i, j), toll) in toll_arcs {
        network = network.with_toll(i, j, toll)?;
    }

    for row in tables.restrictions.iter() {
        let Some((i, j)) =
            arc_of(&network, &row.origin_node_id, &row.destination_node_id, "restrictions.csv")
        else {
            continue;
        };
        let kind = row.restriction_type.to_ascii_uppercase();
        if kind != "FORBIDDEN" && kind != "RESTRICTED" {
            warn!("restrictions.csv: unknown restriction type {}", row.restriction_type);
            continue;
        }
        if row.vehicle_id.eq_ignore_ascii_case("ALL") {
            network = network.forbid(i, j)?;
        } else if let Some(v) = fleet.index_of(&row.vehicle_id) {
            fleet = fleet.restrict(v, i, j)?;
        } else {
            warn!("restrictions.csv: unknown vehicle {}", row.vehicle_id);
        }
    }

    let problem = Problem::new(network, fleet, costs)?;
    info!(
        "loaded {} clients, {} stations, {} vehicles, {} forbidden arcs, {} tolled arcs",
        problem.network.clients().count(),
        problem.network.stations().count(),
        problem.fleet.len(),
        problem.network.forbidden_arcs().count(),
        problem.network.tolls().count(),
    );
    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn instance_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fleetmip-loader-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        write(&dir, "depots.csv", "DepotId,Latitude,Longitude\nCD01,4.60,-74.08\n");
        write(
            &dir,
            "clients.csv",
            "ClientId,Demand,Latitude,Longitude\nC001,120,4.70,-74.05\nC002,80,4.65,-74.10\n",
        );
        write(&dir, "stations.csv", "StationId,FuelPrice,Latitude,Longitude\nE001,15000,4.62,-74.07\n");
        write(
            &dir,
            "vehicles.csv",
            "VehicleId,LoadCapacity,FuelCapacity,Range,KmPerGallon\nV001,500,40,,\nV002,300,,200,10\n",
        );
        dir
    }

    #[test]
    fn loads_directory() {
        let _ = env_logger::try_init();
        let dir = instance_dir("full");
        write(&dir, "parameters.csv", "Parameter,Value\nCostPerKm,3000\nKmPerGallon,5\nFoo,1\n");
        write(
            &dir,
            "tolls.csv",
            "OriginNodeId,DestinationNodeId,TollCost,TollRatePerKg,IsBidirectional\n\
             C001,C002,9000,2,True\nC001,X999,100,,false\n",
        );
        write(
            &dir,
            "restrictions.csv",
            "RestrictionType,VehicleId,OriginNodeId,DestinationNodeId\n\
             FORBIDDEN,ALL,CD01,C002\nRESTRICTED,V002,C001,E001\nRESTRICTED,V999,C001,E001\n",
        );

        let p = load_dir(&dir).unwrap();
        let n = &p.network;
        assert_eq!(n.len(), 4);
        assert_eq!(n.node(n.depot()).id, "CD01");
        assert_eq!(p.costs.cost_per_km, 3000.0);
        assert_eq!(p.costs.fixed_cost_per_vehicle, 80_000.0);

        let v1 = p.fleet.vehicle(0);
        assert_eq!((v1.tank_capacity, v1.km_per_gallon), (40.0, 5.0));
        let v2 = p.fleet.vehicle(1);
        assert_eq!((v2.tank_capacity, v2.km_per_gallon), (20.0, 10.0));

        let (c1, c2, e1) = (n.index_of("C001").unwrap(), n.index_of("C002").unwrap(), n.index_of("E001").unwrap());
        assert_eq!(n.toll(c1, c2), Some(&Toll { base_rate: 9000.0, rate_per_kg: 2.0 }));
        assert!(n.toll(c2, c1).is_some());
        assert_eq!(n.tolls().count(), 2);
        assert!(n.is_forbidden(n.depot(), c2));
        assert!(!n.is_forbidden(c2, n.depot()));
        assert!(p.fleet.is_restricted(1, c1, e1));
        assert!(!p.fleet.is_restricted(0, c1, e1));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn optional_files_may_be_absent() {
        let dir = instance_dir("minimal");
        let p = load_dir(&dir).unwrap();
        assert_eq!(p.costs, CostParams::default());
        assert_eq!(p.fleet.vehicle(0).km_per_gallon, DEFAULT_KM_PER_GALLON);
        assert_eq!(p.network.forbidden_arcs().count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_mandatory_file() {
        let dir = instance_dir("missing");
        std::fs::remove_file(dir.join("stations.csv")).unwrap();
        assert!(matches!(load_dir(&dir), Err(LoadError::MissingFile(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn vehicle_without_fuel_data() {
        let mut tables = Tables::default();
        tables.depots = read_rows("depots.csv", "DepotId,Latitude,Longitude\nD,0,0\n".as_bytes()).unwrap();
        tables.vehicles =
            read_rows("vehicles.csv", "VehicleId,LoadCapacity\nV1,100\n".as_bytes()).unwrap();
        assert!(matches!(build_problem(tables), Err(LoadError::NoFuelCapacity(id)) if id == "V1"));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let err = read_rows::<ClientRow, _>("clients.csv", "ClientId,Demand,Latitude,Longitude\nC1,lots,0,0\n".as_bytes())
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot parse clients.csv"));
    }
}
