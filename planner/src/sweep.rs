//! Sequential what-if runs over modified copies of one problem.

use std::{collections::BTreeMap, io::Read};

use fleetmip_structs::{problem::Problem, solution::Solution, ModelError};
use log::{info, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    extsolvers::LPSolver,
    plan::{solve, PlanError, PlannerParams},
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read scenarios: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse scenarios: {0}")]
    Json(#[from] serde_json::Error),
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "one")]
    pub fuel_price_factor: f64,
    #[serde(default = "one", alias = "toll_multiplier")]
    pub toll_factor: f64,
    /// Node id pairs closed to every vehicle.
    #[serde(default, alias = "additional_forbidden_arcs")]
    pub extra_forbidden_arcs: Vec<(String, String)>,
}

impl Scenario {
    pub fn base() -> Self {
        Scenario {
            name: "base".to_string(),
            description: None,
            fuel_price_factor: 1.0,
            toll_factor: 1.0,
            extra_forbidden_arcs: vec![],
        }
    }

    /// Copy of `problem` with this scenario's modifiers applied.
    pub fn apply(&self, problem: &Problem) -> Result<Problem, ModelError> {
        let mut network = problem.network.scaled_fuel_prices(self.fuel_price_factor);
        network = network.scaled_tolls(self.toll_factor);
        for (from, to) in self.extra_forbidden_arcs.iter() {
            match (network.index_of(from), network.index_of(to)) {
                (Some(i), Some(j)) if i != j => network = network.forbid(i, j)?,
                _ => warn!("scenario {}: skipping arc {} -> {}", self.name, from, to),
            }
        }
        Problem::new(network, problem.fleet.clone(), problem.costs)
    }
}

/// Reads a JSON object mapping scenario names to their modifiers.
pub fn load_scenarios(reader: impl Read) -> Result<Vec<Scenario>, ScenarioError> {
    let map: BTreeMap<String, Scenario> = serde_json::from_reader(reader)?;
    Ok(map
        .into_iter()
        .map(|(name, mut s)| {
            s.name = name;
            s
        })
        .collect())
}

/// One scenario per fuel price change, given in percent.
pub fn price_variations(percents: &[f64]) -> Vec<Scenario> {
    percents
        .iter()
        .map(|p| Scenario {
            name: format!("fuel{:+}%", p),
            fuel_price_factor: 1.0 + p / 100.0,
            ..Scenario::base()
        })
        .collect()
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub scenario: Scenario,
    pub result: Result<Solution, PlanError>,
}

pub fn run_sweep<LP: LPSolver>(
    problem: &Problem,
    scenarios: &[Scenario],
    params: &PlannerParams,
) -> Vec<SweepOutcome> {
    let mut outcomes = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        info!("scenario {}", scenario.name);
        let result = scenario
            .apply(problem)
            .map_err(PlanError::from)
            .and_then(|p| solve::<LP>(&p, params));
        match &result {
            Ok(s) => info!("scenario {}: total cost {:.2}", scenario.name, s.total_cost),
            Err(e) => warn!("scenario {}: {}", scenario.name, e),
        }
        outcomes.push(SweepOutcome { scenario: scenario.clone(), result });
    }
    outcomes
}

pub fn cheapest(outcomes: &[SweepOutcome]) -> Option<&SweepOutcome> {
    outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|s| (o, s.total_cost)))
        .min_by_key(|(_, cost)| OrderedFloat(*cost))
        .map(|(o, _)| o)
}

#[cfg(test)]
mod tests {
    use fleetmip_structs::network::Toll;

    use super::*;
    use crate::test_instances::station_detour;

    #[test]
    fn reads_scenario_file() {
        let json = r#"{
            "peajes_altos": { "description": "tolls up", "toll_multiplier": 1.5 },
            "cierre": { "additional_forbidden_arcs": [["D", "C"], ["X", "C"]] }
        }"#;
        let scenarios = load_scenarios(json.as_bytes()).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].name, "cierre");
        assert_eq!(scenarios[0].toll_factor, 1.0);
        assert_eq!(scenarios[0].extra_forbidden_arcs.len(), 2);
        assert_eq!(scenarios[1].toll_factor, 1.5);
        assert_eq!(scenarios[1].description.as_deref(), Some("tolls up"));
        assert!(load_scenarios("[1, 2]".as_bytes()).is_err());
    }

    #[test]
    fn apply_copies_the_problem() {
        let mut base = station_detour();
        base.network = base.network.clone().with_toll(1, 2, Toll::flat(100.0)).unwrap();
        let scenario = Scenario {
            fuel_price_factor: 1.2,
            toll_factor: 2.0,
            extra_forbidden_arcs: vec![("D".to_string(), "C".to_string()), ("D".to_string(), "Z".to_string())],
            ..Scenario::base()
        };
        let p = scenario.apply(&base).unwrap();
        let s = p.network.index_of("S").unwrap();
        assert!((p.network.node(s).role.fuel_price().unwrap() - 2.4).abs() < 1e-12);
        assert_eq!(p.toll_cost(0, 1, 2), 200.0);
        assert!(p.network.is_forbidden(0, 2));
        assert!(!base.network.is_forbidden(0, 2));
        assert_eq!(base.toll_cost(0, 1, 2), 100.0);
    }

    #[test]
    fn price_scenarios() {
        let s = price_variations(&[-20.0, 0.0, 10.0]);
        let names = s.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["fuel-20%", "fuel+0%", "fuel+10%"]);
        assert!((s[0].fuel_price_factor - 0.8).abs() < 1e-12);
        assert!((s[2].fuel_price_factor - 1.1).abs() < 1e-12);
    }

    #[test]
    fn cheapest_ignores_failures() {
        let outcomes = vec![
            SweepOutcome { scenario: Scenario::base(), result: Err(PlanError::Infeasible) },
        ];
        assert!(cheapest(&outcomes).is_none());
    }
}
