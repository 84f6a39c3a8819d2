use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
#[cfg(feature = "gurobi")]
use fleetmip_planner::extsolvers::gurobi::GurobiSolver;
#[cfg(feature = "highs")]
use fleetmip_planner::extsolvers::highs::HighsSolver;
#[cfg(feature = "microlp")]
use fleetmip_planner::extsolvers::microlp::MicroLpSolver;
use fleetmip_planner::{
    sweep::{cheapest, load_scenarios, run_sweep, Scenario, SweepOutcome},
    PlannerParams,
};
use fleetmip_structs::{
    loader::load_dir,
    problem::Problem,
    solution::{Solution, VehicleOutcome},
};
use log::info;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Microlp,
    Highs,
    Gurobi,
}

/// Plans fleet routes for the instance in a directory of CSV tables.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    data_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Backend::Microlp)]
    solver: Backend,

    /// Solver time limit in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Relative optimality gap
    #[arg(long)]
    gap: Option<f64>,

    /// JSON map of named scenarios to run instead of the base instance
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// One CSV row per vehicle
    #[arg(long)]
    routes: Option<PathBuf>,

    #[arg(long)]
    json: Option<PathBuf>,

    #[arg(long)]
    write_model: Option<PathBuf>,
}

/// Flat CSV view of a vehicle outcome.
#[derive(Serialize)]
struct RouteRow<'a> {
    scenario: &'a str,
    vehicle_id: &'a str,
    outcome: &'static str,
    route: String,
    clients: String,
    demand_served: Option<f64>,
    distance_km: Option<f64>,
    fuel_used_gal: Option<f64>,
    refuel_gal: Option<f64>,
    travel_time_h: Option<f64>,
    fixed_cost: Option<f64>,
    distance_cost: Option<f64>,
    fuel_cost: Option<f64>,
    toll_cost: Option<f64>,
    total_cost: Option<f64>,
    anomaly: Option<String>,
}

fn rows<'a>(scenario: &'a str, solution: &'a Solution) -> impl Iterator<Item = RouteRow<'a>> + 'a {
    solution.vehicles.iter().map(move |outcome| match outcome {
        VehicleOutcome::Route(r) => RouteRow {
            scenario,
            vehicle_id: &r.vehicle_id,
            outcome: "route",
            route: r.route.join("-"),
            clients: r.clients.iter().map(|c| c.id.as_str()).collect::<Vec<_>>().join("-"),
            demand_served: Some(r.demand_served),
            distance_km: Some(r.distance_km),
            fuel_used_gal: Some(r.fuel_used_gal),
            refuel_gal: Some(r.refuels.iter().map(|e| e.gallons).sum()),
            travel_time_h: Some(r.travel_time_h),
            fixed_cost: Some(r.costs.fixed),
            distance_cost: Some(r.costs.distance),
            fuel_cost: Some(r.costs.fuel),
            toll_cost: Some(r.costs.toll),
            total_cost: Some(r.total_cost),
            anomaly: None,
        },
        VehicleOutcome::DecodeFailure(f) => RouteRow {
            scenario,
            vehicle_id: &f.vehicle_id,
            outcome: "decode_failure",
            route: f.partial_route.join("-"),
            clients: String::new(),
            demand_served: None,
            distance_km: None,
            fuel_used_gal: None,
            refuel_gal: None,
            travel_time_h: None,
            fixed_cost: None,
            distance_cost: None,
            fuel_cost: None,
            toll_cost: None,
            total_cost: None,
            anomaly: Some(f.anomaly.to_string()),
        },
    })
}

fn print_table(scenario: &str, solution: &Solution) -> anyhow::Result<()> {
    let mut tw = tabwriter::TabWriter::new(Vec::new());
    writeln!(&mut tw, "vehicle\troute\tkg\tkm\trefuel gal\ttoll\ttotal")?;
    writeln!(&mut tw, "---\t---\t---\t---\t---\t---\t---")?;
    for outcome in solution.vehicles.iter() {
        match outcome {
            VehicleOutcome::Route(r) => writeln!(
                &mut tw,
                "{}\t{}\t{:.1}\t{:.1}\t{:.2}\t{:.2}\t{:.2}",
                r.vehicle_id,
                r.route.join(" "),
                r.demand_served,
                r.distance_km,
                r.refuels.iter().map(|e| e.gallons).sum::<f64>(),
                r.costs.toll,
                r.total_cost
            )?,
            VehicleOutcome::DecodeFailure(f) => {
                writeln!(&mut tw, "{}\tFAILED: {}\t\t\t\t\t", f.vehicle_id, f.anomaly)?
            }
        }
    }
    let buf = tw
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing table: {}", e.error()))?;
    let written = String::from_utf8(buf)?;

    println!("# {} ({:?})", scenario, solution.status);
    println!("{}", written);
    let c = &solution.costs;
    println!(
        "total {:.2} = fixed {:.2} + distance {:.2} + fuel {:.2} + toll {:.2}",
        solution.total_cost, c.fixed, c.distance, c.fuel, c.toll
    );
    if let Some(gap) = solution.gap {
        println!("gap {:.4}, bound {:?}", gap, solution.best_bound);
    }
    for w in solution.warnings.iter() {
        println!("warning: {}", w);
    }
    println!();
    Ok(())
}

fn dispatch(
    backend: Backend,
    problem: &Problem,
    scenarios: &[Scenario],
    params: &PlannerParams,
) -> anyhow::Result<Vec<SweepOutcome>> {
    Ok(match backend {
        #[cfg(feature = "microlp")]
        Backend::Microlp => run_sweep::<MicroLpSolver>(problem, scenarios, params),
        #[cfg(feature = "highs")]
        Backend::Highs => run_sweep::<HighsSolver>(problem, scenarios, params),
        #[cfg(feature = "gurobi")]
        Backend::Gurobi => run_sweep::<GurobiSolver>(problem, scenarios, params),
        #[allow(unreachable_patterns)]
        other => bail!("solver {:?} is not compiled in, enable its cargo feature", other),
    })
}

fn write_routes(path: &Path, outcomes: &[SweepOutcome]) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for o in outcomes.iter() {
        if let Ok(solution) = o.result.as_ref() {
            for row in rows(&o.scenario.name, solution) {
                w.serialize(row)?;
            }
        }
    }
    w.flush()?;
    info!("routes written to {}", path.display());
    Ok(())
}

fn write_json(path: &Path, outcomes: &[SweepOutcome]) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct Entry<'a> {
        scenario: &'a Scenario,
        solution: Option<&'a Solution>,
        error: Option<String>,
    }
    let entries = outcomes
        .iter()
        .map(|o| Entry {
            scenario: &o.scenario,
            solution: o.result.as_ref().ok(),
            error: o.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect::<Vec<_>>();
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &entries)?;
    info!("solution written to {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let problem = load_dir(&cli.data_dir)?;
    info!(
        "{} nodes, {} vehicles, demand {:.1} kg",
        problem.network.len(),
        problem.fleet.len(),
        problem.network.total_demand()
    );

    let mut params = PlannerParams::default();
    if let Some(t) = cli.time_limit {
        params.time_limit_s = t;
    }
    if let Some(g) = cli.gap {
        params.mip_gap = g;
    }
    params.model_path = cli.write_model.clone();

    let scenarios = match cli.scenarios.as_ref() {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            load_scenarios(file)?
        }
        None => vec![Scenario::base()],
    };
    if scenarios.is_empty() {
        bail!("no scenarios to run");
    }

    let outcomes = dispatch(cli.solver, &problem, &scenarios, &params)?;

    #[cfg(feature = "prof")]
    hprof::profiler().print_timing();

    for o in outcomes.iter() {
        match o.result.as_ref() {
            Ok(solution) => print_table(&o.scenario.name, solution)?,
            Err(e) => println!("# {}: {}\n", o.scenario.name, e),
        }
    }
    if outcomes.len() > 1 {
        if let Some(best) = cheapest(&outcomes) {
            println!("cheapest scenario: {}", best.scenario.name);
        }
    }

    if let Some(path) = cli.routes.as_ref() {
        write_routes(path, &outcomes)?;
    }
    if let Some(path) = cli.json.as_ref() {
        write_json(path, &outcomes)?;
    }

    if outcomes.iter().all(|o| o.result.is_err()) {
        bail!("no scenario produced a plan");
    }
    Ok(())
}
