//! Grinding Circuit Simulation
//!
//! Generates synthetic grinding-circuit history, trains the cascade, and
//! exercises every optimization mode against the trained models:
//! - Single-objective (minimize product size)
//! - Pareto (product size vs. operational cost)
//! - Robust (across ore-hardness scenarios)
//! - Target-seeking (land a desired product size)
//!
//! # Usage
//! ```bash
//! ./simulate --rows 2000 --trials 300 --seed 42
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rand::prelude::*;
use rand_distr::Normal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use grindsight::{
    create_implementation_plan, CascadeModelManager, ConstraintMode, Direction, ModeDetail,
    OptimizationEngine, OptimizationResult, Pareto, Robust, SearchSettings, SingleObjective,
    TargetSeeking, TrainingTable, VariableRegistry, VariableRole, VariableSpec,
};

// ============================================================================
// Plant Constants
// ============================================================================

/// Baseline fresh feed rate (t/h)
const BASE_FEED: f64 = 120.0;
/// Baseline dilution water flow (m3/h)
const BASE_WATER: f64 = 80.0;
/// Baseline mill speed (% of critical)
const BASE_SPEED: f64 = 74.0;
/// Baseline ore hardness (kWh/t)
const BASE_HARDNESS: f64 = 14.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "grindsight-simulate")]
#[command(about = "Synthetic grinding-circuit run for the cascade engine")]
#[command(version)]
struct Args {
    /// Historical rows to synthesize for training
    #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u32).range(200..=1_000_000))]
    rows: u32,

    /// Trial budget per optimization run
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u32).range(1..=100_000))]
    trials: u32,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Desired product size for the target-seeking run (um)
    #[arg(long, default_value = "180.0")]
    desired_size: f64,
}

// ============================================================================
// Synthetic Plant
// ============================================================================

fn registry() -> Result<Arc<VariableRegistry>> {
    let spec = |id: &str, role, lo, hi, unit: &str| VariableSpec {
        id: id.to_string(),
        role,
        lower_bound: lo,
        upper_bound: hi,
        unit: unit.to_string(),
    };
    let registry = VariableRegistry::new(vec![
        spec("feed_rate", VariableRole::Mv, 80.0, 160.0, "t/h"),
        spec("water_flow", VariableRole::Mv, 40.0, 120.0, "m3/h"),
        spec("mill_speed", VariableRole::Mv, 65.0, 82.0, "%crit"),
        spec("mill_power", VariableRole::Cv, 2500.0, 4200.0, "kW"),
        spec("cyclone_pressure", VariableRole::Cv, 55.0, 110.0, "kPa"),
        spec("pulp_density", VariableRole::Cv, 55.0, 75.0, "%solids"),
        spec("ore_hardness", VariableRole::Dv, 8.0, 20.0, "kWh/t"),
        spec("product_size", VariableRole::Target, 50.0, 500.0, "um"),
    ])
    .context("building variable registry")?;
    Ok(Arc::new(registry))
}

/// Plant physics, linearized around the baseline with measurement noise.
/// Power rises with feed, speed, and hardness; pressure with water; density
/// with feed over water. Product size coarsens with feed and hardness and
/// fines with power.
fn synthesize(rows: usize, seed: u64) -> Result<TrainingTable> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).context("building noise distribution")?;

    let mut feed = Vec::with_capacity(rows);
    let mut water = Vec::with_capacity(rows);
    let mut speed = Vec::with_capacity(rows);
    let mut hardness = Vec::with_capacity(rows);
    let mut power = Vec::with_capacity(rows);
    let mut pressure = Vec::with_capacity(rows);
    let mut density = Vec::with_capacity(rows);
    let mut size = Vec::with_capacity(rows);

    for _ in 0..rows {
        let f = BASE_FEED + rng.gen_range(-30.0..30.0);
        let w = BASE_WATER + rng.gen_range(-30.0..30.0);
        let s = BASE_SPEED + rng.gen_range(-7.0..7.0);
        let h = BASE_HARDNESS + rng.gen_range(-4.0..4.0);

        let p = 1200.0 + 12.0 * f + 14.0 * s + 25.0 * h + 20.0 * noise.sample(&mut rng);
        let cp = 20.0 + 0.55 * w + 0.12 * f + 1.5 * noise.sample(&mut rng);
        let pd = 35.0 + 0.30 * f - 0.18 * w + 0.5 * noise.sample(&mut rng);
        let ps =
            120.0 + 1.6 * f + 9.0 * h - 0.045 * p + 0.8 * pd + 3.0 * noise.sample(&mut rng);

        feed.push(f);
        water.push(w);
        speed.push(s);
        hardness.push(h);
        power.push(p);
        pressure.push(cp);
        density.push(pd);
        size.push(ps);
    }

    let mut cols = BTreeMap::new();
    cols.insert("feed_rate".to_string(), feed);
    cols.insert("water_flow".to_string(), water);
    cols.insert("mill_speed".to_string(), speed);
    cols.insert("ore_hardness".to_string(), hardness);
    cols.insert("mill_power".to_string(), power);
    cols.insert("cyclone_pressure".to_string(), pressure);
    cols.insert("pulp_density".to_string(), density);
    cols.insert("product_size".to_string(), size);
    TrainingTable::new(cols).context("assembling training table")
}

// ============================================================================
// Reporting
// ============================================================================

fn print_result(label: &str, result: &OptimizationResult) {
    println!("\n=== {label} ===");
    println!(
        "  trials: {} ({} feasible), {:.2}s{}",
        result.trial_count,
        result.feasible_trial_count,
        result.elapsed_secs,
        if result.timed_out { ", TIMED OUT" } else { "" },
    );
    for (id, v) in &result.best_mv {
        println!("  {id:<18} = {v:.2}");
    }
    println!(
        "  predicted target   = {:.2} (feasible: {})",
        result.best_prediction.predicted_target, result.feasible
    );
    match &result.detail {
        ModeDetail::SingleObjective { direction } => {
            println!("  direction: {direction}");
        }
        ModeDetail::Pareto { front } => {
            println!("  Pareto front ({} points):", front.len());
            for p in front.iter().take(5) {
                println!(
                    "    size {:.1} um @ cost {:.1}",
                    p.predicted_target, p.operational_cost
                );
            }
        }
        ModeDetail::Robust { summary } => {
            println!(
                "  scenarios: {}  mean {:.1}  worst {:.1}  feasible {:.0}%",
                summary.scenario_count,
                summary.mean_target,
                summary.worst_target,
                summary.feasible_fraction * 100.0
            );
        }
        ModeDetail::TargetSeeking { analysis } => {
            println!(
                "  desired {:.1} um, {} trials in band{}",
                analysis.desired_target,
                analysis.successful_trial_count,
                if analysis.relaxed {
                    " (RELAXED — band never hit)"
                } else {
                    ""
                }
            );
            for (id, d) in &analysis.mv_distributions {
                println!(
                    "    {id:<16} median {:.2}  band [{:.2}, {:.2}]",
                    d.median,
                    d.percentiles.values().next().copied().unwrap_or(d.min),
                    d.percentiles.values().last().copied().unwrap_or(d.max),
                );
            }
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = grindsight::PlantConfig::load();
    for warning in config.validate() {
        tracing::warn!(warning, "Plant config validation");
    }
    grindsight::config::init(config);

    let registry = registry()?;
    let table = synthesize(args.rows as usize, args.seed)?;
    info!(rows = table.len(), "Synthesized plant history");

    let manager = Arc::new(CascadeModelManager::new(Arc::clone(&registry)));
    let report = manager.train(&table, 0.2)?;
    println!("=== Training ===");
    for (cv, fit) in &report.process_reports {
        println!("  {cv:<18} r2 {:.3}  rmse {:.2}", fit.r_squared, fit.rmse);
    }
    println!(
        "  {:<18} r2 {:.3}  rmse {:.2}",
        registry.target_id(),
        report.quality_report.r_squared,
        report.quality_report.rmse
    );

    let engine = OptimizationEngine::new(Arc::clone(&manager));
    let dvs = BTreeMap::from([("ore_hardness".to_string(), BASE_HARDNESS)]);
    let settings = SearchSettings {
        n_trials: args.trials as usize,
        timeout: None,
        seed: Some(args.seed),
        constraint_mode: ConstraintMode::Hard,
    };

    let single = engine.optimize(
        &SingleObjective {
            direction: Direction::Minimize,
        },
        &dvs,
        &settings,
    )?;
    print_result("Single objective: minimize product size", &single);

    let pareto = engine.optimize(
        &Pareto {
            direction: Direction::Minimize,
            cost_weights: BTreeMap::from([
                ("feed_rate".to_string(), -1.0), // throughput is revenue
                ("water_flow".to_string(), 0.3),
                ("mill_speed".to_string(), 2.0),
            ]),
        },
        &dvs,
        &settings,
    )?;
    print_result("Pareto: product size vs. operating cost", &pareto);

    let scenarios: Vec<BTreeMap<String, f64>> = [10.0, 12.0, 14.0, 16.0, 18.0]
        .iter()
        .map(|&h| BTreeMap::from([("ore_hardness".to_string(), h)]))
        .collect();
    let robust = engine.optimize(
        &Robust {
            direction: Direction::Minimize,
            scenarios,
            feasibility_threshold: None,
        },
        &dvs,
        &settings,
    )?;
    print_result("Robust: across ore hardness scenarios", &robust);

    let seeking = engine.optimize(
        &TargetSeeking {
            desired_target: args.desired_size,
            tolerance_fraction: 0.02,
        },
        &dvs,
        &settings,
    )?;
    print_result("Target seeking: land the desired product size", &seeking);

    // Staged rollout from the baseline operating point to the best setting.
    let current = BTreeMap::from([
        ("feed_rate".to_string(), BASE_FEED),
        ("water_flow".to_string(), BASE_WATER),
        ("mill_speed".to_string(), BASE_SPEED),
    ]);
    let plan = create_implementation_plan(&current, &single.best_mv, 4)?;
    println!("\n=== Rollout plan (single-objective best) ===");
    for stage in &plan {
        let setting: Vec<String> = stage
            .mv_values
            .iter()
            .map(|(id, v)| format!("{id}={v:.1}"))
            .collect();
        println!("  step {} ({:>3.0}%): {}", stage.step, stage.percent, setting.join("  "));
    }

    Ok(())
}
