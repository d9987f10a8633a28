use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use tracing::debug;

use super::contributions::Contribution;
use super::error::{EngineError, Result};
use super::goal;
use super::stats::{SimulationParameters, mean_and_std, simulation_parameters};
use super::types::{PortfolioResults, SimulationOutcome};

const PATH_BATCH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInputs {
    pub weights: Vec<f64>,
    pub returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub steps: u32,
    pub initial_investment: f64,
    /// Annual fee as a fraction of holdings, taken out of the drift.
    pub fee: f64,
    pub num_paths: u32,
    pub goal: Option<f64>,
}

impl SimulationInputs {
    pub const DEFAULT_PATHS: u32 = 1_000;

    pub fn new(
        weights: Vec<f64>,
        returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
        steps: u32,
    ) -> Self {
        Self {
            weights,
            returns,
            covariance,
            steps,
            initial_investment: 1.0,
            fee: 0.0,
            num_paths: Self::DEFAULT_PATHS,
            goal: None,
        }
    }
}

/// Runs every path on the caller's random source, one step at a time.
pub fn simulate<R, C>(
    inputs: &SimulationInputs,
    contributions: &C,
    rng: &mut R,
) -> Result<SimulationOutcome>
where
    R: Rng + ?Sized,
    C: Contribution + ?Sized,
{
    let params = prepare(inputs)?;
    let steps = inputs.steps as usize;
    let mut row = vec![inputs.initial_investment; inputs.num_paths as usize];
    let mut simulation_mean = Vec::with_capacity(steps + 1);
    let mut simulation_std = Vec::with_capacity(steps + 1);

    simulation_mean.push(inputs.initial_investment);
    simulation_std.push(0.0);

    for step in 1..=inputs.steps {
        let contribution = contributions.amount(step);
        for value in row.iter_mut() {
            let z: f64 = StandardNormal.sample(rng);
            *value = grow(*value, params, z) + contribution;
        }

        let (mean, std) = mean_and_std(&row);
        simulation_mean.push(mean);
        simulation_std.push(std);
    }

    finish(inputs, params, simulation_mean, simulation_std)
}

/// Same model as [`simulate`], with paths split into batches on the rayon pool.
///
/// Every batch draws from its own generator seeded from `seed` and the batch
/// index, so the output depends only on `seed`, not on scheduling.
pub fn simulate_parallel<C>(
    inputs: &SimulationInputs,
    contributions: &C,
    seed: u64,
) -> Result<SimulationOutcome>
where
    C: Contribution + ?Sized,
{
    let params = prepare(inputs)?;
    let steps = inputs.steps as usize;
    let paths = inputs.num_paths as usize;
    let step_contributions: Vec<f64> = (0..=inputs.steps)
        .map(|step| if step == 0 { 0.0 } else { contributions.amount(step) })
        .collect();

    let batches: Vec<Vec<StepMoments>> = (0..paths.div_ceil(PATH_BATCH))
        .into_par_iter()
        .map(|batch| {
            let size = PATH_BATCH.min(paths - batch * PATH_BATCH);
            let mut rng = StdRng::seed_from_u64(derive_seed(seed, batch as u64));
            let mut moments = vec![StepMoments::default(); steps + 1];

            for _ in 0..size {
                let mut value = inputs.initial_investment;
                moments[0].push(value);
                for step in 1..=steps {
                    let z: f64 = StandardNormal.sample(&mut rng);
                    value = grow(value, params, z) + step_contributions[step];
                    moments[step].push(value);
                }
            }
            moments
        })
        .collect();

    // Merge in batch order so float rounding does not depend on thread count.
    let mut totals = vec![StepMoments::default(); steps + 1];
    for batch in batches {
        for (total, part) in totals.iter_mut().zip(batch) {
            total.merge(part);
        }
    }

    let simulation_mean = totals.iter().map(|m| m.mean).collect();
    let simulation_std = totals.iter().map(StepMoments::std).collect();
    finish(inputs, params, simulation_mean, simulation_std)
}

fn prepare(inputs: &SimulationInputs) -> Result<SimulationParameters> {
    if inputs.steps == 0 {
        return Err(EngineError::invalid("steps", "must be > 0"));
    }
    if inputs.num_paths == 0 {
        return Err(EngineError::invalid("num_paths", "must be > 0"));
    }

    let params = simulation_parameters(
        &inputs.weights,
        &inputs.returns,
        &inputs.covariance,
        inputs.fee,
    )?;
    debug!(
        steps = inputs.steps,
        paths = inputs.num_paths,
        drift = params.drift,
        risk = params.risk,
        "running growth simulation"
    );
    Ok(params)
}

fn finish(
    inputs: &SimulationInputs,
    params: SimulationParameters,
    simulation_mean: Vec<f64>,
    simulation_std: Vec<f64>,
) -> Result<SimulationOutcome> {
    let results = PortfolioResults {
        portfolio_return: params.annual_return(),
        portfolio_risk: params.risk,
        simulation_mean,
        simulation_std,
    };

    match inputs.goal {
        Some(target) => goal::evaluate(target, results).map(SimulationOutcome::Investment),
        None => Ok(SimulationOutcome::Portfolio(results)),
    }
}

fn grow(value: f64, params: SimulationParameters, z: f64) -> f64 {
    value * (params.step_mean() + params.risk * z).exp()
}

/// Running count, mean and sum of squared deviations for one step.
#[derive(Debug, Clone, Copy, Default)]
struct StepMoments {
    count: f64,
    mean: f64,
    m2: f64,
}

impl StepMoments {
    fn push(&mut self, value: f64) {
        self.count += 1.0;
        let delta = value - self.mean;
        self.mean += delta / self.count;
        self.m2 += delta * (value - self.mean);
    }

    fn merge(&mut self, other: StepMoments) {
        if other.count == 0.0 {
            return;
        }
        if self.count == 0.0 {
            *self = other;
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count / count;
        self.m2 += other.m2 + delta * delta * self.count * other.count / count;
        self.count = count;
    }

    fn std(&self) -> f64 {
        if self.count == 0.0 {
            0.0
        } else {
            (self.m2 / self.count).max(0.0).sqrt()
        }
    }
}

fn derive_seed(base_seed: u64, batch: u64) -> u64 {
    splitmix64(base_seed ^ batch.rotate_left(32))
}

/// SplitMix64 finalizer; constants from Steele, Lea and Flood (2014).
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
