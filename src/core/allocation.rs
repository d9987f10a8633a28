use std::cmp::Ordering;

use rand::Rng;
use rand_distr::{Dirichlet, Distribution};
use tracing::debug;

use super::error::{EngineError, Result};
use super::stats::{check_covariance, simulation_parameters};
use super::types::AllocationResults;

/// Random search over long-only allocations for the best Sharpe ratio.
///
/// Candidates come from a symmetric Dirichlet(1), i.e. uniformly from the
/// simplex. The answer is approximate and sharpens with `num_samples`; ties
/// keep the earliest candidate.
pub fn optimize<R>(
    annual_returns: &[f64],
    covariance: &[Vec<f64>],
    num_samples: u32,
    risk_free_rate: f64,
    rng: &mut R,
) -> Result<AllocationResults>
where
    R: Rng + ?Sized,
{
    let assets = annual_returns.len();
    if assets == 0 {
        return Err(EngineError::invalid("annual returns", "at least one asset is required"));
    }
    if num_samples == 0 {
        return Err(EngineError::invalid("num_samples", "must be > 0"));
    }
    check_covariance(covariance, assets)?;

    let sampler = SimplexSampler::new(assets)?;
    let mut best: Option<AllocationResults> = None;
    for _ in 0..num_samples {
        let candidate = score_allocation(
            sampler.sample(rng),
            annual_returns,
            covariance,
            risk_free_rate,
        )?;
        let replace = match &best {
            Some(current) => candidate.cmp_sharpe(current) == Ordering::Greater,
            None => true,
        };
        if replace {
            best = Some(candidate);
        }
    }

    let best = best.ok_or_else(|| EngineError::invalid("num_samples", "must be > 0"))?;
    debug!(
        samples = num_samples,
        sharpe = best.sharpe_ratio,
        annual_return = best.annual_return,
        risk = best.risk,
        "allocation search finished"
    );
    Ok(best)
}

pub fn score_allocation(
    weights: Vec<f64>,
    annual_returns: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> Result<AllocationResults> {
    let params = simulation_parameters(&weights, annual_returns, covariance, 0.0)?;
    if !(params.risk > 0.0) {
        return Err(EngineError::Degenerate {
            context: "sharpe ratio (portfolio risk is zero)",
        });
    }

    let annual_return = params.annual_return();
    Ok(AllocationResults {
        sharpe_ratio: (annual_return - risk_free_rate) / params.risk,
        annual_return,
        risk: params.risk,
        weights,
    })
}

enum SimplexSampler {
    SingleAsset,
    Dirichlet(Dirichlet<f64>),
}

impl SimplexSampler {
    fn new(assets: usize) -> Result<Self> {
        if assets == 1 {
            return Ok(Self::SingleAsset);
        }
        Dirichlet::new_with_size(1.0, assets)
            .map(Self::Dirichlet)
            .map_err(|e| EngineError::invalid("dirichlet", format!("{e:?}")))
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        match self {
            Self::SingleAsset => vec![1.0],
            Self::Dirichlet(dirichlet) => dirichlet.sample(rng),
        }
    }
}
