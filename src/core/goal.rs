//! Goal analysis over a finished simulation.
//!
//! The terminal values across paths are treated as normally distributed with
//! the simulated terminal mean and standard deviation. The true cross-path
//! distribution is closer to lognormal, so probabilities in the tails are an
//! approximation.

use statrs::distribution::{ContinuousCDF, Normal};

use super::error::{EngineError, Result};
use super::stats::annuity_payment;
use super::types::{InvestmentResults, PortfolioResults};

pub fn evaluate(goal: f64, results: PortfolioResults) -> Result<InvestmentResults> {
    let probability = probability_of_reaching(goal, &results)?;
    let additional_savings = additional_savings(goal, &results)?;

    Ok(InvestmentResults {
        portfolio: results,
        goal,
        probability,
        additional_savings,
    })
}

/// Probability that the terminal value exceeds `goal`.
pub fn probability_of_reaching(goal: f64, results: &PortfolioResults) -> Result<f64> {
    let final_std = results.final_std();
    if !(final_std > 0.0) {
        return Err(EngineError::Degenerate {
            context: "goal probability (terminal standard deviation is zero)",
        });
    }

    let terminal = Normal::new(results.final_mean(), final_std)
        .map_err(|e| EngineError::invalid("terminal distribution", e.to_string()))?;
    Ok(1.0 - terminal.cdf(goal))
}

/// Extra level contribution per step that closes the gap between the expected
/// terminal value and `goal`, at the portfolio's expected return. Never negative.
pub fn additional_savings(goal: f64, results: &PortfolioResults) -> Result<f64> {
    let steps = u32::try_from(results.steps())
        .map_err(|_| EngineError::invalid("steps", "too many steps for an annuity"))?;
    let shortfall = goal - results.final_mean();
    Ok(annuity_payment(shortfall, results.portfolio_return, steps)?.max(0.0))
}
