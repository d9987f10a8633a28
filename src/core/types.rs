use std::cmp::Ordering;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResults {
    pub portfolio_return: f64,
    pub portfolio_risk: f64,
    pub simulation_mean: Vec<f64>,
    pub simulation_std: Vec<f64>,
}

impl PortfolioResults {
    /// Number of simulated steps, excluding the initial row.
    pub fn steps(&self) -> usize {
        self.simulation_mean.len().saturating_sub(1)
    }

    pub fn final_mean(&self) -> f64 {
        self.simulation_mean.last().copied().unwrap_or(0.0)
    }

    pub fn final_std(&self) -> f64 {
        self.simulation_std.last().copied().unwrap_or(0.0)
    }

    /// One-standard-deviation band around the mean at every step.
    pub fn graph_points(&self) -> Vec<GraphPoint> {
        self.simulation_mean
            .iter()
            .zip(&self.simulation_std)
            .enumerate()
            .map(|(x, (&mean, &std))| GraphPoint {
                x,
                y: mean,
                u1: mean + std,
                l1: mean - std,
                std,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentResults {
    #[serde(flatten)]
    pub portfolio: PortfolioResults,
    pub goal: f64,
    pub probability: f64,
    pub additional_savings: f64,
}

/// What a growth simulation returns: plain results, or results evaluated
/// against a goal when one was supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SimulationOutcome {
    Portfolio(PortfolioResults),
    Investment(InvestmentResults),
}

impl SimulationOutcome {
    pub fn portfolio(&self) -> &PortfolioResults {
        match self {
            SimulationOutcome::Portfolio(results) => results,
            SimulationOutcome::Investment(results) => &results.portfolio,
        }
    }

    pub fn investment(&self) -> Option<&InvestmentResults> {
        match self {
            SimulationOutcome::Portfolio(_) => None,
            SimulationOutcome::Investment(results) => Some(results),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphPoint {
    pub x: usize,
    pub y: f64,
    pub u1: f64,
    pub l1: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResults {
    pub sharpe_ratio: f64,
    pub annual_return: f64,
    pub risk: f64,
    pub weights: Vec<f64>,
}

impl AllocationResults {
    /// Ranks candidates by Sharpe ratio alone; a higher ratio is greater.
    pub fn cmp_sharpe(&self, other: &Self) -> Ordering {
        self.sharpe_ratio.total_cmp(&other.sharpe_ratio)
    }
}
