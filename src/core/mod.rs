mod allocation;
mod contributions;
mod engine;
mod error;
mod goal;
mod stats;
mod tax;
mod types;

pub use allocation::{optimize, score_allocation};
pub use contributions::{
    Contribution, ContributionSchedule, FlatContribution, IncomeContribution, IncomeTax,
    MatchedContribution,
};
pub use engine::{SimulationInputs, simulate, simulate_parallel};
pub use error::{EngineError, Result};
pub use goal::{additional_savings, evaluate, probability_of_reaching};
pub use stats::{
    SimulationParameters, annual_growth, annuity_payment, annuity_present_value, check_covariance,
    mean_and_std, portfolio_return, portfolio_risk, simulation_parameters,
};
pub use tax::{TaxBracket, TaxSchedule};
pub use types::{
    AllocationResults, GraphPoint, InvestmentResults, PortfolioResults, SimulationOutcome,
};
