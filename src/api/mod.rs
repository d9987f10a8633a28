use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{
    AllocationResults, ContributionSchedule, GraphPoint, IncomeTax, MatchedContribution,
    SimulationInputs, SimulationOutcome, TaxBracket, TaxSchedule, check_covariance, optimize,
    simulate, simulate_parallel,
};

const DEFAULT_SEED: u64 = 42;
const DEFAULT_SAMPLES: u32 = 1_000;
const DEFAULT_RISK_FREE_RATE: f64 = 0.01;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Monte Carlo portfolio growth, goal probability and allocation search"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
    #[arg(
        long,
        global = true,
        default_value_t = 100_000,
        help = "Largest number of simulated paths a request may ask for"
    )]
    max_paths: u32,
    #[arg(
        long,
        global = true,
        default_value_t = 200,
        help = "Largest number of simulated steps a request may ask for"
    )]
    max_steps: u32,
    #[arg(
        long,
        global = true,
        default_value_t = 100_000,
        help = "Largest number of candidate allocations a request may ask for"
    )]
    max_samples: u32,
    #[arg(long, global = true, help = "Pretty-print the JSON output")]
    pretty: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Project portfolio value over time from a JSON request file
    Simulate {
        #[arg(long)]
        request: PathBuf,
        #[arg(long, help = "Overrides the seed in the request file")]
        seed: Option<u64>,
        #[arg(long, help = "Spread paths over the rayon thread pool")]
        parallel: bool,
    },
    /// Search for the allocation with the best Sharpe ratio
    Optimize {
        #[arg(long)]
        request: PathBuf,
        #[arg(long, help = "Overrides the seed in the request file")]
        seed: Option<u64>,
    },
    /// Progressive income tax for one income under a bracket file
    Tax {
        #[arg(long, help = "JSON array of {min, max, rate} brackets; omit max on the top one")]
        brackets: PathBuf,
        #[arg(long)]
        income: f64,
    },
}

#[derive(Copy, Clone, Debug)]
struct Limits {
    max_paths: u32,
    max_steps: u32,
    max_samples: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_paths: 100_000,
            max_steps: 200,
            max_samples: 100_000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    holdings: Option<Vec<HoldingPayload>>,
    weights: Option<Vec<f64>>,
    returns: Option<Vec<f64>>,
    covariance: Option<Vec<Vec<f64>>>,
    steps: Option<u32>,
    initial_investment: Option<f64>,
    fee: Option<f64>,
    paths: Option<u32>,
    goal: Option<f64>,
    seed: Option<u64>,
    contributions: Option<ContributionPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingPayload {
    asset_class: String,
    weighting: f64,
    annual_return: f64,
    #[serde(default)]
    fee: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum ContributionPayload {
    None,
    Flat {
        amount: f64,
        #[serde(default)]
        growth: f64,
    },
    #[serde(rename_all = "camelCase")]
    IncomePercentage {
        income: f64,
        rate: f64,
        #[serde(default)]
        income_growth: f64,
        #[serde(default)]
        tax: TaxPayload,
    },
    #[serde(rename_all = "camelCase")]
    Matched {
        income: f64,
        employee_rate: f64,
        employer_rate: f64,
        #[serde(default)]
        income_growth: f64,
        fixed_subsidy: Option<f64>,
        subsidy_match_fraction: Option<f64>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum TaxPayload {
    #[default]
    None,
    EffectiveRate {
        rate: f64,
    },
    Brackets {
        brackets: Vec<TaxBracket>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptimizePayload {
    returns: Option<Vec<f64>>,
    covariance: Option<Vec<Vec<f64>>>,
    samples: Option<u32>,
    risk_free_rate: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug)]
struct SimulateRequest {
    inputs: SimulationInputs,
    contributions: ContributionSchedule,
    seed: u64,
}

#[derive(Debug)]
struct OptimizeRequest {
    returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    samples: u32,
    risk_free_rate: f64,
    seed: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    seed: u64,
    paths: u32,
    steps: u32,
    fee: f64,
    portfolio_return: f64,
    portfolio_risk: f64,
    simulation_mean: Vec<f64>,
    simulation_std: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    goal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_savings: Option<f64>,
    graph_points: Vec<GraphPoint>,
    x_max: u32,
    y_max: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeResponse {
    seed: u64,
    samples: u32,
    risk_free_rate: f64,
    #[serde(flatten)]
    allocation: AllocationResults,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaxResponse {
    income: f64,
    tax: f64,
    net_income: f64,
    effective_rate: f64,
}

/// Executes one command and returns the JSON document to print.
pub fn run(cli: Cli) -> Result<String, String> {
    let limits = Limits {
        max_paths: cli.max_paths,
        max_steps: cli.max_steps,
        max_samples: cli.max_samples,
    };

    match cli.command {
        Command::Simulate {
            request,
            seed,
            parallel,
        } => {
            let payload: SimulatePayload = read_json(&request)?;
            let request = build_simulate_request(payload, seed, limits)?;
            let response = execute_simulation(&request, parallel)?;
            to_json(&response, cli.pretty)
        }
        Command::Optimize { request, seed } => {
            let payload: OptimizePayload = read_json(&request)?;
            let request = build_optimize_request(payload, seed, limits)?;
            let response = execute_optimization(&request)?;
            to_json(&response, cli.pretty)
        }
        Command::Tax { brackets, income } => {
            let brackets: Vec<TaxBracket> = read_json(&brackets)?;
            let response = tax_report(brackets, income)?;
            to_json(&response, cli.pretty)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in {}: {e}", path.display()))
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, String> {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    result.map_err(|e| format!("Cannot serialize response: {e}"))
}

fn build_simulate_request(
    payload: SimulatePayload,
    seed_override: Option<u64>,
    limits: Limits,
) -> Result<SimulateRequest, String> {
    let (weights, returns, fee) = match (payload.holdings, payload.weights, payload.returns) {
        (Some(holdings), None, None) => {
            if payload.fee.is_some() {
                return Err(
                    "fee cannot be combined with holdings; set a fee per holding".to_string(),
                );
            }
            aggregate_holdings(&holdings)?
        }
        (None, Some(weights), Some(returns)) => (weights, returns, payload.fee.unwrap_or(0.0)),
        (Some(_), _, _) => {
            return Err("holdings cannot be combined with weights or returns".to_string());
        }
        _ => return Err("either holdings or both weights and returns are required".to_string()),
    };

    let covariance = payload
        .covariance
        .ok_or_else(|| "covariance is required".to_string())?;
    validate_assets(&weights, &returns, &covariance)?;
    validate_weights(&weights)?;

    if !fee.is_finite() || !(0.0..1.0).contains(&fee) {
        return Err("fee must be >= 0 and < 1".to_string());
    }

    let steps = payload.steps.ok_or_else(|| "steps is required".to_string())?;
    if steps == 0 {
        return Err("steps must be > 0".to_string());
    }
    if steps > limits.max_steps {
        return Err(format!("steps must be <= {}", limits.max_steps));
    }

    let num_paths = payload.paths.unwrap_or(SimulationInputs::DEFAULT_PATHS);
    if num_paths == 0 {
        return Err("paths must be > 0".to_string());
    }
    if num_paths > limits.max_paths {
        return Err(format!("paths must be <= {}", limits.max_paths));
    }

    let initial_investment = payload.initial_investment.unwrap_or(1.0);
    if !initial_investment.is_finite() || initial_investment < 0.0 {
        return Err("initialInvestment must be >= 0".to_string());
    }

    if let Some(goal) = payload.goal {
        if !goal.is_finite() || goal <= 0.0 {
            return Err("goal must be > 0".to_string());
        }
    }

    let contributions = match payload.contributions {
        Some(c) => build_contributions(c)?,
        None => ContributionSchedule::None,
    };

    Ok(SimulateRequest {
        inputs: SimulationInputs {
            weights,
            returns,
            covariance,
            steps,
            initial_investment,
            fee,
            num_paths,
            goal: payload.goal,
        },
        contributions,
        seed: seed_override.or(payload.seed).unwrap_or(DEFAULT_SEED),
    })
}

/// Per-holding weights and returns, with the portfolio fee as the weighted fee.
fn aggregate_holdings(holdings: &[HoldingPayload]) -> Result<(Vec<f64>, Vec<f64>, f64), String> {
    if holdings.is_empty() {
        return Err("holdings must not be empty".to_string());
    }

    for h in holdings {
        if !h.fee.is_finite() || !(0.0..1.0).contains(&h.fee) {
            return Err(format!("fee for {} must be >= 0 and < 1", h.asset_class));
        }
    }

    let weights = holdings.iter().map(|h| h.weighting).collect();
    let returns = holdings.iter().map(|h| h.annual_return).collect();
    let fee = holdings.iter().map(|h| h.weighting * h.fee).sum();
    Ok((weights, returns, fee))
}

fn validate_assets(
    weights: &[f64],
    returns: &[f64],
    covariance: &[Vec<f64>],
) -> Result<(), String> {
    if weights.len() != returns.len() {
        return Err(format!(
            "weights has {} entries but returns has {}",
            weights.len(),
            returns.len()
        ));
    }
    validate_returns(returns, covariance)
}

fn validate_returns(returns: &[f64], covariance: &[Vec<f64>]) -> Result<(), String> {
    if returns.is_empty() {
        return Err("at least one asset is required".to_string());
    }
    if returns.iter().any(|r| !r.is_finite() || *r <= -1.0) {
        return Err("returns must be finite and > -1".to_string());
    }
    if covariance.iter().flatten().any(|c| !c.is_finite()) {
        return Err("covariance entries must be finite".to_string());
    }
    check_covariance(covariance, returns.len()).map_err(|e| e.to_string())
}

fn validate_weights(weights: &[f64]) -> Result<(), String> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err("weights must be finite and >= 0".to_string());
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(format!("weights must sum to 1, got {total}"));
    }
    Ok(())
}

fn build_contributions(payload: ContributionPayload) -> Result<ContributionSchedule, String> {
    match payload {
        ContributionPayload::None => Ok(ContributionSchedule::None),
        ContributionPayload::Flat { amount, growth } => {
            check_non_negative("contributions.amount", amount)?;
            check_growth("contributions.growth", growth)?;
            Ok(ContributionSchedule::flat(amount, growth))
        }
        ContributionPayload::IncomePercentage {
            income,
            rate,
            income_growth,
            tax,
        } => {
            check_non_negative("contributions.income", income)?;
            check_fraction("contributions.rate", rate)?;
            check_growth("contributions.incomeGrowth", income_growth)?;
            let tax = match tax {
                TaxPayload::None => IncomeTax::None,
                TaxPayload::EffectiveRate { rate } => {
                    check_fraction("contributions.tax.rate", rate)?;
                    IncomeTax::EffectiveRate(rate)
                }
                TaxPayload::Brackets { brackets } => {
                    let schedule = TaxSchedule::new(brackets);
                    schedule.validate().map_err(|e| e.to_string())?;
                    IncomeTax::Progressive(schedule)
                }
            };
            Ok(ContributionSchedule::income_percentage(
                income,
                rate,
                income_growth,
                tax,
            ))
        }
        ContributionPayload::Matched {
            income,
            employee_rate,
            employer_rate,
            income_growth,
            fixed_subsidy,
            subsidy_match_fraction,
        } => {
            check_non_negative("contributions.income", income)?;
            check_fraction("contributions.employeeRate", employee_rate)?;
            check_fraction("contributions.employerRate", employer_rate)?;
            check_growth("contributions.incomeGrowth", income_growth)?;

            let mut scheme =
                MatchedContribution::new(income, employee_rate, employer_rate, income_growth);
            if let Some(v) = fixed_subsidy {
                check_non_negative("contributions.fixedSubsidy", v)?;
                scheme.fixed_subsidy = v;
            }
            if let Some(v) = subsidy_match_fraction {
                check_fraction("contributions.subsidyMatchFraction", v)?;
                scheme.subsidy_match_fraction = v;
            }
            Ok(ContributionSchedule::Matched(scheme))
        }
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{name} must be >= 0"));
    }
    Ok(())
}

fn check_fraction(name: &str, value: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{name} must be between 0 and 1"));
    }
    Ok(())
}

fn check_growth(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= -1.0 {
        return Err(format!("{name} must be > -1"));
    }
    Ok(())
}

fn execute_simulation(
    request: &SimulateRequest,
    parallel: bool,
) -> Result<SimulateResponse, String> {
    let inputs = &request.inputs;
    info!(
        steps = inputs.steps,
        paths = inputs.num_paths,
        parallel,
        seed = request.seed,
        "simulate request"
    );

    let outcome = if parallel {
        simulate_parallel(inputs, &request.contributions, request.seed)
    } else {
        let mut rng = StdRng::seed_from_u64(request.seed);
        simulate(inputs, &request.contributions, &mut rng)
    }
    .map_err(|e| e.to_string())?;

    Ok(build_simulate_response(request, outcome))
}

fn build_simulate_response(
    request: &SimulateRequest,
    outcome: SimulationOutcome,
) -> SimulateResponse {
    let (portfolio, goal) = match outcome {
        SimulationOutcome::Portfolio(results) => (results, None),
        SimulationOutcome::Investment(results) => (
            results.portfolio,
            Some((results.goal, results.probability, results.additional_savings)),
        ),
    };

    let graph_points = portfolio.graph_points();
    let y_max = portfolio.simulation_mean.iter().copied().fold(f64::MIN, f64::max)
        + portfolio.simulation_std.iter().copied().fold(0.0, f64::max);

    SimulateResponse {
        seed: request.seed,
        paths: request.inputs.num_paths,
        steps: request.inputs.steps,
        fee: request.inputs.fee,
        portfolio_return: portfolio.portfolio_return,
        portfolio_risk: portfolio.portfolio_risk,
        simulation_mean: portfolio.simulation_mean,
        simulation_std: portfolio.simulation_std,
        goal: goal.map(|g| g.0),
        probability: goal.map(|g| g.1),
        additional_savings: goal.map(|g| g.2),
        graph_points,
        x_max: request.inputs.steps,
        y_max,
    }
}

fn build_optimize_request(
    payload: OptimizePayload,
    seed_override: Option<u64>,
    limits: Limits,
) -> Result<OptimizeRequest, String> {
    let returns = payload.returns.ok_or_else(|| "returns is required".to_string())?;
    let covariance = payload
        .covariance
        .ok_or_else(|| "covariance is required".to_string())?;
    validate_returns(&returns, &covariance)?;

    let samples = payload.samples.unwrap_or(DEFAULT_SAMPLES);
    if samples == 0 {
        return Err("samples must be > 0".to_string());
    }
    if samples > limits.max_samples {
        return Err(format!("samples must be <= {}", limits.max_samples));
    }

    let risk_free_rate = payload.risk_free_rate.unwrap_or(DEFAULT_RISK_FREE_RATE);
    if !risk_free_rate.is_finite() {
        return Err("riskFreeRate must be finite".to_string());
    }

    Ok(OptimizeRequest {
        returns,
        covariance,
        samples,
        risk_free_rate,
        seed: seed_override.or(payload.seed).unwrap_or(DEFAULT_SEED),
    })
}

fn execute_optimization(request: &OptimizeRequest) -> Result<OptimizeResponse, String> {
    info!(
        assets = request.returns.len(),
        samples = request.samples,
        seed = request.seed,
        "optimize request"
    );

    let mut rng = StdRng::seed_from_u64(request.seed);
    let allocation = optimize(
        &request.returns,
        &request.covariance,
        request.samples,
        request.risk_free_rate,
        &mut rng,
    )
    .map_err(|e| e.to_string())?;

    Ok(OptimizeResponse {
        seed: request.seed,
        samples: request.samples,
        risk_free_rate: request.risk_free_rate,
        allocation,
    })
}

fn tax_report(brackets: Vec<TaxBracket>, income: f64) -> Result<TaxResponse, String> {
    if !income.is_finite() || income < 0.0 {
        return Err("--income must be >= 0".to_string());
    }

    let schedule = TaxSchedule::new(brackets);
    schedule.validate().map_err(|e| e.to_string())?;

    Ok(TaxResponse {
        income,
        tax: schedule.tax_due(income),
        net_income: schedule.net_income(income),
        effective_rate: schedule.effective_rate(income),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn simulate_request_from_json(json: &str) -> Result<SimulateRequest, String> {
        let payload = serde_json::from_str::<SimulatePayload>(json)
            .map_err(|e| format!("Invalid request JSON: {e}"))?;
        build_simulate_request(payload, None, Limits::default())
    }

    const TWO_ASSET_REQUEST: &str = r#"{
        "weights": [0.5, 0.5],
        "returns": [0.1, 0.1],
        "covariance": [[1.0, 0.0], [0.0, 1.0]],
        "steps": 10,
        "paths": 200
    }"#;

    #[test]
    fn simulate_request_applies_defaults() {
        let request = simulate_request_from_json(TWO_ASSET_REQUEST).expect("valid request");
        assert_eq!(request.seed, DEFAULT_SEED);
        assert_eq!(request.inputs.initial_investment, 1.0);
        assert_eq!(request.inputs.fee, 0.0);
        assert_eq!(request.inputs.num_paths, 200);
        assert_eq!(request.inputs.goal, None);
        assert_eq!(request.contributions, ContributionSchedule::None);
    }

    #[test]
    fn holdings_become_vectors_and_weighted_fee() {
        let request = simulate_request_from_json(
            r#"{
                "holdings": [
                    {"assetClass": "global_equity", "weighting": 0.6,
                     "annualReturn": 0.078, "fee": 0.005},
                    {"assetClass": "nz_debt", "weighting": 0.4, "annualReturn": 0.051, "fee": 0.002}
                ],
                "covariance": [[0.02, 0.001], [0.001, 0.005]],
                "steps": 5
            }"#,
        )
        .expect("valid request");

        assert_eq!(request.inputs.weights, vec![0.6, 0.4]);
        assert_eq!(request.inputs.returns, vec![0.078, 0.051]);
        assert_approx(request.inputs.fee, 0.6 * 0.005 + 0.4 * 0.002);
        assert_eq!(request.inputs.num_paths, SimulationInputs::DEFAULT_PATHS);
    }

    #[test]
    fn holdings_reject_request_level_fee() {
        let err = simulate_request_from_json(
            r#"{
                "holdings": [{"assetClass": "cash", "weighting": 1.0, "annualReturn": 0.037}],
                "covariance": [[0.0001]],
                "steps": 5,
                "fee": 0.01
            }"#,
        )
        .expect_err("must reject");
        assert!(err.contains("fee cannot be combined"));
    }

    #[test]
    fn simulate_request_rejects_misaligned_covariance() {
        let err = simulate_request_from_json(
            r#"{"weights": [0.5, 0.5], "returns": [0.1, 0.1], "covariance": [[1.0]], "steps": 3}"#,
        )
        .expect_err("must reject");
        assert!(err.contains("dimension mismatch"), "{err}");
    }

    #[test]
    fn simulate_request_rejects_weights_not_summing_to_one() {
        let err = simulate_request_from_json(
            r#"{"weights": [0.5, 0.2], "returns": [0.1, 0.1],
                "covariance": [[1.0, 0.0], [0.0, 1.0]], "steps": 3}"#,
        )
        .expect_err("must reject");
        assert!(err.contains("weights must sum to 1"));
    }

    #[test]
    fn simulate_request_caps_steps_and_paths() {
        let payload = serde_json::from_str::<SimulatePayload>(TWO_ASSET_REQUEST).expect("json");
        let limits = Limits {
            max_paths: 100,
            ..Limits::default()
        };
        let err = build_simulate_request(payload, None, limits).expect_err("too many paths");
        assert_eq!(err, "paths must be <= 100");

        let payload = serde_json::from_str::<SimulatePayload>(TWO_ASSET_REQUEST).expect("json");
        let limits = Limits {
            max_steps: 5,
            ..Limits::default()
        };
        let err = build_simulate_request(payload, None, limits).expect_err("too many steps");
        assert_eq!(err, "steps must be <= 5");
    }

    #[test]
    fn seed_flag_overrides_request_seed() {
        let payload = serde_json::from_str::<SimulatePayload>(
            r#"{"weights": [1.0], "returns": [0.05], "covariance": [[0.01]],
                "steps": 2, "seed": 7}"#,
        )
        .expect("json");
        let request = build_simulate_request(payload, Some(9), Limits::default()).expect("valid");
        assert_eq!(request.seed, 9);
    }

    #[test]
    fn contribution_payloads_map_to_schedules() {
        let request = simulate_request_from_json(
            r#"{
                "weights": [1.0], "returns": [0.05], "covariance": [[0.01]], "steps": 2,
                "contributions": {
                    "kind": "incomePercentage", "income": 45000, "rate": 0.1, "incomeGrowth": 0.02,
                    "tax": {"kind": "brackets", "brackets": [
                        {"min": 0, "max": 14000, "rate": 0.105},
                        {"min": 14000, "max": 48000, "rate": 0.175},
                        {"min": 48000, "rate": 0.30}
                    ]}
                }
            }"#,
        )
        .expect("valid request");
        let ContributionSchedule::IncomePercentage(c) = &request.contributions else {
            panic!("expected income contribution, got {:?}", request.contributions);
        };
        assert_approx(c.tax.tax_due(45_000.0), 6_895.0);

        let request = simulate_request_from_json(
            r#"{
                "weights": [1.0], "returns": [0.05], "covariance": [[0.01]], "steps": 2,
                "contributions": {"kind": "matched", "income": 60000,
                                  "employeeRate": 0.03, "employerRate": 0.03}
            }"#,
        )
        .expect("valid request");
        let ContributionSchedule::Matched(m) = &request.contributions else {
            panic!("expected matched contribution");
        };
        assert_eq!(m.fixed_subsidy, MatchedContribution::DEFAULT_FIXED_SUBSIDY);
    }

    #[test]
    fn contribution_payload_rejects_non_contiguous_brackets() {
        let err = simulate_request_from_json(
            r#"{
                "weights": [1.0], "returns": [0.05], "covariance": [[0.01]], "steps": 2,
                "contributions": {
                    "kind": "incomePercentage", "income": 45000, "rate": 0.1,
                    "tax": {"kind": "brackets", "brackets": [
                        {"min": 0, "max": 10000, "rate": 0.1},
                        {"min": 20000, "rate": 0.3}
                    ]}
                }
            }"#,
        )
        .expect_err("gap must be rejected");
        assert!(err.contains("tax brackets"), "{err}");
    }

    #[test]
    fn simulate_response_carries_graph_band_and_goal_fields() {
        let mut request = simulate_request_from_json(TWO_ASSET_REQUEST).expect("valid request");
        request.inputs.goal = Some(0.5);
        let response = execute_simulation(&request, false).expect("simulation runs");

        assert_eq!(response.graph_points.len(), 11);
        assert_eq!(response.x_max, 10);
        let point = response.graph_points[3];
        assert_approx(point.u1, response.simulation_mean[3] + response.simulation_std[3]);
        assert_approx(point.l1, response.simulation_mean[3] - response.simulation_std[3]);
        let max_mean = response.simulation_mean.iter().copied().fold(f64::MIN, f64::max);
        assert!(response.y_max >= max_mean);

        let json = serde_json::to_value(&response).expect("response should serialize");
        assert_eq!(json["goal"], 0.5);
        assert!(json["probability"].is_number());
        assert!(json["additionalSavings"].is_number());
        assert!(json["graphPoints"][0]["u1"].is_number());
    }

    #[test]
    fn simulate_response_omits_goal_fields_without_goal() {
        let request = simulate_request_from_json(TWO_ASSET_REQUEST).expect("valid request");
        let response = execute_simulation(&request, true).expect("simulation runs");
        let json = serde_json::to_value(&response).expect("response should serialize");
        assert!(json.get("probability").is_none());
        assert_eq!(json["simulationMean"].as_array().map(Vec::len), Some(11));
    }

    #[test]
    fn optimize_request_defaults_and_response_shape() {
        let payload = serde_json::from_str::<OptimizePayload>(
            r#"{"returns": [0.1, 0.1], "covariance": [[0.001, 0.0], [0.0, 0.001]], "samples": 10}"#,
        )
        .expect("json");
        let request = build_optimize_request(payload, None, Limits::default()).expect("valid");
        assert_eq!(request.risk_free_rate, DEFAULT_RISK_FREE_RATE);

        let response = execute_optimization(&request).expect("optimization runs");
        assert!((response.allocation.annual_return - 0.1).abs() <= 0.01);

        let json = serde_json::to_value(&response).expect("response should serialize");
        assert!(json["sharpeRatio"].is_number());
        assert_eq!(json["weights"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn optimize_request_rejects_missing_covariance() {
        let payload =
            serde_json::from_str::<OptimizePayload>(r#"{"returns": [0.1]}"#).expect("json");
        let err =
            build_optimize_request(payload, None, Limits::default()).expect_err("must reject");
        assert_eq!(err, "covariance is required");
    }

    #[test]
    fn tax_report_for_nz_brackets() {
        let brackets: Vec<TaxBracket> = serde_json::from_str(
            r#"[
                {"min": 0, "max": 14000, "rate": 0.105},
                {"min": 14000, "max": 48000, "rate": 0.175},
                {"min": 48000, "max": 70000, "rate": 0.30},
                {"min": 70000, "max": 180000, "rate": 0.33},
                {"min": 180000, "rate": 0.39}
            ]"#,
        )
        .expect("json");
        let report = tax_report(brackets, 100_000.0).expect("valid");
        assert_approx(report.tax, 23_920.0);
        assert_approx(report.net_income, 76_080.0);
        assert_approx(report.effective_rate, 0.2392);
    }

    #[test]
    fn cli_parses_global_limits_after_subcommand() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "simulate",
            "--request",
            "req.json",
            "--max-paths",
            "500",
            "--parallel",
        ])
        .expect("valid args");
        assert_eq!(cli.max_paths, 500);
        assert!(matches!(
            cli.command,
            Command::Simulate { parallel: true, seed: None, .. }
        ));
    }

    #[test]
    fn run_reports_unreadable_request_file() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "optimize",
            "--request",
            "/definitely/not/here.json",
        ])
        .expect("valid args");
        let err = run(cli).expect_err("missing file");
        assert!(err.starts_with("Cannot read /definitely/not/here.json"));
    }
}
