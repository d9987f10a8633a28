use super::error::{EngineError, Result};

/// Closed-form parameters of the lognormal step distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParameters {
    /// Continuously compounded expected return.
    pub drift: f64,
    /// Annualised standard deviation of the portfolio.
    pub risk: f64,
}

impl SimulationParameters {
    /// Mean of the normal exponent for one step, `drift - risk^2 / 2`.
    pub fn step_mean(self) -> f64 {
        self.drift - 0.5 * self.risk * self.risk
    }

    /// Arithmetic annual return recovered from the log drift.
    pub fn annual_return(self) -> f64 {
        self.drift.exp() - 1.0
    }
}

pub fn portfolio_return(weights: &[f64], asset_returns: &[f64]) -> Result<f64> {
    if weights.len() != asset_returns.len() {
        return Err(EngineError::dimension_mismatch(
            "asset returns",
            weights.len(),
            asset_returns.len(),
        ));
    }

    Ok(weights
        .iter()
        .zip(asset_returns)
        .map(|(w, r)| w * r)
        .sum())
}

pub fn portfolio_risk(weights: &[f64], covariance: &[Vec<f64>]) -> Result<f64> {
    check_covariance(covariance, weights.len())?;

    let variance: f64 = covariance
        .iter()
        .zip(weights)
        .map(|(row, wi)| wi * row.iter().zip(weights).map(|(c, wj)| c * wj).sum::<f64>())
        .sum();

    // Rounding on a PSD matrix can leave a tiny negative variance.
    Ok(variance.max(0.0).sqrt())
}

/// Checks that `covariance` is an `assets` x `assets` matrix.
pub fn check_covariance(covariance: &[Vec<f64>], assets: usize) -> Result<()> {
    let rows = covariance.len();
    for (row, values) in covariance.iter().enumerate() {
        if values.len() != rows {
            return Err(EngineError::NonSquareCovariance {
                row,
                expected: rows,
                actual: values.len(),
            });
        }
    }

    if rows != assets {
        return Err(EngineError::dimension_mismatch("covariance", assets, rows));
    }

    Ok(())
}

pub fn simulation_parameters(
    weights: &[f64],
    asset_returns: &[f64],
    covariance: &[Vec<f64>],
    fee: f64,
) -> Result<SimulationParameters> {
    let gross = 1.0 + portfolio_return(weights, asset_returns)? - fee;
    if !(gross > 0.0) {
        return Err(EngineError::invalid(
            "fee",
            format!("growth factor 1 + return - fee must be > 0, got {gross}"),
        ));
    }

    Ok(SimulationParameters {
        drift: gross.ln(),
        risk: portfolio_risk(weights, covariance)?,
    })
}

/// Level payment over `periods` whose present value at `rate` is `present_value`.
///
/// `rate` must be non-zero: the ordinary annuity formula divides by it.
pub fn annuity_payment(present_value: f64, rate: f64, periods: u32) -> Result<f64> {
    Ok(present_value / annuity_factor(rate, periods)?)
}

/// Present value of `periods` level payments of `payment` discounted at `rate`.
pub fn annuity_present_value(payment: f64, rate: f64, periods: u32) -> Result<f64> {
    Ok(payment * annuity_factor(rate, periods)?)
}

fn annuity_factor(rate: f64, periods: u32) -> Result<f64> {
    if rate == 0.0 || !rate.is_finite() {
        return Err(EngineError::invalid(
            "rate",
            format!("annuity rate must be finite and non-zero, got {rate}"),
        ));
    }
    if rate <= -1.0 {
        return Err(EngineError::invalid(
            "rate",
            format!("annuity rate must be > -1, got {rate}"),
        ));
    }
    if periods == 0 {
        return Err(EngineError::invalid("periods", "annuity needs at least one period"));
    }

    let periods = i32::try_from(periods)
        .map_err(|_| EngineError::invalid("periods", format!("{periods} periods is too many")))?;
    Ok((1.0 - (1.0 + rate).powi(-periods)) / rate)
}

/// Compounding multiple after `step` periods of `rate` growth.
pub fn annual_growth(step: u32, rate: f64) -> f64 {
    match i32::try_from(step) {
        Ok(n) => (1.0 + rate).powi(n),
        Err(_) => (1.0 + rate).powf(f64::from(step)),
    }
}

/// Population mean and standard deviation. Empty input yields `(0, 0)`.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
