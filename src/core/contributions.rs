use super::stats::annual_growth;
use super::tax::TaxSchedule;

/// Amount added to every path at a simulation step.
///
/// Implementations must be pure: the same step always yields the same amount,
/// and amounts are never negative.
pub trait Contribution {
    fn amount(&self, step: u32) -> f64;
}

impl<F> Contribution for F
where
    F: Fn(u32) -> f64,
{
    fn amount(&self, step: u32) -> f64 {
        self(step)
    }
}

/// Tax deducted from grown income before a contribution rate is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum IncomeTax {
    #[default]
    None,
    /// Flat share of gross income.
    EffectiveRate(f64),
    Progressive(TaxSchedule),
}

impl IncomeTax {
    pub fn tax_due(&self, income: f64) -> f64 {
        match self {
            IncomeTax::None => 0.0,
            IncomeTax::EffectiveRate(rate) => income * rate,
            IncomeTax::Progressive(schedule) => schedule.tax_due(income),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatContribution {
    pub initial: f64,
    pub growth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeContribution {
    pub income: f64,
    pub rate: f64,
    pub income_growth: f64,
    pub tax: IncomeTax,
}

/// Employer-matched scheme with a government top-up capped at a fraction of
/// the employee's own contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedContribution {
    pub income: f64,
    pub employee_rate: f64,
    pub employer_rate: f64,
    pub income_growth: f64,
    pub fixed_subsidy: f64,
    pub subsidy_match_fraction: f64,
}

impl MatchedContribution {
    pub const DEFAULT_FIXED_SUBSIDY: f64 = 521.43;
    pub const DEFAULT_SUBSIDY_MATCH_FRACTION: f64 = 0.5;

    pub fn new(income: f64, employee_rate: f64, employer_rate: f64, income_growth: f64) -> Self {
        Self {
            income,
            employee_rate,
            employer_rate,
            income_growth,
            fixed_subsidy: Self::DEFAULT_FIXED_SUBSIDY,
            subsidy_match_fraction: Self::DEFAULT_SUBSIDY_MATCH_FRACTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContributionSchedule {
    #[default]
    None,
    Flat(FlatContribution),
    IncomePercentage(IncomeContribution),
    Matched(MatchedContribution),
}

impl ContributionSchedule {
    pub fn flat(initial: f64, growth: f64) -> Self {
        Self::Flat(FlatContribution { initial, growth })
    }

    pub fn income_percentage(income: f64, rate: f64, income_growth: f64, tax: IncomeTax) -> Self {
        Self::IncomePercentage(IncomeContribution {
            income,
            rate,
            income_growth,
            tax,
        })
    }
}

impl Contribution for ContributionSchedule {
    fn amount(&self, step: u32) -> f64 {
        let amount = match self {
            ContributionSchedule::None => 0.0,
            ContributionSchedule::Flat(c) => c.initial * annual_growth(step, c.growth),
            ContributionSchedule::IncomePercentage(c) => {
                let grown = c.income * annual_growth(step, c.income_growth);
                (grown - c.tax.tax_due(grown)) * c.rate
            }
            ContributionSchedule::Matched(c) => {
                let grown = c.income * annual_growth(step, c.income_growth);
                let top_up = c
                    .fixed_subsidy
                    .min(grown * c.employee_rate * c.subsidy_match_fraction);
                grown * (c.employee_rate + c.employer_rate) + top_up
            }
        };
        amount.max(0.0)
    }
}
