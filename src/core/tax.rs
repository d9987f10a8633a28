use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};

/// One band of a progressive income tax. `max` is `f64::INFINITY` for the top band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min: f64,
    #[serde(default = "unbounded")]
    pub max: f64,
    pub rate: f64,
}

fn unbounded() -> f64 {
    f64::INFINITY
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScheduledBracket {
    bracket: TaxBracket,
    ceiling_tax: f64,
}

/// Ordered progressive brackets with the tax owed on each filled band cached.
///
/// Brackets are expected to be ascending and contiguous; `validate` reports
/// schedules that are not. Evaluation does not re-check this.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxSchedule {
    brackets: Vec<ScheduledBracket>,
}

impl TaxSchedule {
    pub fn new(brackets: impl IntoIterator<Item = TaxBracket>) -> Self {
        let brackets = brackets
            .into_iter()
            .map(|bracket| ScheduledBracket {
                bracket,
                ceiling_tax: if bracket.max.is_finite() {
                    (bracket.max - bracket.min) * bracket.rate
                } else {
                    0.0
                },
            })
            .collect();
        Self { brackets }
    }

    pub fn brackets(&self) -> impl Iterator<Item = &TaxBracket> {
        self.brackets.iter().map(|b| &b.bracket)
    }

    pub fn tax_due(&self, income: f64) -> f64 {
        self.brackets
            .iter()
            .map(|b| {
                if income <= b.bracket.max {
                    ((income - b.bracket.min) * b.bracket.rate).max(0.0)
                } else {
                    b.ceiling_tax
                }
            })
            .sum()
    }

    pub fn net_income(&self, income: f64) -> f64 {
        income - self.tax_due(income)
    }

    pub fn effective_rate(&self, income: f64) -> f64 {
        if income <= 0.0 {
            return 0.0;
        }
        self.tax_due(income) / income
    }

    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.brackets.first() else {
            return Err(EngineError::invalid("tax brackets", "schedule has no brackets"));
        };
        if first.bracket.min != 0.0 {
            return Err(EngineError::invalid(
                "tax brackets",
                format!("first bracket must start at 0, starts at {}", first.bracket.min),
            ));
        }

        let last = self.brackets.len() - 1;
        for (i, b) in self.brackets.iter().enumerate() {
            let TaxBracket { min, max, rate } = b.bracket;
            if !(0.0..=1.0).contains(&rate) {
                return Err(EngineError::invalid(
                    "tax brackets",
                    format!("bracket {i} rate must be between 0 and 1, got {rate}"),
                ));
            }
            if max <= min {
                return Err(EngineError::invalid(
                    "tax brackets",
                    format!("bracket {i} max {max} must exceed min {min}"),
                ));
            }
            if !max.is_finite() && i != last {
                return Err(EngineError::invalid(
                    "tax brackets",
                    format!("only the last bracket may be unbounded, bracket {i} is"),
                ));
            }
            if let Some(next) = self.brackets.get(i + 1) {
                if next.bracket.min != max {
                    return Err(EngineError::invalid(
                        "tax brackets",
                        format!(
                            "bracket {} starts at {} but bracket {i} ends at {max}",
                            i + 1,
                            next.bracket.min
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}
