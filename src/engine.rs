//! Valuation engine for cash-secured puts and covered calls.
//!
//! Everything here is a pure function of a `StrategyInput`. The engine does not
//! check preconditions itself; callers that want a fail-fast path run
//! `StrategyInput::validate` first (which `ValuationEngine::evaluate` does).

use serde::Serialize;

use crate::error::EngineError;
use crate::types::{
    ConfidenceLabel, Mode, PnlPoint, StrategyInput, StrategyMetrics, CONTRACT_MULTIPLIER,
};
use crate::utils::round2;

pub const DEFAULT_SAMPLE_COUNT: usize = 21;

/// Per-mode reference values, resolved once per evaluation.
struct ModeProfile {
    /// Price the capital at risk is measured against.
    basis: f64,
    /// Per-share gain captured if the shares are called away.
    called_away_gain: f64,
    /// Sign applied to the safety buffer before classification.
    buffer_sign: f64,
}

impl ModeProfile {
    fn of(input: &StrategyInput) -> Self {
        match input.mode {
            // Assignment buys at strike; a strike under spot is the safe side.
            Mode::Csp => Self {
                basis: input.strike,
                called_away_gain: 0.0,
                buffer_sign: -1.0,
            },
            // Shares were bought at the entry price; a strike over spot is the safe side.
            Mode::CoveredCall => Self {
                basis: input.entry_price,
                called_away_gain: (input.strike - input.entry_price).max(0.0),
                buffer_sign: 1.0,
            },
        }
    }
}

/// Metrics plus curve for one input snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub input: StrategyInput,
    pub metrics: StrategyMetrics,
    pub curve: Vec<PnlPoint>,
}

pub struct ValuationEngine {
    sample_count: usize,
}

impl ValuationEngine {
    pub fn new(sample_count: usize) -> Self {
        Self { sample_count }
    }

    pub fn evaluate(&self, input: &StrategyInput) -> Result<Evaluation, EngineError> {
        input.validate()?;
        Ok(Evaluation {
            input: *input,
            metrics: compute_metrics(input),
            curve: generate_pnl_curve(input, self.sample_count),
        })
    }
}

impl Default for ValuationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT)
    }
}

/// Premium yield on strike, scaled to a `period_days` horizon, in percent.
fn period_roi(input: &StrategyInput, period_days: f64) -> f64 {
    (input.premium / input.strike) * (period_days / input.days_to_expiration as f64) * 100.0
}

pub fn compute_metrics(input: &StrategyInput) -> StrategyMetrics {
    let profile = ModeProfile::of(input);

    let contracts = (input.capital / (input.strike * CONTRACT_MULTIPLIER))
        .floor()
        .max(0.0) as u64;
    let lots = contracts as f64 * CONTRACT_MULTIPLIER;
    let total_premium = lots * input.premium;

    let annualized_roi = period_roi(input, 365.0);
    let safety_buffer = (input.strike - input.current_price) / input.current_price * 100.0;
    let discount_percent = (input.current_price - input.strike) / input.current_price * 100.0;

    let capital_at_risk = profile.basis * lots;
    // Zero contracts leaves nothing at risk; report 0 rather than NaN.
    let return_on_risk = if contracts == 0 {
        0.0
    } else {
        total_premium / capital_at_risk * 100.0
    };

    StrategyMetrics {
        contracts,
        shares: contracts * CONTRACT_MULTIPLIER as u64,
        total_premium,
        annualized_roi,
        weekly_roi: period_roi(input, 7.0),
        monthly_roi: period_roi(input, 30.0),
        safety_buffer,
        discount_percent,
        break_even: profile.basis - input.premium,
        max_profit: profile.called_away_gain * lots + total_premium,
        max_loss: capital_at_risk - total_premium,
        return_on_risk,
        confidence_label: confidence_label(profile.buffer_sign * safety_buffer, annualized_roi),
        confidence_score: confidence_score(safety_buffer),
    }
}

/// Classify a direction-adjusted buffer. First matching rule wins.
pub fn confidence_label(effective_buffer: f64, annualized_roi: f64) -> ConfidenceLabel {
    if effective_buffer < -40.0 {
        ConfidenceLabel::Avoid
    } else if effective_buffer < -15.0 {
        ConfidenceLabel::Risky
    } else if effective_buffer < -5.0 {
        ConfidenceLabel::Moderate
    } else if effective_buffer >= 15.0 && annualized_roi > 30.0 {
        ConfidenceLabel::Excellent
    } else if effective_buffer >= 10.0 {
        ConfidenceLabel::Good
    } else {
        ConfidenceLabel::Moderate
    }
}

/// Coarse 0-100 score from the unsigned strike distance. Ignores mode and ROI.
pub fn confidence_score(safety_buffer: f64) -> u8 {
    const BANDS: [(f64, u8); 6] = [
        (50.0, 10),
        (40.0, 25),
        (30.0, 45),
        (20.0, 60),
        (10.0, 75),
        (5.0, 85),
    ];
    let distance = safety_buffer.abs();
    BANDS
        .iter()
        .find(|(floor, _)| distance >= *floor)
        .map(|(_, score)| *score)
        .unwrap_or(95)
}

/// Per-share profit at expiration for an underlying price `p`.
///
/// The covered-call branch measures against `current_price`, not the recorded
/// entry price, so the chart assumes the shares were bought at the live quote.
fn per_share_profit(input: &StrategyInput, p: f64) -> f64 {
    match input.mode {
        Mode::Csp => {
            if p >= input.strike {
                input.premium
            } else {
                input.premium - (input.strike - p)
            }
        }
        Mode::CoveredCall => {
            if p <= input.strike {
                input.premium + (p - input.current_price)
            } else {
                input.premium + (input.strike - input.current_price)
            }
        }
    }
}

/// Sample the expiration P&L over spot -30% .. +30%, `sample_count` points.
pub fn generate_pnl_curve(input: &StrategyInput, sample_count: usize) -> Vec<PnlPoint> {
    if sample_count == 0 {
        return Vec::new();
    }
    let start = (input.current_price * 0.7).floor();
    let end = (input.current_price * 1.3).ceil();
    let step = (end - start) / (sample_count.saturating_sub(1).max(1)) as f64;

    (0..sample_count)
        .map(|i| {
            let price = start + i as f64 * step;
            PnlPoint {
                price,
                pnl: round2(per_share_profit(input, price) * CONTRACT_MULTIPLIER),
            }
        })
        .collect()
}

/// Nearest strike to `target`; leftmost on ties, `target` itself when empty.
pub fn choose_closest_strike(strikes: &[f64], target: f64) -> f64 {
    let mut best: Option<f64> = None;
    for &s in strikes {
        match best {
            Some(b) if (s - target).abs() >= (b - target).abs() => {}
            _ => best = Some(s),
        }
    }
    best.unwrap_or(target)
}

/// Curve point as (% of premium collected, % of capital per contract).
pub fn pnl_percentages(point: &PnlPoint, input: &StrategyInput) -> (f64, f64) {
    let premium_per_contract = input.premium * CONTRACT_MULTIPLIER;
    let capital_per_contract = input.entry_price * CONTRACT_MULTIPLIER;
    let pct_premium = if premium_per_contract > 0.0 {
        point.pnl / premium_per_contract * 100.0
    } else {
        0.0
    };
    let pct_capital = if capital_per_contract > 0.0 {
        point.pnl / capital_per_contract * 100.0
    } else {
        0.0
    };
    (pct_premium, pct_capital)
}
