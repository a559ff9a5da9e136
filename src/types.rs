//! Core domain types: strategy mode, inputs, metrics, curve samples and the normalized chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::EngineError;

/// Default buying power when the user has not set one.
pub const DEFAULT_CAPITAL: f64 = 50_000.0;

/// Shares per listed equity option contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Config and JSON input accept the same aliases as the command line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum Mode {
    /// Cash-secured put: short put backed by cash.
    #[serde(rename = "CSP")]
    Csp,
    /// Covered call: short call against owned shares.
    #[serde(rename = "CC")]
    CoveredCall,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Csp => write!(f, "CSP"),
            Mode::CoveredCall => write!(f, "CC"),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CSP" | "PUT" => Ok(Mode::Csp),
            "CC" | "CALL" | "COVERED_CALL" | "COVERED-CALL" => Ok(Mode::CoveredCall),
            other => Err(format!("Unknown mode: {other} (expected CSP or CC)")),
        }
    }
}

/// Snapshot handed to the valuation engine. Rebuilt on every user action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrategyInput {
    pub mode: Mode,
    pub strike: f64,
    /// Per-share mid premium.
    pub premium: f64,
    pub current_price: f64,
    /// Cost basis of the shares; equals `current_price` until one is recorded.
    pub entry_price: f64,
    pub days_to_expiration: u32,
    pub capital: f64,
}

impl StrategyInput {
    pub fn new(
        mode: Mode,
        strike: f64,
        premium: f64,
        current_price: f64,
        days_to_expiration: u32,
    ) -> Self {
        Self {
            mode,
            strike,
            premium,
            current_price,
            entry_price: current_price,
            days_to_expiration,
            capital: DEFAULT_CAPITAL,
        }
    }

    pub fn with_entry_price(mut self, entry_price: f64) -> Self {
        self.entry_price = entry_price;
        self
    }

    pub fn with_capital(mut self, capital: f64) -> Self {
        self.capital = capital;
        self
    }

    /// Fail fast on inputs the engine formulas are not defined for.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.strike.is_finite() && self.strike > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "strike must be positive, got {}",
                self.strike
            )));
        }
        if !(self.premium.is_finite() && self.premium >= 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "premium must be non-negative, got {}",
                self.premium
            )));
        }
        if !(self.current_price.is_finite() && self.current_price > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "current price must be positive, got {}",
                self.current_price
            )));
        }
        if !(self.entry_price.is_finite() && self.entry_price > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "entry price must be positive, got {}",
                self.entry_price
            )));
        }
        if self.days_to_expiration == 0 {
            return Err(EngineError::InvalidInput(
                "days to expiration must be at least 1".into(),
            ));
        }
        if !(self.capital.is_finite() && self.capital > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "capital must be positive, got {}",
                self.capital
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLabel {
    Avoid,
    Risky,
    Moderate,
    Good,
    Excellent,
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLabel::Avoid => "AVOID",
            ConfidenceLabel::Risky => "RISKY",
            ConfidenceLabel::Moderate => "MODERATE",
            ConfidenceLabel::Good => "GOOD",
            ConfidenceLabel::Excellent => "EXCELLENT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyMetrics {
    pub contracts: u64,
    pub shares: u64,
    pub total_premium: f64,
    pub annualized_roi: f64,
    pub weekly_roi: f64,
    pub monthly_roi: f64,
    /// Signed distance of strike from spot, percent.
    pub safety_buffer: f64,
    pub discount_percent: f64,
    pub break_even: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub return_on_risk: f64,
    pub confidence_label: ConfidenceLabel,
    pub confidence_score: u8,
}

/// One sample of the expiration P&L curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PnlPoint {
    pub price: f64,
    /// Dollars per contract.
    pub pnl: f64,
}

/// A single put or call row from the chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OptionQuote {
    pub strike: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
}

impl OptionQuote {
    /// Mid of bid/ask; last trade when the book is incomplete.
    pub fn mid(&self) -> f64 {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => (bid + ask) / 2.0,
            _ => self.last_price.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expiration {
    /// Unix seconds.
    pub timestamp: i64,
    pub date: DateTime<Utc>,
    pub days_to_exp: i64,
}

/// Normalized options chain for one underlying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionChain {
    pub symbol: String,
    pub current_price: f64,
    pub expirations: Vec<Expiration>,
    /// Sorted ascending by strike.
    pub puts: Vec<OptionQuote>,
    /// Sorted ascending by strike.
    pub calls: Vec<OptionQuote>,
}

impl OptionChain {
    /// Puts back a CSP, calls back a covered call.
    pub fn side(&self, mode: Mode) -> &[OptionQuote] {
        match mode {
            Mode::Csp => &self.puts,
            Mode::CoveredCall => &self.calls,
        }
    }

    pub fn strikes(&self, mode: Mode) -> Vec<f64> {
        self.side(mode).iter().map(|q| q.strike).collect()
    }

    pub fn find(&self, mode: Mode, strike: f64) -> Option<&OptionQuote> {
        self.side(mode)
            .iter()
            .find(|q| (q.strike - strike).abs() < 1e-6)
    }
}
