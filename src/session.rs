//! Position session: the chain plus the user's selections, as an immutable snapshot.
//!
//! Every action consumes the current `Session` and returns a new one, so the
//! `StrategyInput` handed to the engine is always derived from one consistent
//! set of values.

use tracing::{debug, info};

use crate::engine::{choose_closest_strike, Evaluation, ValuationEngine};
use crate::error::{ChainError, EngineError};
use crate::types::{Expiration, Mode, OptionChain, StrategyInput};
use crate::utils::snap_capital;

#[derive(Debug, Clone)]
pub struct Session {
    chain: OptionChain,
    mode: Mode,
    strike: f64,
    premium: f64,
    expiration: Option<i64>,
    days: i64,
    capital: f64,
    /// Recorded cost basis; `None` means "use the live quote".
    entry_price: Option<f64>,
    min_days: i64,
}

/// Strike and mid premium for `mode`, keeping `hint` when it is listed.
fn pick_strike(chain: &OptionChain, mode: Mode, hint: Option<f64>) -> Result<(f64, f64), ChainError> {
    if chain.side(mode).is_empty() {
        return Err(ChainError::NoOptions(chain.symbol.clone()));
    }
    if let Some(q) = hint.and_then(|s| chain.find(mode, s)) {
        return Ok((q.strike, q.mid()));
    }
    let strike = choose_closest_strike(&chain.strikes(mode), chain.current_price);
    let premium = chain.find(mode, strike).map(|q| q.mid()).unwrap_or(0.0);
    Ok((strike, premium))
}

/// First expiration at least `min_days` out, else the nearest one.
fn default_expiration(expirations: &[Expiration], min_days: i64) -> Option<&Expiration> {
    expirations
        .iter()
        .find(|e| e.days_to_exp >= min_days)
        .or_else(|| expirations.first())
}

impl Session {
    pub fn open(chain: OptionChain, mode: Mode, capital: f64, min_days: i64) -> Result<Self, ChainError> {
        let (strike, premium) = pick_strike(&chain, mode, None)?;
        let (expiration, days) = match default_expiration(&chain.expirations, min_days) {
            Some(e) => (Some(e.timestamp), e.days_to_exp),
            None => (None, min_days),
        };
        info!(
            "Session {} {}: strike={} premium={:.2} days={}",
            chain.symbol, mode, strike, premium, days
        );
        Ok(Self {
            chain,
            mode,
            strike,
            premium,
            expiration,
            days,
            capital: snap_capital(capital),
            entry_price: None,
            min_days,
        })
    }

    /// Switch strategy without refetching; the strike survives if the other side lists it.
    pub fn with_mode(self, mode: Mode) -> Result<Self, ChainError> {
        let (strike, premium) = pick_strike(&self.chain, mode, Some(self.strike))?;
        debug!("Mode {} -> {}: strike {} -> {}", self.mode, mode, self.strike, strike);
        Ok(Self {
            mode,
            strike,
            premium,
            ..self
        })
    }

    pub fn with_strike(self, strike: f64) -> Result<Self, EngineError> {
        let quote = self.chain.find(self.mode, strike).copied().ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "strike {} is not listed for {} {}",
                strike, self.chain.symbol, self.mode
            ))
        })?;
        Ok(Self {
            strike: quote.strike,
            premium: quote.mid(),
            ..self
        })
    }

    pub fn with_expiration(self, timestamp: i64) -> Result<Self, EngineError> {
        let days = self
            .chain
            .expirations
            .iter()
            .find(|e| e.timestamp == timestamp)
            .map(|e| e.days_to_exp)
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "expiration {} is not listed for {}",
                    timestamp, self.chain.symbol
                ))
            })?;
        Ok(Self {
            expiration: Some(timestamp),
            days,
            ..self
        })
    }

    pub fn with_capital(self, capital: f64) -> Self {
        Self {
            capital: snap_capital(capital),
            ..self
        }
    }

    /// Record what the shares actually cost.
    pub fn with_entry_price(self, price: f64) -> Result<Self, EngineError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "entry price must be positive, got {price}"
            )));
        }
        Ok(Self {
            entry_price: Some(price),
            ..self
        })
    }

    /// Apply a fresh quote. Same symbol keeps selections that are still listed
    /// and the recorded entry price; a new symbol starts over.
    pub fn refresh(self, chain: OptionChain) -> Result<Self, ChainError> {
        if chain.symbol != self.chain.symbol {
            info!("Symbol changed {} -> {}", self.chain.symbol, chain.symbol);
            return Session::open(chain, self.mode, self.capital, self.min_days);
        }

        let (strike, premium) = pick_strike(&chain, self.mode, Some(self.strike))?;
        let listed = self
            .expiration
            .and_then(|ts| chain.expirations.iter().find(|e| e.timestamp == ts));
        let (expiration, days) = match listed.or_else(|| default_expiration(&chain.expirations, self.min_days)) {
            Some(e) => (Some(e.timestamp), e.days_to_exp),
            None => (None, self.days),
        };
        Ok(Self {
            chain,
            strike,
            premium,
            expiration,
            days,
            ..self
        })
    }

    pub fn chain(&self) -> &OptionChain {
        &self.chain
    }

    pub fn expiration(&self) -> Option<&Expiration> {
        self.expiration
            .and_then(|ts| self.chain.expirations.iter().find(|e| e.timestamp == ts))
    }

    pub fn input(&self) -> StrategyInput {
        // A same-day expiry counts as one day.
        let days = self.days.clamp(1, u32::MAX as i64) as u32;
        StrategyInput::new(self.mode, self.strike, self.premium, self.chain.current_price, days)
            .with_entry_price(self.entry_price.unwrap_or(self.chain.current_price))
            .with_capital(self.capital)
    }

    pub fn evaluate(&self, engine: &ValuationEngine) -> Result<Evaluation, EngineError> {
        engine.evaluate(&self.input())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceLabel, OptionQuote};
    use chrono::{TimeZone, Utc};

    fn quote(strike: f64, bid: f64, ask: f64) -> OptionQuote {
        OptionQuote {
            strike,
            bid: Some(bid),
            ask: Some(ask),
            last_price: None,
        }
    }

    fn exp(days: i64) -> Expiration {
        let date = Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap() + chrono::Duration::days(days);
        Expiration {
            timestamp: date.timestamp(),
            date,
            days_to_exp: days,
        }
    }

    fn chain(symbol: &str, price: f64) -> OptionChain {
        OptionChain {
            symbol: symbol.into(),
            current_price: price,
            expirations: vec![exp(3), exp(10), exp(17)],
            puts: vec![quote(190.0, 2.0, 2.2), quote(200.0, 4.4, 4.6), quote(210.0, 8.0, 8.4)],
            calls: vec![quote(205.0, 7.0, 7.4), quote(215.0, 3.9, 4.1), quote(220.0, 2.9, 3.1)],
        }
    }

    #[test]
    fn open_selects_closest_strike_and_first_week_out_expiration() {
        let s = Session::open(chain("TSLA", 198.0), Mode::Csp, 50_000.0, 7).unwrap();
        let input = s.input();
        assert_eq!(input.strike, 200.0);
        assert!((input.premium - 4.5).abs() < 1e-9);
        assert_eq!(input.days_to_expiration, 10);
        assert_eq!(input.entry_price, 198.0);
        assert_eq!(s.expiration().unwrap().days_to_exp, 10);
    }

    #[test]
    fn open_falls_back_to_first_expiration() {
        let mut c = chain("TSLA", 198.0);
        c.expirations = vec![exp(2), exp(5)];
        let s = Session::open(c, Mode::Csp, 50_000.0, 7).unwrap();
        assert_eq!(s.input().days_to_expiration, 2);
    }

    #[test]
    fn open_with_empty_side_fails() {
        let mut c = chain("TSLA", 198.0);
        c.calls.clear();
        assert!(matches!(
            Session::open(c, Mode::CoveredCall, 50_000.0, 7),
            Err(ChainError::NoOptions(s)) if s == "TSLA"
        ));
    }

    #[test]
    fn mode_switch_keeps_strike_only_when_listed() {
        let s = Session::open(chain("TSLA", 211.0), Mode::Csp, 50_000.0, 7).unwrap();
        assert_eq!(s.input().strike, 210.0);

        // 210 has no call: re-select closest call to spot.
        let cc = s.with_mode(Mode::CoveredCall).unwrap();
        assert_eq!(cc.input().strike, 215.0);
        assert_eq!(cc.input().mode, Mode::CoveredCall);

        let back = cc.with_strike(205.0).unwrap().with_mode(Mode::Csp).unwrap();
        assert_eq!(back.input().strike, 210.0);
    }

    #[test]
    fn strike_and_expiration_must_be_listed() {
        let s = Session::open(chain("TSLA", 200.0), Mode::Csp, 50_000.0, 7).unwrap();
        assert!(s.clone().with_strike(195.0).is_err());
        let picked = s.clone().with_strike(190.0).unwrap();
        assert!((picked.input().premium - 2.1).abs() < 1e-9);

        assert!(s.clone().with_expiration(42).is_err());
        let later = s.with_expiration(exp(17).timestamp).unwrap();
        assert_eq!(later.input().days_to_expiration, 17);
    }

    #[test]
    fn capital_is_snapped() {
        let s = Session::open(chain("TSLA", 200.0), Mode::Csp, 50_000.0, 7)
            .unwrap()
            .with_capital(61_240.0);
        assert_eq!(s.input().capital, 61_000.0);
    }

    #[test]
    fn recorded_entry_price_survives_refresh_of_same_symbol() {
        let s = Session::open(chain("TSLA", 200.0), Mode::CoveredCall, 50_000.0, 7)
            .unwrap()
            .with_entry_price(180.0)
            .unwrap()
            .with_strike(220.0)
            .unwrap();
        let refreshed = s.refresh(chain("TSLA", 212.0)).unwrap();
        let input = refreshed.input();
        assert_eq!(input.current_price, 212.0);
        assert_eq!(input.entry_price, 180.0);
        assert_eq!(input.strike, 220.0);
        assert_eq!(input.days_to_expiration, 10);
    }

    #[test]
    fn new_symbol_resets_entry_price() {
        let s = Session::open(chain("TSLA", 200.0), Mode::CoveredCall, 50_000.0, 7)
            .unwrap()
            .with_entry_price(180.0)
            .unwrap();
        let other = s.refresh(chain("AAPL", 205.0)).unwrap();
        assert_eq!(other.chain().symbol, "AAPL");
        assert_eq!(other.input().entry_price, 205.0);
    }

    #[test]
    fn entry_price_must_be_positive() {
        let s = Session::open(chain("TSLA", 200.0), Mode::CoveredCall, 50_000.0, 7).unwrap();
        assert!(s.with_entry_price(0.0).is_err());
    }

    #[test]
    fn same_day_expiration_clamps_to_one_day() {
        let mut c = chain("TSLA", 200.0);
        c.expirations = vec![exp(0)];
        let s = Session::open(c, Mode::Csp, 50_000.0, 7).unwrap();
        assert_eq!(s.input().days_to_expiration, 1);
        assert!(s.evaluate(&ValuationEngine::default()).is_ok());
    }

    #[test]
    fn evaluate_runs_engine_on_snapshot() {
        let s = Session::open(chain("TSLA", 210.0), Mode::Csp, 50_000.0, 7)
            .unwrap()
            .with_strike(200.0)
            .unwrap();
        let eval = s.evaluate(&ValuationEngine::default()).unwrap();
        assert_eq!(eval.metrics.contracts, 2);
        assert!((eval.metrics.break_even - 195.5).abs() < 1e-9);
        assert_eq!(eval.metrics.confidence_label, ConfidenceLabel::Moderate);
        assert_eq!(eval.curve.len(), 21);
    }
}
