//! Thin client over the RapidAPI Yahoo Finance options endpoint: fetch, normalize, sequence.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ApiCfg;
use crate::error::ChainError;
use crate::types::{Expiration, OptionChain, OptionQuote};
use crate::utils::{days_until, sanitize_symbol};

pub struct QuoteClient {
    client: reqwest::Client,
    base_url: String,
    host: String,
    api_key: String,
}

impl QuoteClient {
    pub fn new(cfg: &ApiCfg, api_key: &str) -> Result<Self, ChainError> {
        if api_key.trim().is_empty() {
            return Err(ChainError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_sec))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            host: cfg.host.clone(),
            api_key: api_key.trim().to_string(),
        })
    }

    /// Fetch and normalize the nearest-expiry chain for `symbol`.
    pub async fn fetch_chain(&self, symbol: &str) -> Result<OptionChain, ChainError> {
        let symbol = sanitize_symbol(symbol);
        if symbol.is_empty() {
            return Err(ChainError::EmptySymbol);
        }

        let url = format!("{}/stock/get-options", self.base_url);
        debug!("GET {} symbol={}", url, symbol);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("lang", "en-US"), ("region", "US")])
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.host)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
                .to_string();
            warn!("Quote API error for {}: {} {}", symbol, status, message);
            return Err(ChainError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = resp.json().await?;
        let chain = parse_chain(&symbol, &body, Utc::now())?;
        info!(
            "Fetched {}: spot={:.2}, {} expirations, {} puts, {} calls",
            chain.symbol,
            chain.current_price,
            chain.expirations.len(),
            chain.puts.len(),
            chain.calls.len()
        );
        Ok(chain)
    }
}

/// Normalize a raw `get-options` payload. The API has shipped several envelope
/// shapes, so each field is looked up along a list of aliases.
pub fn parse_chain(symbol: &str, body: &Value, now: DateTime<Utc>) -> Result<OptionChain, ChainError> {
    if !body.is_object() {
        return Err(ChainError::InvalidResponse("expected a JSON object".into()));
    }

    let result = body
        .get("optionChain")
        .and_then(|c| c.get("result"))
        .and_then(|r| r.get(0))
        .or_else(|| body.get("result").and_then(|r| r.get(0)))
        .unwrap_or(body);

    // A zero quote counts as missing; try the next alias.
    let positive = |v: Option<&Value>| number(v).filter(|p| *p > 0.0);
    let price = positive(result.get("quote").and_then(|q| q.get("regularMarketPrice")))
        .or_else(|| positive(result.get("regularMarketPrice")))
        .or_else(|| positive(result.get("currentPrice")))
        .unwrap_or(0.0);
    if !(price.is_finite() && price > 0.0) {
        return Err(ChainError::MissingPrice(symbol.to_string()));
    }

    let option_block = result
        .get("options")
        .and_then(|o| o.get(0))
        .unwrap_or(result);

    let expirations = result
        .get("expirationDates")
        .and_then(|e| e.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|x| x.as_i64())
                .filter_map(|ts| {
                    DateTime::from_timestamp(ts, 0).map(|date| Expiration {
                        timestamp: ts,
                        date,
                        days_to_exp: days_until(ts, now),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(OptionChain {
        symbol: symbol.to_string(),
        current_price: price,
        expirations,
        puts: parse_side(option_block.get("puts")),
        calls: parse_side(option_block.get("calls")),
    })
}

fn parse_side(rows: Option<&Value>) -> Vec<OptionQuote> {
    let mut out: Vec<OptionQuote> = rows
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(parse_quote).collect())
        .unwrap_or_default();
    out.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    out
}

fn parse_quote(row: &Value) -> Option<OptionQuote> {
    let strike = number(row.get("strike")).filter(|s| s.is_finite() && *s > 0.0)?;
    Some(OptionQuote {
        strike,
        bid: number(row.get("bid")),
        ask: number(row.get("ask")),
        last_price: number(row.get("lastPrice")),
    })
}

/// Yahoo sometimes wraps numbers as `{ "raw": 1.23, "fmt": "1.23" }`.
fn number(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    v.as_f64()
        .or_else(|| v.get("raw").and_then(|r| r.as_f64()))
        .filter(|x| x.is_finite())
}

/// Hands out fetch tickets, at most one in flight at a time. Only the newest
/// ticket's response may be applied.
#[derive(Debug, Default)]
pub struct FetchSequencer {
    latest: AtomicU64,
    in_flight: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

impl FetchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// New ticket, or `None` while the previous fetch has not completed.
    pub fn try_begin(&self) -> Option<FetchTicket> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(FetchTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1))
    }

    /// Mark `ticket` done. Returns whether its response should be applied.
    pub fn complete(&self, ticket: FetchTicket) -> bool {
        let current = self.is_current(ticket);
        if current {
            self.in_flight.store(false, Ordering::SeqCst);
        }
        current
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap()
    }

    fn fixture() -> Value {
        let d3 = Utc.with_ymd_and_hms(2026, 10, 22, 20, 0, 0).unwrap().timestamp();
        let d10 = Utc.with_ymd_and_hms(2026, 10, 29, 20, 0, 0).unwrap().timestamp();
        json!({
            "optionChain": {
                "result": [{
                    "quote": { "regularMarketPrice": 210.0 },
                    "expirationDates": [d3, d10],
                    "options": [{
                        "puts": [
                            { "strike": 205.0, "bid": 6.0, "ask": 6.4 },
                            { "strike": 200.0, "bid": 4.4, "ask": 4.6 },
                            { "strike": 0.0, "bid": 1.0, "ask": 1.0 },
                            { "bid": 1.0, "ask": 1.0 }
                        ],
                        "calls": [
                            { "strike": 220.0, "bid": 2.9, "ask": 3.1, "lastPrice": 3.0 },
                            { "strike": 215.0, "bid": null, "ask": 4.0, "lastPrice": 4.1 }
                        ]
                    }]
                }]
            }
        })
    }

    #[test]
    fn parses_standard_envelope() {
        let chain = parse_chain("TSLA", &fixture(), now()).unwrap();
        assert_eq!(chain.symbol, "TSLA");
        assert_eq!(chain.current_price, 210.0);
        assert_eq!(chain.expirations.len(), 2);
        assert_eq!(chain.expirations[0].days_to_exp, 4);
        assert_eq!(chain.expirations[1].days_to_exp, 11);

        // Invalid strikes dropped, sorted ascending.
        assert_eq!(chain.strikes(crate::types::Mode::Csp), vec![200.0, 205.0]);
        assert_eq!(chain.puts[0].mid(), 4.5);
        assert_eq!(chain.calls[0].strike, 215.0);
        assert_eq!(chain.calls[0].mid(), 4.1);
    }

    #[test]
    fn parses_flat_result_envelope() {
        let body = json!({
            "result": [{
                "regularMarketPrice": { "raw": 99.5 },
                "currentPrice": 98.0,
                "puts": [{ "strike": { "raw": 95.0, "fmt": "95.00" }, "bid": 1.0, "ask": 1.2 }]
            }]
        });
        let chain = parse_chain("XYZ", &body, now()).unwrap();
        assert_eq!(chain.current_price, 99.5);
        assert_eq!(chain.puts.len(), 1);
        assert_eq!(chain.puts[0].strike, 95.0);
        assert!(chain.calls.is_empty());
        assert!(chain.expirations.is_empty());
    }

    #[test]
    fn missing_price_is_an_error() {
        let body = json!({ "optionChain": { "result": [{ "quote": {} }] } });
        assert!(matches!(
            parse_chain("NOPE", &body, now()),
            Err(ChainError::MissingPrice(s)) if s == "NOPE"
        ));

        let zero = json!({ "regularMarketPrice": 0 });
        assert!(matches!(
            parse_chain("ZERO", &zero, now()),
            Err(ChainError::MissingPrice(_))
        ));
    }

    #[test]
    fn zero_price_falls_through_to_next_alias() {
        let body = json!({
            "quote": { "regularMarketPrice": 0 },
            "regularMarketPrice": 150.0
        });
        let chain = parse_chain("X", &body, now()).unwrap();
        assert_eq!(chain.current_price, 150.0);

        let body = json!({ "regularMarketPrice": 0.0, "currentPrice": 42.5 });
        assert_eq!(parse_chain("X", &body, now()).unwrap().current_price, 42.5);
    }

    #[test]
    fn non_object_body_is_invalid() {
        assert!(matches!(
            parse_chain("X", &json!([1, 2, 3]), now()),
            Err(ChainError::InvalidResponse(_))
        ));
    }

    #[test]
    fn client_requires_api_key() {
        assert!(matches!(
            QuoteClient::new(&ApiCfg::default(), "  "),
            Err(ChainError::MissingApiKey)
        ));
    }

    #[test]
    fn empty_symbol_short_circuits() {
        let client = QuoteClient::new(&ApiCfg::default(), "key").unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(client.fetch_chain("   "));
        assert!(matches!(result, Err(ChainError::EmptySymbol)));
    }

    #[test]
    fn no_second_fetch_while_one_is_in_flight() {
        let seq = FetchSequencer::new();
        let first = seq.try_begin().unwrap();
        // Slow response: the next ticks must not start another fetch.
        assert!(seq.try_begin().is_none());
        assert!(seq.try_begin().is_none());

        assert!(seq.complete(first));
        let second = seq.try_begin().unwrap();
        assert_ne!(first, second);
        assert!(seq.is_current(second));
        assert!(!seq.is_current(first));
    }

    #[test]
    fn stale_ticket_is_not_applied() {
        let seq = FetchSequencer::new();
        let first = seq.try_begin().unwrap();
        assert!(seq.complete(first));
        let second = seq.try_begin().unwrap();
        // A late duplicate of the first response leaves the second in flight.
        assert!(!seq.complete(first));
        assert!(seq.try_begin().is_none());
        assert!(seq.complete(second));
    }
}
