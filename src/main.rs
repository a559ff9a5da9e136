//! Entry point. Wires Quote API -> Session -> Valuation Engine -> Report.

mod cli;
mod config;
mod engine;
mod error;
mod quote_client;
mod report;
mod session;
mod types;
mod utils;

use clap::Parser;
use dotenvy::dotenv;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::engine::ValuationEngine;
use crate::error::ChainError;
use crate::quote_client::{FetchSequencer, FetchTicket, QuoteClient};
use crate::session::Session;
use crate::types::{Mode, OptionChain, StrategyInput};
use crate::utils::valid_symbol;

/// User choices applied on top of the chain defaults.
struct Selections {
    mode: Mode,
    capital: f64,
    strike: Option<f64>,
    expiration: Option<i64>,
    entry_price: Option<f64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Calc {
            mode,
            strike,
            premium,
            price,
            days,
            capital,
            entry_price,
            samples,
            json,
        } => {
            let input = StrategyInput::new(mode, strike, premium, price, days)
                .with_entry_price(entry_price.unwrap_or(price))
                .with_capital(capital.unwrap_or(cfg.defaults.capital));
            let engine = ValuationEngine::new(samples.unwrap_or(cfg.defaults.sample_count));
            let eval = engine.evaluate(&input)?;
            if json {
                println!("{}", report::render_json(&eval)?);
            } else {
                print!("{}", report::render_text(&eval, None));
            }
        }

        Commands::Chain { symbol, json } => {
            let symbol = resolve_symbol(symbol, &cfg)?;
            let client = make_client(&cfg)?;
            let chain = client.fetch_chain(&symbol).await?;
            if json {
                println!("{}", report::render_json(&chain)?);
            } else {
                print!("{}", report::render_chain(&chain));
            }
        }

        Commands::Quote {
            symbol,
            mode,
            capital,
            strike,
            expiration,
            entry_price,
            samples,
            json,
            watch,
        } => {
            let symbol = resolve_symbol(symbol, &cfg)?;
            let client = Arc::new(make_client(&cfg)?);
            let engine = ValuationEngine::new(samples.unwrap_or(cfg.defaults.sample_count));
            let sel = Selections {
                mode: mode.unwrap_or(cfg.defaults.mode),
                capital: capital.unwrap_or(cfg.defaults.capital),
                strike,
                expiration,
                entry_price,
            };

            if watch {
                watch_loop(&cfg, client, &engine, &symbol, &sel, json).await?;
            } else {
                let chain = client.fetch_chain(&symbol).await?;
                let session = open_session(chain, &sel, &cfg)?;
                print_session(&session, &engine, json)?;
            }
        }
    }
    Ok(())
}

fn resolve_symbol(symbol: Option<String>, cfg: &AppConfig) -> anyhow::Result<String> {
    let raw = symbol.unwrap_or_else(|| cfg.defaults.ticker.clone());
    match valid_symbol(&raw) {
        Some(s) => Ok(s),
        None if raw.trim().is_empty() => Err(ChainError::EmptySymbol.into()),
        None => anyhow::bail!("Not a ticker symbol: {raw:?}"),
    }
}

fn make_client(cfg: &AppConfig) -> anyhow::Result<QuoteClient> {
    let api_key = std::env::var("RAPID_API_KEY").unwrap_or_default();
    Ok(QuoteClient::new(&cfg.api, &api_key)?)
}

/// Open on the configured defaults, then apply the user's choices as session actions.
fn open_session(chain: OptionChain, sel: &Selections, cfg: &AppConfig) -> anyhow::Result<Session> {
    let d = &cfg.defaults;
    let session = match Session::open(chain.clone(), d.mode, d.capital, d.min_days) {
        Ok(s) => s.with_mode(sel.mode)?,
        // Default side has no rows; start on the requested side instead.
        Err(ChainError::NoOptions(_)) if sel.mode != d.mode => {
            Session::open(chain, sel.mode, d.capital, d.min_days)?
        }
        Err(e) => return Err(e.into()),
    };
    let mut session = session.with_capital(sel.capital);
    if let Some(ts) = sel.expiration {
        session = session.with_expiration(ts)?;
    }
    if let Some(strike) = sel.strike {
        session = session.with_strike(strike)?;
    }
    if let Some(price) = sel.entry_price {
        session = session.with_entry_price(price)?;
    }
    Ok(session)
}

fn print_session(session: &Session, engine: &ValuationEngine, json: bool) -> anyhow::Result<()> {
    let eval = session.evaluate(engine)?;
    if json {
        println!("{}", report::render_json(&eval)?);
    } else {
        print!("{}", report::render_text(&eval, Some(session)));
    }
    Ok(())
}

/// Refetch on an interval. Each fetch runs as its own task and a tick is
/// skipped while the previous fetch is still in flight.
async fn watch_loop(
    cfg: &AppConfig,
    client: Arc<QuoteClient>,
    engine: &ValuationEngine,
    symbol: &str,
    sel: &Selections,
    json: bool,
) -> anyhow::Result<()> {
    let seq = Arc::new(FetchSequencer::new());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(FetchTicket, Result<OptionChain, ChainError>)>(16);
    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.watch.refresh_interval_sec));
    let mut session: Option<Session> = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Watching {} every {}s (mode={})",
        symbol, cfg.watch.refresh_interval_sec, sel.mode
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(ticket) = seq.try_begin() else {
                    debug!("Previous fetch still in flight, skipping tick");
                    continue;
                };
                let client_c = Arc::clone(&client);
                let tx_c = tx.clone();
                let symbol_c = symbol.to_string();
                tokio::spawn(async move {
                    let res = client_c.fetch_chain(&symbol_c).await;
                    let _ = tx_c.send((ticket, res)).await;
                });
            }

            maybe = rx.recv() => {
                let Some((ticket, res)) = maybe else { break; };
                if !seq.complete(ticket) {
                    debug!("Dropping stale response {:?}", ticket);
                    continue;
                }
                let chain = match res {
                    Ok(c) => c,
                    Err(e) => { error!("fetch failed: {:#}", e); continue; }
                };
                let next = match session.take() {
                    Some(s) => s.refresh(chain).map_err(anyhow::Error::from),
                    None => open_session(chain, sel, cfg),
                };
                match next {
                    Ok(s) => {
                        if let Err(e) = print_session(&s, engine, json) {
                            error!("evaluation failed: {:#}", e);
                        }
                        session = Some(s);
                    }
                    Err(e) => warn!("quote not applied: {:#}", e),
                }
            }

            _ = &mut shutdown => {
                info!("Stopping watch");
                break;
            }
        }
    }
    Ok(())
}
