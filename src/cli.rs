//! Command-line surface.

use clap::{Parser, Subcommand};

use crate::types::Mode;

#[derive(Parser)]
#[command(name = "option-sentinel", about = "Cash-secured put and covered call calculator")]
pub struct Cli {
    /// Path to the YAML config
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a live chain and evaluate a position
    Quote {
        /// Ticker symbol (defaults to config)
        symbol: Option<String>,
        /// CSP or CC
        #[arg(long)]
        mode: Option<Mode>,
        #[arg(long)]
        capital: Option<f64>,
        /// Strike to use instead of the one closest to spot
        #[arg(long)]
        strike: Option<f64>,
        /// Expiration as a unix timestamp (see `chain`)
        #[arg(long)]
        expiration: Option<i64>,
        /// Cost basis of the shares (covered calls)
        #[arg(long)]
        entry_price: Option<f64>,
        /// Number of P&L curve samples
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        json: bool,
        /// Keep refreshing on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Evaluate a position from manual inputs, no network
    Calc {
        #[arg(long)]
        mode: Mode,
        #[arg(long)]
        strike: f64,
        /// Per-share premium
        #[arg(long)]
        premium: f64,
        /// Current underlying price
        #[arg(long)]
        price: f64,
        #[arg(long)]
        days: u32,
        #[arg(long)]
        capital: Option<f64>,
        #[arg(long)]
        entry_price: Option<f64>,
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List expirations and strikes for a symbol
    Chain {
        symbol: Option<String>,
        #[arg(long)]
        json: bool,
    },
}
