//! Error types for the engine boundary and the chain fetcher.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Ticker symbol is empty")]
    EmptySymbol,

    #[error("RAPID_API_KEY is not set")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Quote API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API response structure: {0}")]
    InvalidResponse(String),

    #[error("Unable to fetch current price for {0}")]
    MissingPrice(String),

    #[error("No options data available for {0}")]
    NoOptions(String),
}
