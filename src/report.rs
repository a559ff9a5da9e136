//! Render evaluations for the terminal or as JSON.

use serde::Serialize;
use std::fmt::{self, Write};

use crate::engine::{pnl_percentages, Evaluation};
use crate::session::Session;
use crate::types::{Mode, OptionChain};

pub fn render_text(eval: &Evaluation, session: Option<&Session>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text(&mut out, eval, session);
    out
}

pub fn render_chain(chain: &OptionChain) -> String {
    let mut out = String::new();
    let _ = write_chain(&mut out, chain);
    out
}

fn write_text(out: &mut impl Write, eval: &Evaluation, session: Option<&Session>) -> fmt::Result {
    let input = &eval.input;
    let m = &eval.metrics;

    if let Some(s) = session {
        writeln!(out, "{}  ${:.2}", s.chain().symbol, s.chain().current_price)?;
        if let Some(e) = s.expiration() {
            writeln!(out, "Expiration: {} ({} days)", e.date.format("%Y-%m-%d"), e.days_to_exp)?;
        }
    } else {
        writeln!(out, "Spot: ${:.2}", input.current_price)?;
    }
    let strategy = match input.mode {
        Mode::Csp => "Cash Secured Put",
        Mode::CoveredCall => "Covered Call",
    };
    writeln!(out, "{} @ ${} ({} DTE)", strategy, input.strike, input.days_to_expiration)?;
    writeln!(out)?;

    writeln!(out, "{}", m.confidence_label)?;
    writeln!(out, "  Premium (Mid)     ${:.2}", input.premium)?;
    writeln!(out, "  Break-Even        ${:.2}", m.break_even)?;
    writeln!(out, "  Weekly ROI        {:.2}%", m.weekly_roi)?;
    writeln!(out, "  Monthly ROI       {:.2}%", m.monthly_roi)?;
    writeln!(out, "  Annualized ROI    {:.1}%", m.annualized_roi)?;
    writeln!(out, "  Return on Risk    {:.2}%", m.return_on_risk)?;
    writeln!(out, "  Total Premium     ${:.2}", m.total_premium)?;
    writeln!(out, "  Max Profit        ${:.2}", m.max_profit)?;
    writeln!(out, "  Max Loss          ${:.2}", m.max_loss)?;
    match input.mode {
        Mode::Csp => writeln!(out, "  Contracts         {}", m.contracts)?,
        Mode::CoveredCall => writeln!(
            out,
            "  Contracts (Stock) {} ({} shares @ ${:.2})",
            m.contracts, m.shares, input.entry_price
        )?,
    }
    writeln!(out, "  Safety Buffer     {:.1}%", m.safety_buffer.abs())?;
    writeln!(out, "  Discount to Spot  {:.1}%", m.discount_percent)?;
    writeln!(out, "  Safety Score      {}%", m.confidence_score)?;

    if !eval.curve.is_empty() {
        writeln!(out)?;
        writeln!(out, "P&L at Expiration (per contract)")?;
        for p in &eval.curve {
            let (pct_prem, pct_cap) = pnl_percentages(p, input);
            writeln!(
                out,
                "  ${:>9.2}  {:>+11.2}  ({:.1}% prem, {:.2}% cap)",
                p.price, p.pnl, pct_prem, pct_cap
            )?;
        }
    }
    Ok(())
}

fn write_chain(out: &mut impl Write, chain: &OptionChain) -> fmt::Result {
    writeln!(out, "{}  ${:.2}", chain.symbol, chain.current_price)?;
    writeln!(out, "Expirations:")?;
    for e in &chain.expirations {
        writeln!(out, "  {}  {} ({} days)", e.timestamp, e.date.format("%Y-%m-%d"), e.days_to_exp)?;
    }
    for (label, mode) in [("Puts", Mode::Csp), ("Calls", Mode::CoveredCall)] {
        writeln!(out, "{label}:")?;
        for q in chain.side(mode) {
            writeln!(out, "  ${:>9.2}  mid {:.2}", q.strike, q.mid())?;
        }
    }
    Ok(())
}

pub fn render_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
