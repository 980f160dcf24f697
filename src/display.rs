//! Console rendering for the farm dashboard.
//!
//! Absent metrics render as "-". A missing price must never look like a
//! zero balance, and a dust balance must never look like an empty one
//! (units::format_display handles the latter).

use alloy_primitives::U256;
use chrono::{Local, TimeZone};
use console::style;

use crate::config::{FarmDeployment, PoolMode};
use crate::farm::{FarmReading, TokenMeta};
use crate::metrics::Metrics;
use crate::price::RefreshOutcome;
use crate::units;

/// Format a USD figure, "-" when absent.
pub fn fmt_usd(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("${}", usd_digits(v)),
        _ => "-".to_string(),
    }
}

/// Format a percentage, "-" when absent.
pub fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}%", v),
        _ => "-".to_string(),
    }
}

/// Token amount with symbol, truncated to the display decimals.
pub fn fmt_amount(value: U256, decimals: u8, display_decimals: u8, symbol: &str) -> String {
    format!(
        "{} {}",
        units::format_display(value, decimals, display_decimals),
        symbol
    )
}

fn usd_digits(v: f64) -> String {
    if v >= 1.0 {
        let fixed = format!("{:.2}", v);
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
        format!("{}.{}", group_thousands(int_part), frac_part)
    } else {
        let fixed = format!("{:.6}", v);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Status line for the price caches: any failure wins (the cached values
/// stay in use), otherwise report the freshest successful fetch.
pub fn price_status(outcomes: &[RefreshOutcome], newest_fetch_ms: u64) -> String {
    if outcomes.iter().any(|o| *o == RefreshOutcome::Failed) {
        return "Price update failed (will retry next refresh)".to_string();
    }
    if newest_fetch_ms == 0 {
        return "Prices not fetched yet".to_string();
    }
    let when = Local
        .timestamp_millis_opt(newest_fetch_ms as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("Prices updated: {}", when)
}

/// Render one refresh cycle.
pub fn print_dashboard(
    deployment: &FarmDeployment,
    meta: &TokenMeta,
    reading: &FarmReading,
    metrics: &Metrics,
    display_decimals: u8,
    status: &str,
) {
    let snap = &reading.snapshot;
    let sd = snap.stake_decimals;
    let rd = snap.reward_decimals;

    println!();
    println!(
        "{}",
        style(format!("── {} ({}) ──", deployment.name, deployment.mode))
            .cyan()
            .bold()
    );

    let row = |label: &str, value: String| {
        println!("  {:<18} {}", style(label).dim(), value);
    };

    row(
        "Wallet balance",
        fmt_amount(snap.wallet_balance, sd, display_decimals, &meta.stake_symbol),
    );
    row(
        "Staked",
        fmt_amount(snap.user_staked, sd, display_decimals, &meta.stake_symbol),
    );
    row(
        "Pending rewards",
        fmt_amount(snap.pending_rewards, rd, display_decimals, &meta.reward_symbol),
    );
    row(
        "Total staked",
        fmt_amount(snap.total_staked, sd, display_decimals, &meta.stake_symbol),
    );
    row(
        "Emissions/day",
        fmt_amount(metrics.emissions_per_day, rd, display_decimals, &meta.reward_symbol),
    );

    let unit_label = match deployment.mode {
        PoolMode::LpShare => "LP unit price",
        PoolMode::DirectRate | PoolMode::StableDrip => "Stake price",
    };
    row(unit_label, fmt_usd(metrics.unit_price_usd));
    row("TVL", fmt_usd(metrics.tvl_usd));
    row("Your stake value", fmt_usd(metrics.user_value_usd));
    row("APR", fmt_pct(metrics.apr_pct));

    if let Some(balance) = reading.reward_balance {
        row(
            "Reward balance",
            fmt_amount(balance, rd, display_decimals, &meta.reward_symbol),
        );
    }
    if let Some(available) = reading.available_rewards {
        row(
            "Available rewards",
            fmt_amount(available, rd, display_decimals, &meta.reward_symbol),
        );
    }
    if let Some(unclaimed) = reading.unclaimed_allocated {
        row(
            "Unclaimed alloc.",
            fmt_amount(unclaimed, rd, display_decimals, &meta.reward_symbol),
        );
    }

    println!("  {}", style(status).dim());
}

/// List the configured deployments.
pub fn print_farm_list(farms: &[FarmDeployment]) {
    println!();
    println!("{}", style("Configured farms").cyan().bold());
    for farm in farms {
        println!(
            "  {:<16} {:<12} farm {}  stake {}",
            style(&farm.name).green(),
            farm.mode.to_string(),
            farm.farm_address,
            farm.stake_token
        );
    }
    println!();
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_usd_absent_is_dash_not_zero() {
        assert_eq!(fmt_usd(None), "-");
        assert_eq!(fmt_usd(Some(f64::NAN)), "-");
        assert_eq!(fmt_usd(Some(f64::INFINITY)), "-");
    }

    #[test]
    fn test_fmt_usd_grouping() {
        assert_eq!(fmt_usd(Some(6150.0)), "$6,150.00");
        assert_eq!(fmt_usd(Some(63_072_000.0)), "$63,072,000.00");
        assert_eq!(fmt_usd(Some(2.5)), "$2.50");
        assert_eq!(fmt_usd(Some(0.123456)), "$0.123456");
    }

    #[test]
    fn test_fmt_pct() {
        assert_eq!(fmt_pct(Some(3_153_600.0)), "3153600.00%");
        assert_eq!(fmt_pct(Some(12.345)), "12.35%");
        assert_eq!(fmt_pct(None), "-");
    }

    #[test]
    fn test_price_status() {
        use RefreshOutcome::*;
        assert_eq!(
            price_status(&[Updated, Failed], 1_000),
            "Price update failed (will retry next refresh)"
        );
        assert_eq!(price_status(&[], 0), "Prices not fetched yet");
        assert!(price_status(&[Updated], 1_700_000_000_000).starts_with("Prices updated: "));
    }
}
