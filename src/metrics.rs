//! Derived display metrics: TVL, unit price, user value, APR, emissions/day.
//!
//! Pure function of a per-cycle on-chain snapshot plus the cached prices.
//! Nothing here is retained between refresh cycles. Any metric whose inputs
//! are missing, or whose denominator is zero, comes back as `None` so the
//! renderer can show "-" instead of a misleading "0".

use alloy_primitives::U256;

use crate::config::PoolMode;
use crate::units;

pub const SECONDS_PER_YEAR: u64 = 31_536_000;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// How the farm reports its reward emissions. The two forms are mutually
/// exclusive: rate-based farms expose `rewardPerSecond()`, drip farms expose
/// `dailyDripEstimate()` / `yearlyDripEstimate()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardSchedule {
    /// Reward base units emitted per second.
    RatePerSecond(U256),

    /// Contract-reported drip estimates in reward base units.
    Drip { per_day: U256, per_year: U256 },
}

/// One refresh cycle's on-chain reads, all in base units.
#[derive(Debug, Clone)]
pub struct StakeSnapshot {
    pub user_staked: U256,
    pub total_staked: U256,
    pub wallet_balance: U256,
    pub pending_rewards: U256,
    pub schedule: RewardSchedule,
    pub stake_decimals: u8,
    pub reward_decimals: u8,
    /// Total supply of the staked LP token; only read for LP-share farms.
    pub lp_total_supply: Option<U256>,
}

/// Cached external prices supplied to the engine each cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceBoard {
    pub stake_price_usd: Option<f64>,
    pub reward_price_usd: Option<f64>,
    /// The pool's own liquidity figure (LP-share farms). Not the farm TVL.
    pub pool_liquidity_usd: Option<f64>,
}

/// Display-ready metrics for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    /// USD price of one stake unit (token or LP share).
    pub unit_price_usd: Option<f64>,
    /// USD value of all staked principal in the farm.
    pub tvl_usd: Option<f64>,
    /// USD value of the user's staked position.
    pub user_value_usd: Option<f64>,
    /// Simple annualized rate, percent.
    pub apr_pct: Option<f64>,
    /// Reward base units emitted per day; computable without any price.
    pub emissions_per_day: U256,
}

/// Compute the metrics for one snapshot. Idempotent; call every cycle.
pub fn compute(mode: PoolMode, snap: &StakeSnapshot, prices: &PriceBoard) -> Metrics {
    let emissions_per_day = match snap.schedule {
        RewardSchedule::RatePerSecond(rate) => rate * U256::from(SECONDS_PER_DAY),
        RewardSchedule::Drip { per_day, .. } => per_day,
    };

    let mut unit_price_usd = match mode {
        PoolMode::DirectRate | PoolMode::StableDrip => prices.stake_price_usd,
        PoolMode::LpShare => lp_unit_price(snap, prices),
    }
    .and_then(finite);

    // An empty farm has no meaningful unit price, TVL, or APR.
    if snap.total_staked.is_zero() {
        unit_price_usd = None;
    }

    let total_staked_tokens = units::to_f64(snap.total_staked, snap.stake_decimals);
    let tvl_usd = unit_price_usd
        .map(|p| p * total_staked_tokens)
        .and_then(finite);

    let user_value_usd = unit_price_usd
        .map(|p| p * units::to_f64(snap.user_staked, snap.stake_decimals))
        .and_then(finite);

    let yearly_reward_tokens = match snap.schedule {
        RewardSchedule::RatePerSecond(rate) => {
            units::to_f64(rate * U256::from(SECONDS_PER_YEAR), snap.reward_decimals)
        }
        RewardSchedule::Drip { per_year, .. } => {
            units::to_f64(per_year, snap.reward_decimals)
        }
    };

    // StableDrip rewards are assumed pegged 1:1 to USD; the other modes
    // need a reward-token price.
    let yearly_rewards_usd = match mode {
        PoolMode::StableDrip => Some(yearly_reward_tokens),
        PoolMode::DirectRate | PoolMode::LpShare => {
            prices.reward_price_usd.map(|p| yearly_reward_tokens * p)
        }
    }
    .and_then(finite);

    let apr_pct = match (yearly_rewards_usd, tvl_usd) {
        (Some(yearly), Some(tvl)) if tvl > 0.0 => finite((yearly / tvl) * 100.0),
        _ => None,
    };

    Metrics {
        unit_price_usd,
        tvl_usd,
        user_value_usd,
        apr_pct,
        emissions_per_day,
    }
}

/// LP unit price = pool liquidity / LP total supply. `None` when either
/// input is missing or the supply is zero.
fn lp_unit_price(snap: &StakeSnapshot, prices: &PriceBoard) -> Option<f64> {
    let liquidity = prices.pool_liquidity_usd?;
    let supply = snap.lp_total_supply?;
    if supply.is_zero() {
        return None;
    }
    let supply_tokens = units::to_f64(supply, snap.stake_decimals);
    if supply_tokens > 0.0 {
        Some(liquidity / supply_tokens)
    } else {
        None
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_E18: u128 = 1_000_000_000_000_000_000;

    fn rate_snapshot(total: u128, rate: u128) -> StakeSnapshot {
        StakeSnapshot {
            user_staked: U256::from(total / 2),
            total_staked: U256::from(total),
            wallet_balance: U256::ZERO,
            pending_rewards: U256::ZERO,
            schedule: RewardSchedule::RatePerSecond(U256::from(rate)),
            stake_decimals: 18,
            reward_decimals: 18,
            lp_total_supply: None,
        }
    }

    #[test]
    fn test_direct_rate_tvl() {
        // 2.0 tokens staked at $1000 -> TVL $2000
        let snap = rate_snapshot(2 * ONE_E18, ONE_E18);
        let prices = PriceBoard {
            stake_price_usd: Some(1000.0),
            reward_price_usd: Some(2.0),
            pool_liquidity_usd: None,
        };
        let m = compute(PoolMode::DirectRate, &snap, &prices);
        assert_eq!(m.tvl_usd, Some(2000.0));
        assert_eq!(m.unit_price_usd, Some(1000.0));
        assert_eq!(m.user_value_usd, Some(1000.0));
    }

    #[test]
    fn test_direct_rate_apr() {
        // 1 token/s at $2 against a $2000 TVL:
        // yearly tokens = 31_536_000, yearly USD = 63_072_000,
        // APR = 63_072_000 / 2000 * 100 = 3_153_600%
        let snap = rate_snapshot(2 * ONE_E18, ONE_E18);
        let prices = PriceBoard {
            stake_price_usd: Some(1000.0),
            reward_price_usd: Some(2.0),
            pool_liquidity_usd: None,
        };
        let m = compute(PoolMode::DirectRate, &snap, &prices);
        assert_eq!(m.apr_pct, Some(3_153_600.0));
    }

    #[test]
    fn test_empty_farm_blanks_derived_fields() {
        let snap = rate_snapshot(0, ONE_E18);
        let prices = PriceBoard {
            stake_price_usd: Some(1000.0),
            reward_price_usd: Some(2.0),
            pool_liquidity_usd: None,
        };
        let m = compute(PoolMode::DirectRate, &snap, &prices);
        assert_eq!(m.tvl_usd, None);
        assert_eq!(m.apr_pct, None);
        assert_eq!(m.unit_price_usd, None);
        // but emissions come straight from the on-chain rate
        assert_eq!(m.emissions_per_day, U256::from(86_400u128 * ONE_E18));
    }

    #[test]
    fn test_missing_price_blanks_apr_not_emissions() {
        let snap = rate_snapshot(2 * ONE_E18, ONE_E18);
        let prices = PriceBoard {
            stake_price_usd: Some(1000.0),
            reward_price_usd: None,
            pool_liquidity_usd: None,
        };
        let m = compute(PoolMode::DirectRate, &snap, &prices);
        assert_eq!(m.apr_pct, None);
        assert_eq!(m.tvl_usd, Some(2000.0));
        assert_eq!(m.emissions_per_day, U256::from(86_400u128 * ONE_E18));
    }

    #[test]
    fn test_lp_share_farm_tvl_vs_pool_liquidity() {
        // Pool holds $10_000 across 100 LP units -> $100/LP.
        // Farm has 2 LP staked -> farm TVL is $200, not the pool's $10_000.
        let mut snap = rate_snapshot(2 * ONE_E18, ONE_E18);
        snap.lp_total_supply = Some(U256::from(100 * ONE_E18));
        let prices = PriceBoard {
            stake_price_usd: None,
            reward_price_usd: Some(0.5),
            pool_liquidity_usd: Some(10_000.0),
        };
        let m = compute(PoolMode::LpShare, &snap, &prices);
        assert_eq!(m.unit_price_usd, Some(100.0));
        assert_eq!(m.tvl_usd, Some(200.0));
        assert_eq!(m.user_value_usd, Some(100.0));
    }

    #[test]
    fn test_lp_share_zero_supply() {
        let mut snap = rate_snapshot(2 * ONE_E18, ONE_E18);
        snap.lp_total_supply = Some(U256::ZERO);
        let prices = PriceBoard {
            stake_price_usd: None,
            reward_price_usd: Some(0.5),
            pool_liquidity_usd: Some(10_000.0),
        };
        let m = compute(PoolMode::LpShare, &snap, &prices);
        assert_eq!(m.unit_price_usd, None);
        assert_eq!(m.tvl_usd, None);
        assert_eq!(m.apr_pct, None);
    }

    #[test]
    fn test_stable_drip_needs_no_reward_price() {
        // 36_500 USDC/year (6 decimals) against a $36_500 TVL -> 100% APR.
        let snap = StakeSnapshot {
            user_staked: U256::ZERO,
            total_staked: U256::from(36_500u128 * ONE_E18),
            wallet_balance: U256::ZERO,
            pending_rewards: U256::ZERO,
            schedule: RewardSchedule::Drip {
                per_day: U256::from(100_000_000u64),
                per_year: U256::from(36_500_000_000u64),
            },
            stake_decimals: 18,
            reward_decimals: 6,
            lp_total_supply: None,
        };
        let prices = PriceBoard {
            stake_price_usd: Some(1.0),
            reward_price_usd: None,
            pool_liquidity_usd: None,
        };
        let m = compute(PoolMode::StableDrip, &snap, &prices);
        assert_eq!(m.tvl_usd, Some(36_500.0));
        assert_eq!(m.apr_pct, Some(100.0));
        // drip farms report the daily figure directly - no client-side math
        assert_eq!(m.emissions_per_day, U256::from(100_000_000u64));
    }

    #[test]
    fn test_no_stake_price_blanks_everything_but_emissions() {
        let snap = rate_snapshot(2 * ONE_E18, ONE_E18);
        let m = compute(PoolMode::DirectRate, &snap, &PriceBoard::default());
        assert_eq!(m.unit_price_usd, None);
        assert_eq!(m.tvl_usd, None);
        assert_eq!(m.user_value_usd, None);
        assert_eq!(m.apr_pct, None);
        assert!(m.emissions_per_day > U256::ZERO);
    }
}
