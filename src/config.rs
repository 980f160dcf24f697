//! Deployment configuration for farmdeck.
//!
//! One parameterized engine instead of a copy-pasted page per farm: each
//! `[[farms]]` entry carries the addresses, decimals, price-pair wiring and
//! pool mode that used to be hardcoded per deployment.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================
// POOL MODE
// ============================================

/// How a farm's TVL and yearly rewards are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    /// Stake and reward are distinct tokens, each priced from its own pair;
    /// rewards come from an on-chain per-second rate.
    DirectRate,

    /// Stake token is an LP share priced as pool liquidity / LP supply.
    LpShare,

    /// Reward token is assumed pegged 1:1 to USD; the contract reports
    /// drip estimates directly.
    StableDrip,
}

impl std::fmt::Display for PoolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolMode::DirectRate => write!(f, "direct-rate"),
            PoolMode::LpShare => write!(f, "lp-share"),
            PoolMode::StableDrip => write!(f, "stable-drip"),
        }
    }
}

/// What "available rewards" means for a drip farm. Deployments disagree, so
/// it is a per-farm config field rather than a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReserveBasis {
    /// The contract's raw reward-token balance.
    #[default]
    RawBalance,

    /// Raw balance minus allocated-but-unclaimed rewards, when the contract
    /// exposes `unclaimedAllocated()`.
    NetOfAllocated,
}

// ============================================
// FARM DEPLOYMENT
// ============================================

/// One staking farm deployment. Addresses are kept as strings in the file
/// and parsed through the accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmDeployment {
    pub name: String,
    pub farm_address: String,
    pub stake_token: String,
    pub reward_token: String,
    pub mode: PoolMode,
    #[serde(default)]
    pub reserve_basis: ReserveBasis,

    /// DexScreener chain slug, e.g. "base".
    pub dex_chain: String,
    /// Pair quoting the stake token (and, for LP farms, supplying the
    /// pool liquidity figure). Absent = no USD metrics for the stake side.
    #[serde(default)]
    pub stake_pair: Option<String>,
    /// Pair quoting the reward token. Absent for pegged-reward farms.
    #[serde(default)]
    pub reward_pair: Option<String>,

    /// Decimals overrides; normally read from the token contracts.
    #[serde(default)]
    pub stake_decimals: Option<u8>,
    #[serde(default)]
    pub reward_decimals: Option<u8>,
}

impl FarmDeployment {
    pub fn farm_address(&self) -> Result<Address> {
        parse_address(&self.farm_address, &self.name, "farm_address")
    }

    pub fn stake_token(&self) -> Result<Address> {
        parse_address(&self.stake_token, &self.name, "stake_token")
    }

    pub fn reward_token(&self) -> Result<Address> {
        parse_address(&self.reward_token, &self.name, "reward_token")
    }
}

fn parse_address(raw: &str, farm: &str, field: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|_| eyre!("farm '{}': invalid {}: {}", farm, field, raw))
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON-RPC endpoint for on-chain reads and transactions.
    pub rpc_url: String,

    /// Chain ID (8453 = Base).
    pub chain_id: u64,

    /// Seconds between refresh cycles in `watch` mode.
    pub refresh_interval_secs: u64,

    /// Fractional digits shown for token amounts (display truncates,
    /// never rounds).
    pub display_decimals: u8,

    pub farms: Vec<FarmDeployment>,
}

impl AppConfig {
    /// Load configuration: TOML file if present, defaults otherwise, with
    /// environment variables (and `.env`) overriding the globals.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new("farmdeck.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(url) = env::var("RPC_URL") {
            config.rpc_url = url;
        }
        if let Ok(id) = env::var("CHAIN_ID") {
            config.chain_id = id.parse().unwrap_or(config.chain_id);
        }
        if let Ok(secs) = env::var("REFRESH_INTERVAL_SECS") {
            config.refresh_interval_secs = secs.parse().unwrap_or(config.refresh_interval_secs);
        }
        if let Ok(dp) = env::var("DISPLAY_DECIMALS") {
            config.display_decimals = dp.parse().unwrap_or(config.display_decimals);
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| eyre!("cannot read {}: {}", path.as_ref().display(), e))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Look up a deployment by name.
    pub fn farm(&self, name: &str) -> Result<&FarmDeployment> {
        self.farms
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                let known: Vec<&str> = self.farms.iter().map(|f| f.name.as_str()).collect();
                eyre!("unknown farm '{}' (configured: {})", name, known.join(", "))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("invalid rpc_url - set RPC_URL or edit farmdeck.toml"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(eyre!("refresh_interval_secs must be at least 1"));
        }
        if self.display_decimals == 0 {
            return Err(eyre!("display_decimals must be at least 1"));
        }
        if self.farms.is_empty() {
            return Err(eyre!("no farms configured"));
        }

        let mut seen = HashSet::new();
        for farm in &self.farms {
            if !seen.insert(farm.name.as_str()) {
                return Err(eyre!("duplicate farm name '{}'", farm.name));
            }
            farm.farm_address()?;
            farm.stake_token()?;
            farm.reward_token()?;
            if farm.mode == PoolMode::LpShare && farm.stake_pair.is_none() {
                return Err(eyre!(
                    "farm '{}': lp_share mode needs stake_pair for the pool liquidity figure",
                    farm.name
                ));
            }
        }

        Ok(())
    }
}

// ============================================
// DEFAULT DEPLOYMENTS (Base)
// ============================================

const BASE_RPC_URL: &str = "https://mainnet.base.org";

const ALT: &str = "0x90678C02823b21772fa7e91B27EE70490257567B";
const WETH_BASE: &str = "0x4200000000000000000000000000000000000006";
const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
const CBBTC: &str = "0xcbB7C0000aB88B473b1f5aFd9ef808440eed33Bf";
const ALT_WETH_LP: &str = "0xD57f6e7D7eC911bA8deFCf93d3682BB76959e950";

const PAIR_ALT_WETH: &str = "0xd57f6e7d7ec911ba8defcf93d3682bb76959e950";
const PAIR_CBBTC_USDC: &str = "0x4e962BB3889Bf030368F56810A9c96B83CB3E778";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: BASE_RPC_URL.to_string(),
            chain_id: 8453,
            refresh_interval_secs: 300,
            display_decimals: 6,
            farms: vec![
                FarmDeployment {
                    name: "weth-farm".to_string(),
                    farm_address: "0xEDf944C6c84255aD529AD366975D556F4e3B0c7f".to_string(),
                    stake_token: WETH_BASE.to_string(),
                    reward_token: ALT.to_string(),
                    mode: PoolMode::DirectRate,
                    reserve_basis: ReserveBasis::RawBalance,
                    dex_chain: "base".to_string(),
                    stake_pair: None,
                    reward_pair: Some(PAIR_ALT_WETH.to_string()),
                    stake_decimals: None,
                    reward_decimals: None,
                },
                FarmDeployment {
                    name: "cbbtc-farm".to_string(),
                    farm_address: "0x7B3A9BDC0Fad5f92e6a7f08486659061E2A97254".to_string(),
                    stake_token: CBBTC.to_string(),
                    reward_token: ALT.to_string(),
                    mode: PoolMode::DirectRate,
                    reserve_basis: ReserveBasis::RawBalance,
                    dex_chain: "base".to_string(),
                    stake_pair: Some(PAIR_CBBTC_USDC.to_string()),
                    reward_pair: Some(PAIR_ALT_WETH.to_string()),
                    stake_decimals: None,
                    reward_decimals: None,
                },
                FarmDeployment {
                    name: "alt-weth-lp".to_string(),
                    farm_address: "0x5AE7DF6C8923F5a3AADE383cDb4742644e64544D".to_string(),
                    stake_token: ALT_WETH_LP.to_string(),
                    reward_token: ALT.to_string(),
                    mode: PoolMode::LpShare,
                    reserve_basis: ReserveBasis::RawBalance,
                    dex_chain: "base".to_string(),
                    stake_pair: Some(PAIR_ALT_WETH.to_string()),
                    reward_pair: Some(PAIR_ALT_WETH.to_string()),
                    stake_decimals: None,
                    reward_decimals: None,
                },
                FarmDeployment {
                    name: "alt-usdc-drip".to_string(),
                    farm_address: "0xC2A0E92F1fc5c0191ef9787c7eB53cbB5D08d6E6".to_string(),
                    stake_token: ALT.to_string(),
                    reward_token: USDC_BASE.to_string(),
                    mode: PoolMode::StableDrip,
                    reserve_basis: ReserveBasis::NetOfAllocated,
                    dex_chain: "base".to_string(),
                    stake_pair: Some(PAIR_ALT_WETH.to_string()),
                    reward_pair: None,
                    stake_decimals: None,
                    reward_decimals: Some(6),
                },
            ],
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.farms.len(), 4);
    }

    #[test]
    fn test_farm_lookup() {
        let config = AppConfig::default();
        assert_eq!(config.farm("alt-weth-lp").unwrap().mode, PoolMode::LpShare);
        assert!(config.farm("no-such-farm").is_err());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut config = AppConfig::default();
        let copy = config.farms[0].clone();
        config.farms.push(copy);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_address_rejected() {
        let mut config = AppConfig::default();
        config.farms[0].farm_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lp_share_requires_stake_pair() {
        let mut config = AppConfig::default();
        let lp = config
            .farms
            .iter_mut()
            .find(|f| f.mode == PoolMode::LpShare)
            .unwrap();
        lp.stake_pair = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.farms.len(), config.farms.len());
        assert_eq!(parsed.farms[3].mode, PoolMode::StableDrip);
        assert_eq!(parsed.farms[3].reserve_basis, ReserveBasis::NetOfAllocated);
    }
}
