//! On-chain farm access - Multicall3 snapshot reads and transaction submission.
//!
//! One `aggregate3` batch per refresh cycle instead of a dozen individual
//! RPC calls. Every call in the batch allows failure: farms expose different
//! method subsets (rate-based vs drip-based, with or without the optional
//! accounting helpers), and a missing method is data, not an error.

use alloy_network::EthereumWallet;
use alloy_primitives::{address, Address, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::{FarmDeployment, PoolMode, ReserveBasis};
use crate::metrics::{RewardSchedule, StakeSnapshot};

// ============================================
// CONTRACT INTERFACES
// ============================================

sol! {
    /// Multicall3 - deployed at the same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }

    /// The union of the farm ABIs across deployments. Rate-based farms have
    /// rewardPerSecond; drip farms have the drip/reserve helpers instead,
    /// and unclaimedAllocated only exists on newer drip versions.
    interface IStakingFarm {
        function deposit(uint256 amount) external;
        function withdraw(uint256 amount) external;
        function claim() external;
        function emergencyWithdraw() external;

        function users(address account) external view returns (uint256 amount, uint256 rewardDebt);
        function pendingRewards(address account) external view returns (uint256);
        function totalStaked() external view returns (uint256);
        function rewardPerSecond() external view returns (uint256);

        function rewardBalance() external view returns (uint256);
        function reserveBalance() external view returns (uint256);
        function dailyDripEstimate() external view returns (uint256);
        function yearlyDripEstimate() external view returns (uint256);
        function unclaimedAllocated() external view returns (uint256);
    }

    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function symbol() external view returns (string);
    }
}

/// Multicall3 address (same on all EVM chains)
const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

// ============================================
// TYPES
// ============================================

/// Token metadata read once per run.
#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub stake_decimals: u8,
    pub reward_decimals: u8,
    pub stake_symbol: String,
    pub reward_symbol: String,
}

/// One refresh cycle's full farm reading: the metrics-engine snapshot plus
/// the drip-farm accounting extras.
#[derive(Debug, Clone)]
pub struct FarmReading {
    pub snapshot: StakeSnapshot,
    pub reward_balance: Option<U256>,
    /// Available rewards, with the deployment's reserve basis applied.
    pub available_rewards: Option<U256>,
    pub unclaimed_allocated: Option<U256>,
}

/// "Available rewards" per the deployment's configured basis. The raw basis
/// reports the contract balance as-is; the net basis subtracts allocated-but-
/// unclaimed rewards when the contract exposes that figure, and falls back
/// to the raw balance when it doesn't.
fn available_rewards(
    basis: ReserveBasis,
    reserve: Option<U256>,
    unclaimed: Option<U256>,
) -> Option<U256> {
    match basis {
        ReserveBasis::RawBalance => reserve,
        ReserveBasis::NetOfAllocated => match (reserve, unclaimed) {
            (Some(r), Some(u)) => Some(r.saturating_sub(u)),
            (Some(r), None) => Some(r),
            _ => None,
        },
    }
}

// ============================================
// FARM READER
// ============================================

pub struct FarmReader {
    rpc_url: String,
    farm: Address,
    stake_token: Address,
    reward_token: Address,
    mode: PoolMode,
    reserve_basis: ReserveBasis,
    stake_decimals_override: Option<u8>,
    reward_decimals_override: Option<u8>,
}

impl FarmReader {
    pub fn new(rpc_url: &str, deployment: &FarmDeployment) -> Result<Self> {
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            farm: deployment.farm_address()?,
            stake_token: deployment.stake_token()?,
            reward_token: deployment.reward_token()?,
            mode: deployment.mode,
            reserve_basis: deployment.reserve_basis,
            stake_decimals_override: deployment.stake_decimals,
            reward_decimals_override: deployment.reward_decimals,
        })
    }

    /// Execute a Multicall3 batch.
    async fn execute_multicall(
        &self,
        calls: Vec<IMulticall3::Call3>,
    ) -> Result<Vec<IMulticall3::Result>> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(MULTICALL3)
            .input(calldata.into());

        let result = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("multicall failed: {}", e))?;

        IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| eyre!("failed to decode multicall result: {}", e))
    }

    /// Read token decimals and symbols. Config overrides win; a missing
    /// symbol() gets a generic label instead of failing the run.
    pub async fn token_meta(&self) -> Result<TokenMeta> {
        let call = |target: Address, data: Vec<u8>| IMulticall3::Call3 {
            target,
            allowFailure: true,
            callData: data.into(),
        };

        let results = self
            .execute_multicall(vec![
                call(self.stake_token, IERC20::decimalsCall {}.abi_encode()),
                call(self.reward_token, IERC20::decimalsCall {}.abi_encode()),
                call(self.stake_token, IERC20::symbolCall {}.abi_encode()),
                call(self.reward_token, IERC20::symbolCall {}.abi_encode()),
            ])
            .await?;

        let stake_decimals = self
            .stake_decimals_override
            .or_else(|| decode_ok::<IERC20::decimalsCall>(&results[0]))
            .unwrap_or(18);
        let reward_decimals = self
            .reward_decimals_override
            .or_else(|| decode_ok::<IERC20::decimalsCall>(&results[1]))
            .unwrap_or(18);

        let fallback = if self.mode == PoolMode::LpShare { "LP" } else { "TOKEN" };
        let stake_symbol =
            decode_ok::<IERC20::symbolCall>(&results[2]).unwrap_or_else(|| fallback.to_string());
        let reward_symbol =
            decode_ok::<IERC20::symbolCall>(&results[3]).unwrap_or_else(|| "REWARD".to_string());

        debug!(
            stake = %stake_symbol, stake_decimals,
            reward = %reward_symbol, reward_decimals,
            "token metadata loaded"
        );

        Ok(TokenMeta {
            stake_decimals,
            reward_decimals,
            stake_symbol,
            reward_symbol,
        })
    }

    /// Read the whole farm state in one batch.
    pub async fn read(&self, user: Address, meta: &TokenMeta) -> Result<FarmReading> {
        let farm_call = |data: Vec<u8>| IMulticall3::Call3 {
            target: self.farm,
            allowFailure: true,
            callData: data.into(),
        };
        let stake_call = |data: Vec<u8>| IMulticall3::Call3 {
            target: self.stake_token,
            allowFailure: true,
            callData: data.into(),
        };

        let calls = vec![
            farm_call(IStakingFarm::usersCall { account: user }.abi_encode()),
            farm_call(IStakingFarm::pendingRewardsCall { account: user }.abi_encode()),
            farm_call(IStakingFarm::totalStakedCall {}.abi_encode()),
            stake_call(IERC20::balanceOfCall { account: user }.abi_encode()),
            farm_call(IStakingFarm::rewardPerSecondCall {}.abi_encode()),
            farm_call(IStakingFarm::dailyDripEstimateCall {}.abi_encode()),
            farm_call(IStakingFarm::yearlyDripEstimateCall {}.abi_encode()),
            stake_call(IERC20::totalSupplyCall {}.abi_encode()),
            farm_call(IStakingFarm::rewardBalanceCall {}.abi_encode()),
            farm_call(IStakingFarm::reserveBalanceCall {}.abi_encode()),
            farm_call(IStakingFarm::unclaimedAllocatedCall {}.abi_encode()),
        ];

        let results = self.execute_multicall(calls).await?;
        if results.len() != 11 {
            return Err(eyre!("multicall returned {} results, expected 11", results.len()));
        }

        let user_record = decode_ok::<IStakingFarm::usersCall>(&results[0]);
        let user_staked = user_record.as_ref().map(|u| u.amount).unwrap_or_default();
        let pending_rewards =
            decode_ok::<IStakingFarm::pendingRewardsCall>(&results[1]).unwrap_or_default();
        let total_staked =
            decode_ok::<IStakingFarm::totalStakedCall>(&results[2]).unwrap_or_default();
        let wallet_balance = decode_ok::<IERC20::balanceOfCall>(&results[3]).unwrap_or_default();

        let schedule = match self.mode {
            PoolMode::StableDrip => RewardSchedule::Drip {
                per_day: decode_ok::<IStakingFarm::dailyDripEstimateCall>(&results[5])
                    .unwrap_or_default(),
                per_year: decode_ok::<IStakingFarm::yearlyDripEstimateCall>(&results[6])
                    .unwrap_or_default(),
            },
            PoolMode::DirectRate | PoolMode::LpShare => {
                let rate = decode_ok::<IStakingFarm::rewardPerSecondCall>(&results[4]);
                if rate.is_none() {
                    warn!(farm = %self.farm, "rewardPerSecond() unavailable, emissions read as 0");
                }
                RewardSchedule::RatePerSecond(rate.unwrap_or_default())
            }
        };

        let lp_total_supply = if self.mode == PoolMode::LpShare {
            decode_ok::<IERC20::totalSupplyCall>(&results[7])
        } else {
            None
        };

        let reward_balance = decode_ok::<IStakingFarm::rewardBalanceCall>(&results[8]);
        let reserve = decode_ok::<IStakingFarm::reserveBalanceCall>(&results[9]);
        let unclaimed_allocated = decode_ok::<IStakingFarm::unclaimedAllocatedCall>(&results[10]);

        Ok(FarmReading {
            snapshot: StakeSnapshot {
                user_staked,
                total_staked,
                wallet_balance,
                pending_rewards,
                schedule,
                stake_decimals: meta.stake_decimals,
                reward_decimals: meta.reward_decimals,
                lp_total_supply,
            },
            reward_balance,
            available_rewards: available_rewards(self.reserve_basis, reserve, unclaimed_allocated),
            unclaimed_allocated,
        })
    }
}

/// Decode a successful multicall leg; a failed or empty leg is `None`.
fn decode_ok<C: SolCall>(result: &IMulticall3::Result) -> Option<C::Return> {
    if !result.success || result.returnData.is_empty() {
        return None;
    }
    C::abi_decode_returns(&result.returnData).ok()
}

// ============================================
// FARM EXECUTOR (deposit / withdraw / claim)
// ============================================

pub struct FarmExecutor {
    rpc_url: String,
    farm: Address,
    stake_token: Address,
    signer: PrivateKeySigner,
}

impl FarmExecutor {
    /// Build an executor from the PRIVATE_KEY environment variable.
    pub fn from_env(rpc_url: &str, deployment: &FarmDeployment) -> Result<Self> {
        let key = std::env::var("PRIVATE_KEY")
            .map_err(|_| eyre!("PRIVATE_KEY not set - required for transactions"))?;
        let signer = PrivateKeySigner::from_str(key.trim_start_matches("0x"))
            .map_err(|e| eyre!("failed to parse PRIVATE_KEY: {}", e))?;

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            farm: deployment.farm_address()?,
            stake_token: deployment.stake_token()?,
            signer,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn provider(&self) -> Result<impl Provider + Clone> {
        let wallet = EthereumWallet::from(self.signer.clone());
        Ok(ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.parse()?))
    }

    /// Approve the farm for `amount` of the stake token if the current
    /// allowance is short.
    pub async fn approve_if_needed(&self, amount: U256) -> Result<()> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let allowance_call = IERC20::allowanceCall {
            owner: self.address(),
            spender: self.farm,
        };
        let tx = TransactionRequest::default()
            .to(self.stake_token)
            .input(allowance_call.abi_encode().into());
        let raw = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("allowance read failed: {}", e))?;
        let allowance = IERC20::allowanceCall::abi_decode_returns(&raw)
            .map_err(|e| eyre!("failed to decode allowance: {}", e))?;

        if allowance >= amount {
            debug!("allowance sufficient, skipping approve");
            return Ok(());
        }

        info!("approving farm for stake token");
        let approve = IERC20::approveCall {
            spender: self.farm,
            amount,
        };
        self.send(self.stake_token, approve.abi_encode()).await?;
        Ok(())
    }

    pub async fn deposit(&self, amount: U256) -> Result<B256> {
        self.approve_if_needed(amount).await?;
        self.send(self.farm, IStakingFarm::depositCall { amount }.abi_encode())
            .await
    }

    pub async fn withdraw(&self, amount: U256) -> Result<B256> {
        self.send(self.farm, IStakingFarm::withdrawCall { amount }.abi_encode())
            .await
    }

    pub async fn claim(&self) -> Result<B256> {
        self.send(self.farm, IStakingFarm::claimCall {}.abi_encode())
            .await
    }

    /// Exit the farm forfeiting pending rewards. Callers must confirm first.
    pub async fn emergency_withdraw(&self) -> Result<B256> {
        self.send(self.farm, IStakingFarm::emergencyWithdrawCall {}.abi_encode())
            .await
    }

    /// Submit a transaction and wait for its receipt; a reverted receipt is
    /// an error.
    async fn send(&self, to: Address, calldata: Vec<u8>) -> Result<B256> {
        let provider = self.provider()?;

        let tx = TransactionRequest::default()
            .from(self.address())
            .to(to)
            .input(calldata.into());

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| eyre!("transaction submission failed: {}", e))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| eyre!("failed waiting for receipt: {}", e))?;

        if !receipt.status() {
            return Err(eyre!(
                "transaction reverted (tx: {:?}, gas used: {:?})",
                receipt.transaction_hash,
                receipt.gas_used
            ));
        }

        info!("confirmed: {:?}", receipt.transaction_hash);
        Ok(receipt.transaction_hash)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_rewards_raw_basis() {
        let reserve = Some(U256::from(1000));
        let unclaimed = Some(U256::from(300));
        assert_eq!(
            available_rewards(ReserveBasis::RawBalance, reserve, unclaimed),
            Some(U256::from(1000))
        );
        assert_eq!(available_rewards(ReserveBasis::RawBalance, None, unclaimed), None);
    }

    #[test]
    fn test_available_rewards_net_basis() {
        let reserve = Some(U256::from(1000));
        assert_eq!(
            available_rewards(ReserveBasis::NetOfAllocated, reserve, Some(U256::from(300))),
            Some(U256::from(700))
        );
        // contract without unclaimedAllocated(): fall back to the raw figure
        assert_eq!(
            available_rewards(ReserveBasis::NetOfAllocated, reserve, None),
            Some(U256::from(1000))
        );
        // never underflow
        assert_eq!(
            available_rewards(ReserveBasis::NetOfAllocated, reserve, Some(U256::from(2000))),
            Some(U256::ZERO)
        );
    }

    #[test]
    fn test_decode_failed_leg_is_none() {
        let failed = IMulticall3::Result {
            success: false,
            returnData: vec![0u8; 32].into(),
        };
        assert_eq!(decode_ok::<IStakingFarm::totalStakedCall>(&failed), None);

        let empty = IMulticall3::Result {
            success: true,
            returnData: Vec::new().into(),
        };
        assert_eq!(decode_ok::<IStakingFarm::totalStakedCall>(&empty), None);
    }

    #[test]
    fn test_decode_uint_leg() {
        let value = U256::from(42u64);
        let ok = IMulticall3::Result {
            success: true,
            returnData: value.to_be_bytes::<32>().to_vec().into(),
        };
        assert_eq!(decode_ok::<IStakingFarm::totalStakedCall>(&ok), Some(value));
    }
}
