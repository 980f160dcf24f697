//! farmdeck - terminal dashboard and transaction CLI for staking farms
//!
//! Run with: cargo run -- watch --farm alt-weth-lp
//!
//! Each refresh cycle fetches spot prices (throttled, cached), reads the
//! farm in one multicall batch, computes TVL/APR/LP-price, and renders a
//! dashboard. Deposits/withdraws/claims go through PRIVATE_KEY.

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use console::style;
use eyre::{eyre, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod display;
mod farm;
mod metrics;
mod price;
mod units;

use config::{AppConfig, FarmDeployment};
use farm::{FarmExecutor, FarmReader, TokenMeta};
use metrics::PriceBoard;
use price::{PriceCache, RefreshOutcome};

// ============================================
// CLI
// ============================================

#[derive(Parser)]
#[command(name = "farmdeck", version, about = "Staking farm dashboard and transaction CLI")]
struct Cli {
    /// Path to the config file (default: ./farmdeck.toml, or built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the built-in default config to farmdeck.toml for editing
    Init,

    /// List the configured farm deployments
    List,

    /// One refresh cycle: prices, on-chain reads, metrics, dashboard
    Status {
        #[arg(long)]
        farm: String,
        /// Wallet address for the user rows (default: WALLET_ADDRESS or
        /// the PRIVATE_KEY address)
        #[arg(long)]
        address: Option<String>,
    },

    /// Refresh on a fixed cadence until interrupted
    Watch {
        #[arg(long)]
        farm: String,
        #[arg(long)]
        address: Option<String>,
        /// Seconds between cycles (default from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Stake an amount (approves the farm first if needed)
    Deposit {
        #[arg(long)]
        farm: String,
        amount: String,
    },

    /// Unstake an amount
    Withdraw {
        #[arg(long)]
        farm: String,
        amount: String,
    },

    /// Claim pending rewards
    Claim {
        #[arg(long)]
        farm: String,
    },

    /// Exit the farm forfeiting pending rewards
    EmergencyWithdraw {
        #[arg(long)]
        farm: String,
        /// Required: confirms you accept forfeiting pending rewards
        #[arg(long)]
        yes: bool,
    },
}

// ============================================
// FARM SESSION
// ============================================

/// Everything one farm needs per refresh cycle: the reader, the token
/// metadata (read once), and the price caches owned for the session.
struct FarmSession {
    deployment: FarmDeployment,
    reader: FarmReader,
    meta: TokenMeta,
    stake_cache: Option<PriceCache>,
    reward_cache: Option<PriceCache>,
    display_decimals: u8,
    user: Address,
}

impl FarmSession {
    async fn open(config: &AppConfig, farm_name: &str, address: Option<&str>) -> Result<Self> {
        let deployment = config.farm(farm_name)?.clone();
        let reader = FarmReader::new(&config.rpc_url, &deployment)?;
        let meta = reader.token_meta().await?;

        let stake_cache = deployment
            .stake_pair
            .as_deref()
            .map(|pair| PriceCache::new(&deployment.dex_chain, pair, &deployment.stake_token));
        let reward_cache = deployment
            .reward_pair
            .as_deref()
            .map(|pair| PriceCache::new(&deployment.dex_chain, pair, &deployment.reward_token));

        let user = resolve_user(address)?;
        if user == Address::ZERO {
            info!("no wallet address configured - user rows will read as zero");
        }

        Ok(Self {
            deployment,
            reader,
            meta,
            stake_cache,
            reward_cache,
            display_decimals: config.display_decimals,
            user,
        })
    }

    /// One refresh cycle: throttled price refresh, one multicall read,
    /// pure metrics computation, render. Nothing here is fatal to a watch
    /// loop except the render data being unreadable on-chain.
    async fn refresh_cycle(&self) -> Result<()> {
        let now = price::now_ms();

        let mut outcomes: Vec<RefreshOutcome> = Vec::new();
        if let Some(cache) = &self.stake_cache {
            outcomes.push(cache.refresh(now).await);
        }
        if let Some(cache) = &self.reward_cache {
            outcomes.push(cache.refresh(now).await);
        }

        let (board, newest_fetch_ms) = self.price_board().await;
        let reading = self.reader.read(self.user, &self.meta).await?;
        let computed = metrics::compute(self.deployment.mode, &reading.snapshot, &board);

        let status = display::price_status(&outcomes, newest_fetch_ms);
        display::print_dashboard(
            &self.deployment,
            &self.meta,
            &reading,
            &computed,
            self.display_decimals,
            &status,
        );
        Ok(())
    }

    /// Assemble the metrics-engine price inputs from the caches. Stale
    /// quotes are used as-is; staleness beats a blank display.
    async fn price_board(&self) -> (PriceBoard, u64) {
        let stake_quote = match &self.stake_cache {
            Some(c) => Some(c.quote().await),
            None => None,
        };
        let reward_quote = match &self.reward_cache {
            Some(c) => Some(c.quote().await),
            None => None,
        };

        let newest_fetch_ms = stake_quote
            .map(|q| q.fetched_at_ms)
            .into_iter()
            .chain(reward_quote.map(|q| q.fetched_at_ms))
            .max()
            .unwrap_or(0);

        let board = PriceBoard {
            stake_price_usd: stake_quote.and_then(|q| q.token_price_usd),
            reward_price_usd: reward_quote.and_then(|q| q.token_price_usd),
            pool_liquidity_usd: stake_quote.and_then(|q| q.pool_liquidity_usd),
        };

        (board, newest_fetch_ms)
    }
}

/// Wallet identity for the user rows: explicit flag, then WALLET_ADDRESS,
/// then the PRIVATE_KEY address, then the zero address (global stats only).
fn resolve_user(flag: Option<&str>) -> Result<Address> {
    if let Some(raw) = flag {
        return Address::from_str(raw).map_err(|_| eyre!("invalid --address: {}", raw));
    }
    if let Ok(raw) = std::env::var("WALLET_ADDRESS") {
        return Address::from_str(&raw).map_err(|_| eyre!("invalid WALLET_ADDRESS: {}", raw));
    }
    if let Ok(key) = std::env::var("PRIVATE_KEY") {
        if let Ok(signer) = PrivateKeySigner::from_str(key.trim_start_matches("0x")) {
            return Ok(signer.address());
        }
    }
    Ok(Address::ZERO)
}

// ============================================
// COMMANDS
// ============================================

async fn cmd_watch(
    config: &AppConfig,
    farm_name: &str,
    address: Option<&str>,
    interval_override: Option<u64>,
) -> Result<()> {
    let session = FarmSession::open(config, farm_name, address).await?;
    let interval_secs = interval_override.unwrap_or(config.refresh_interval_secs).max(1);

    info!(
        "watching '{}' every {}s (ctrl-c to stop)",
        farm_name, interval_secs
    );

    // Cycles are driven sequentially, but the guard keeps a slow cycle from
    // ever overlapping a new tick if this loop is later spawned per farm.
    let in_flight = AtomicBool::new(false);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;

        if in_flight.swap(true, Ordering::SeqCst) {
            debug!("refresh already in flight, skipping tick");
            continue;
        }
        if let Err(e) = session.refresh_cycle().await {
            warn!("refresh failed, retrying next tick: {e}");
        }
        in_flight.store(false, Ordering::SeqCst);
    }
}

async fn cmd_deposit(config: &AppConfig, farm_name: &str, amount: &str) -> Result<()> {
    let deployment = config.farm(farm_name)?.clone();
    let reader = FarmReader::new(&config.rpc_url, &deployment)?;
    let meta = reader.token_meta().await?;

    // Validated before any on-chain call; a bad amount aborts right here.
    let base_units = units::parse_positive_base_units(amount, meta.stake_decimals)?;

    let executor = FarmExecutor::from_env(&config.rpc_url, &deployment)?;
    info!(
        "depositing {} {} into '{}'",
        amount, meta.stake_symbol, farm_name
    );
    let tx = executor.deposit(base_units).await?;
    println!(
        "{} deposit confirmed: {:?}",
        style("✓").green(),
        tx
    );

    show_post_tx_status(config, farm_name).await
}

async fn cmd_withdraw(config: &AppConfig, farm_name: &str, amount: &str) -> Result<()> {
    let deployment = config.farm(farm_name)?.clone();
    let reader = FarmReader::new(&config.rpc_url, &deployment)?;
    let meta = reader.token_meta().await?;

    let base_units = units::parse_positive_base_units(amount, meta.stake_decimals)?;

    let executor = FarmExecutor::from_env(&config.rpc_url, &deployment)?;
    info!(
        "withdrawing {} {} from '{}'",
        amount, meta.stake_symbol, farm_name
    );
    let tx = executor.withdraw(base_units).await?;
    println!(
        "{} withdraw confirmed: {:?}",
        style("✓").green(),
        tx
    );

    show_post_tx_status(config, farm_name).await
}

async fn cmd_claim(config: &AppConfig, farm_name: &str) -> Result<()> {
    let deployment = config.farm(farm_name)?.clone();
    let executor = FarmExecutor::from_env(&config.rpc_url, &deployment)?;
    info!("claiming rewards from '{}'", farm_name);
    let tx = executor.claim().await?;
    println!("{} claim confirmed: {:?}", style("✓").green(), tx);

    show_post_tx_status(config, farm_name).await
}

async fn cmd_emergency_withdraw(config: &AppConfig, farm_name: &str, yes: bool) -> Result<()> {
    if !yes {
        return Err(eyre!(
            "emergency withdraw forfeits all pending rewards; pass --yes to confirm"
        ));
    }

    let deployment = config.farm(farm_name)?.clone();
    let executor = FarmExecutor::from_env(&config.rpc_url, &deployment)?;
    warn!("emergency withdraw from '{}' - pending rewards are forfeited", farm_name);
    let tx = executor.emergency_withdraw().await?;
    println!(
        "{} emergency withdraw confirmed: {:?}",
        style("✓").green(),
        tx
    );

    show_post_tx_status(config, farm_name).await
}

/// Show the fresh state after a confirmed transaction, like the pages did.
/// Best-effort: the transaction already succeeded.
async fn show_post_tx_status(config: &AppConfig, farm_name: &str) -> Result<()> {
    match FarmSession::open(config, farm_name, None).await {
        Ok(session) => {
            if let Err(e) = session.refresh_cycle().await {
                warn!("post-transaction refresh failed: {e}");
            }
        }
        Err(e) => warn!("post-transaction refresh failed: {e}"),
    }
    Ok(())
}

// ============================================
// MAIN
// ============================================

fn print_banner() {
    println!();
    println!(
        "{}",
        style("farmdeck · staking farm dashboard").cyan().bold()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("farmdeck=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // init runs before config loading: its whole point is that the file
    // does not exist yet.
    if let Command::Init = cli.command {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("farmdeck.toml"));
        if path.exists() {
            return Err(eyre!("{} already exists, refusing to overwrite", path.display()));
        }
        AppConfig::default().save_to_file(&path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    print_banner();

    match cli.command {
        Command::Init => unreachable!(),
        Command::List => {
            display::print_farm_list(&config.farms);
            Ok(())
        }
        Command::Status { farm, address } => {
            let session = FarmSession::open(&config, &farm, address.as_deref()).await?;
            session.refresh_cycle().await
        }
        Command::Watch {
            farm,
            address,
            interval,
        } => cmd_watch(&config, &farm, address.as_deref(), interval).await,
        Command::Deposit { farm, amount } => cmd_deposit(&config, &farm, &amount).await,
        Command::Withdraw { farm, amount } => cmd_withdraw(&config, &farm, &amount).await,
        Command::Claim { farm } => cmd_claim(&config, &farm).await,
        Command::EmergencyWithdraw { farm, yes } => {
            cmd_emergency_withdraw(&config, &farm, yes).await
        }
    }
}

// ============================================
// TESTS
// ============================================
