//! Spot price cache - DexScreener pair API.
//!
//! Fetches the tracked token's USD price (and the pool's liquidity figure)
//! from the DexScreener pair endpoint, throttled to one fetch per cooldown
//! window. A failed fetch never clears the cache: the last good quote keeps
//! flowing into the metrics engine and the status line says we'll retry.
//!
//! API: https://api.dexscreener.com/latest/dex/pairs/{chain}/{pair}

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

// ============================================
// CONSTANTS
// ============================================

/// DexScreener pair endpoint base URL
const DEXSCREENER_API_URL: &str = "https://api.dexscreener.com/latest/dex/pairs";

/// Minimum interval between fetches (avoid hammering the API)
pub const PRICE_COOLDOWN_MS: u64 = 10_000;

/// Timeout for API calls
const API_TIMEOUT_SECS: u64 = 5;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct PairResponse {
    pair: Option<DexPair>,
}

/// The subset of a DexScreener pair payload the engine consumes.
/// `priceUsd` is the USD price of the pair's *base* token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub price_usd: Option<String>,
    pub liquidity: Option<PairLiquidity>,
    pub base_token: Option<PairLeg>,
    pub quote_token: Option<PairLeg>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairLiquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairLeg {
    pub address: Option<String>,
    /// Per-leg USD price; only present in newer feeds.
    pub price_usd: Option<String>,
}

/// External price API failure. Always recovered locally - the cache keeps
/// its last good quote and the next timer tick retries.
#[derive(Debug, Error)]
pub enum PriceFetchError {
    #[error("price API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("price API returned HTTP {0}")]
    Status(u16),

    #[error("price API response missing pair")]
    MissingPair,
}

// ============================================
// CACHED QUOTE
// ============================================

/// Last good fetch result. Replaced as a whole so a concurrent reader never
/// sees a price from one fetch with a timestamp from another.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceQuote {
    /// USD price of the tracked token.
    pub token_price_usd: Option<f64>,
    /// `liquidity.usd` of the pair - the pool's figure, not the farm TVL.
    pub pool_liquidity_usd: Option<f64>,
    /// Epoch millis of the last successful fetch; 0 before the first one.
    pub fetched_at_ms: u64,
}

/// What a `refresh` call did, for the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fetched and replaced the quote.
    Updated,
    /// Inside the cooldown window; nothing happened.
    Throttled,
    /// Fetch failed; last good quote retained.
    Failed,
}

// ============================================
// PRICE CACHE
// ============================================

pub struct PriceCache {
    http_client: Client,
    /// DexScreener chain slug, e.g. "base".
    chain: String,
    /// Trading-pair contract address the API is keyed by.
    pair_address: String,
    /// Token whose USD price we want out of the pair, lowercase hex.
    tracked_token: String,
    quote: RwLock<PriceQuote>,
}

impl PriceCache {
    pub fn new(chain: &str, pair_address: &str, tracked_token: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            chain: chain.to_string(),
            pair_address: pair_address.to_string(),
            tracked_token: tracked_token.to_lowercase(),
            quote: RwLock::new(PriceQuote::default()),
        }
    }

    /// Current quote, possibly stale, possibly empty before the first fetch.
    pub async fn quote(&self) -> PriceQuote {
        *self.quote.read().await
    }

    pub async fn is_throttled(&self, now_ms: u64) -> bool {
        let q = self.quote.read().await;
        now_ms.saturating_sub(q.fetched_at_ms) < PRICE_COOLDOWN_MS
    }

    /// Fetch a fresh quote unless the last successful fetch was less than
    /// the cooldown ago. Failures are soft: logged, reported in the outcome,
    /// and the cached quote is left untouched.
    pub async fn refresh(&self, now_ms: u64) -> RefreshOutcome {
        if self.is_throttled(now_ms).await {
            trace!(pair = %self.pair_address, "price refresh throttled");
            return RefreshOutcome::Throttled;
        }

        match self.fetch_pair().await {
            Ok(pair) => {
                self.apply(now_ms, &pair).await;
                RefreshOutcome::Updated
            }
            Err(e) => {
                warn!(pair = %self.pair_address, "price update failed (will retry): {e}");
                RefreshOutcome::Failed
            }
        }
    }

    async fn fetch_pair(&self) -> Result<DexPair, PriceFetchError> {
        let url = format!(
            "{}/{}/{}",
            DEXSCREENER_API_URL, self.chain, self.pair_address
        );

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceFetchError::Status(response.status().as_u16()));
        }

        let body: PairResponse = response.json().await?;
        body.pair.ok_or(PriceFetchError::MissingPair)
    }

    /// Replace the cached quote from a successfully fetched pair. Both
    /// fields and the timestamp change together under one write guard.
    pub(crate) async fn apply(&self, now_ms: u64, pair: &DexPair) {
        let token_price_usd = resolve_token_price(pair, &self.tracked_token);
        let pool_liquidity_usd = pair
            .liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .filter(|v| v.is_finite() && *v > 0.0);

        debug!(
            pair = %self.pair_address,
            price = ?token_price_usd,
            liquidity = ?pool_liquidity_usd,
            "price quote updated"
        );

        let mut quote = self.quote.write().await;
        *quote = PriceQuote {
            token_price_usd,
            pool_liquidity_usd,
            fetched_at_ms: now_ms,
        };
    }
}

/// Pick the tracked token's USD price out of a pair payload.
///
/// `priceUsd` quotes the pair's base token, so match the tracked address
/// (case-insensitive) against the base leg first, then the quote leg's own
/// USD figure when the feed carries one. When neither leg matches - or the
/// quote leg has no price of its own - fall back to the pair's primary
/// `priceUsd`. The fallback is a known best-effort approximation for
/// token/WETH pairs and is intentionally kept.
pub fn resolve_token_price(pair: &DexPair, tracked_token: &str) -> Option<f64> {
    let tracked = tracked_token.to_lowercase();
    let leg_addr = |leg: &Option<PairLeg>| {
        leg.as_ref()
            .and_then(|l| l.address.as_ref())
            .map(|a| a.to_lowercase())
    };

    let primary = parse_price(&pair.price_usd);

    if leg_addr(&pair.base_token).as_deref() == Some(tracked.as_str()) {
        return primary;
    }

    if leg_addr(&pair.quote_token).as_deref() == Some(tracked.as_str()) {
        let quote_usd = pair
            .quote_token
            .as_ref()
            .and_then(|l| parse_price(&l.price_usd));
        return quote_usd.or(primary);
    }

    primary
}

fn parse_price(raw: &Option<String>) -> Option<f64> {
    raw.as_ref()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// ============================================
// TESTS
// ============================================
