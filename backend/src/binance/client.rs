// =============================================================================
// Binance REST API Client — public market data
// =============================================================================
//
// Only unsigned endpoints are used: `/api/v3/klines` for history and
// `/api/v3/ticker/24hr` for the latest price and volume. Each request is
// charged against the minute weight budget first and refused locally when
// the budget is spent; responses report the server's figure back.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::binance::rate_limit::RateLimitTracker;
use crate::interfaces::{MarketFeed, Quote};
use crate::market_data::Candle;
use crate::types::Timeframe;

const BASE_URL: &str = "https://api.binance.com";

/// Documented request weights.
const KLINES_WEIGHT: u32 = 2;
const TICKER_24H_WEIGHT: u32 = 2;

#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(rate_limit: Arc<RateLimitTracker>) -> Result<Self> {
        Self::with_base_url(BASE_URL, rate_limit)
    }

    pub fn with_base_url(base_url: impl Into<String>, rate_limit: Arc<RateLimitTracker>) -> Result<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit,
        })
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    /// GET `path` with `query`, update the weight tracker, and return the JSON
    /// body of a successful response.
    async fn get_json(&self, path: &str, query: &[(&str, String)], weight: u32) -> Result<serde_json::Value> {
        if !self.rate_limit.try_acquire(weight, chrono::Utc::now().timestamp()) {
            anyhow::bail!("Binance GET {path} skipped: request weight budget exhausted");
        }

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;

        self.rate_limit.observe_headers(resp.headers(), chrono::Utc::now().timestamp());

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            warn!(%status, ?retry_after, path, "Binance rate limit hit");
            anyhow::bail!("Binance GET {path} rate limited ({status}), retry after {retry_after:?}s");
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {path} response"))?;

        if !status.is_success() {
            anyhow::bail!("Binance GET {path} returned {status}: {body}");
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines, oldest first.
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>> {
        let query = [
            ("symbol", symbol.to_uppercase()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.clamp(1, 1000).to_string()),
        ];
        let body = self.get_json("/api/v3/klines", &query, KLINES_WEIGHT).await?;
        let candles = parse_klines(&body)?;
        debug!(symbol, %timeframe, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /api/v3/ticker/24hr: last price and 24h base volume.
    #[instrument(skip(self), name = "binance::get_ticker_24h")]
    pub async fn get_ticker_24h(&self, symbol: &str) -> Result<Quote> {
        let query = [("symbol", symbol.to_uppercase())];
        let body = self.get_json("/api/v3/ticker/24hr", &query, TICKER_24H_WEIGHT).await?;
        parse_ticker(&body)
    }
}

#[async_trait]
impl MarketFeed for BinanceClient {
    async fn fetch_latest(&self, symbol: &str) -> Result<Quote> {
        self.get_ticker_24h(symbol).await
    }

    async fn fetch_history(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>> {
        self.get_klines(symbol, timeframe, limit).await
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Response parsing
// -----------------------------------------------------------------------------

/// Parse Binance's array-of-arrays kline payload.
///
/// Array indices:
///   [0] openTime (ms), [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, ...
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;
        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time_ms = arr[0].as_i64().context("kline open time is not an integer")?;
        candles.push(Candle::new(
            open_time_ms / 1000,
            parse_str_f64(&arr[1])?,
            parse_str_f64(&arr[2])?,
            parse_str_f64(&arr[3])?,
            parse_str_f64(&arr[4])?,
            parse_str_f64(&arr[5])?,
        ));
    }
    Ok(candles)
}

pub fn parse_ticker(body: &serde_json::Value) -> Result<Quote> {
    let price = parse_str_f64(body.get("lastPrice").context("ticker missing 'lastPrice'")?)?;
    let volume = parse_str_f64(body.get("volume").context("ticker missing 'volume'")?)?;
    Ok(Quote { price, volume })
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_kline_rows() {
        let body = json!([
            [1_700_000_000_000i64, "100.0", "101.5", "99.5", "101.0", "1234.5", 1_700_003_599_999i64, "0", 10, "0", "0", "0"],
            [1_700_003_600_000i64, "101.0", "102.0", "100.5", "100.8", "999", 1_700_007_199_999i64, "0", 10, "0", "0", "0"]
        ]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0], Candle::new(1_700_000_000, 100.0, 101.5, 99.5, 101.0, 1234.5));
        assert_eq!(candles[1].timestamp, 1_700_003_600);
        assert!(candles[1].is_bearish());
    }

    #[test]
    fn short_rows_are_skipped() {
        let body = json!([[1_700_000_000_000i64, "1"], [1_700_000_000_000i64, "1", "2", "0.5", "1.5", "10"]]);
        assert_eq!(parse_klines(&body).unwrap().len(), 1);
    }

    #[test]
    fn rejects_non_array_payload() {
        let body = json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(parse_klines(&body).is_err());
    }

    #[test]
    fn parses_ticker() {
        let body = json!({"symbol": "BTCUSDT", "lastPrice": "65000.10", "volume": "1200.5"});
        let quote = parse_ticker(&body).unwrap();
        assert_eq!(quote, Quote { price: 65000.10, volume: 1200.5 });
        assert!(parse_ticker(&json!({"lastPrice": "1"})).is_err());
        assert!(parse_ticker(&json!({"lastPrice": "abc", "volume": "1"})).is_err());
    }

    #[tokio::test]
    async fn exhausted_budget_refuses_locally() {
        let tracker = Arc::new(RateLimitTracker::new());
        tracker.observe(1000, chrono::Utc::now().timestamp());
        let client = BinanceClient::with_base_url("http://127.0.0.1:9", tracker).unwrap();
        let err = client.get_ticker_24h("BTCUSDT").await.unwrap_err();
        assert!(err.to_string().contains("budget exhausted"));
    }
}
