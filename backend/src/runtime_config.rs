// =============================================================================
// Relay Configuration — JSON settings with atomic save
// =============================================================================
//
// Every tunable of the collector, analyzer, and dispatcher lives here. All
// fields carry a serde default so an older or partial file still loads.
// Persistence uses the tmp + rename pattern.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::AnalyzerConfig;

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "SOLUSDT".to_string(),
        "XRPUSDT".to_string(),
    ]
}

fn default_reference_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_store_path() -> String {
    "relay_store.json".to_string()
}

fn default_collector_interval_secs() -> u64 {
    60
}

fn default_collector_error_backoff_secs() -> u64 {
    60
}

fn default_dispatch_interval_secs() -> u64 {
    60
}

fn default_startup_delay_secs() -> u64 {
    20
}

fn default_cooldown_secs() -> i64 {
    4 * 3600
}

fn default_max_signals_per_day() -> u32 {
    3
}

fn default_min_confidence() -> u8 {
    80
}

fn default_series_capacity() -> usize {
    500
}

fn default_price_cache_ttl_secs() -> u64 {
    30
}

fn default_backfill_candles() -> u32 {
    100
}

fn default_request_throttle_ms() -> u64 {
    300
}

fn default_send_throttle_ms() -> u64 {
    50
}

fn default_delivery_max_attempts() -> u32 {
    3
}

fn default_max_retry_wait_secs() -> u64 {
    60
}

// =============================================================================
// RelayConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    // --- Symbols ------------------------------------------------------------

    /// Pairs always collected, whether or not anyone subscribes.
    #[serde(default = "default_symbols")]
    pub default_symbols: Vec<String>,

    /// Market-wide context symbol; always collected.
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: String,

    // --- Surfaces -----------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON file backing subscribers and the signal log.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    // --- Collector ----------------------------------------------------------

    #[serde(default = "default_collector_interval_secs")]
    pub collector_interval_secs: u64,

    /// Sleep after an unexpected collector failure.
    #[serde(default = "default_collector_error_backoff_secs")]
    pub collector_error_backoff_secs: u64,

    /// Historical candles requested per (symbol, timeframe) at backfill.
    #[serde(default = "default_backfill_candles")]
    pub backfill_candles: u32,

    /// Pause between consecutive market-data requests.
    #[serde(default = "default_request_throttle_ms")]
    pub request_throttle_ms: u64,

    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,

    #[serde(default = "default_price_cache_ttl_secs")]
    pub price_cache_ttl_secs: u64,

    // --- Analyzer -----------------------------------------------------------

    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,

    /// Judge the reference symbol's 24h move instead of always passing the
    /// market-context condition.
    #[serde(default)]
    pub market_context_filter: bool,

    // --- Dispatcher ---------------------------------------------------------

    #[serde(default = "default_dispatch_interval_secs")]
    pub dispatch_interval_secs: u64,

    /// Delay before the first dispatch cycle so backfill can land.
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// Minimum seconds between two dispatches of the same symbol.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,

    /// Per-symbol dispatches allowed per UTC day.
    #[serde(default = "default_max_signals_per_day")]
    pub max_signals_per_day: u32,

    /// Pause between deliveries to consecutive subscribers.
    #[serde(default = "default_send_throttle_ms")]
    pub send_throttle_ms: u64,

    /// Attempts per subscriber when delivery is throttled (first try included).
    #[serde(default = "default_delivery_max_attempts")]
    pub delivery_max_attempts: u32,

    /// Throttle waits longer than this give up instead of sleeping.
    #[serde(default = "default_max_retry_wait_secs")]
    pub max_retry_wait_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_symbols: default_symbols(),
            reference_symbol: default_reference_symbol(),
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
            collector_interval_secs: default_collector_interval_secs(),
            collector_error_backoff_secs: default_collector_error_backoff_secs(),
            backfill_candles: default_backfill_candles(),
            request_throttle_ms: default_request_throttle_ms(),
            series_capacity: default_series_capacity(),
            price_cache_ttl_secs: default_price_cache_ttl_secs(),
            min_confidence: default_min_confidence(),
            market_context_filter: false,
            dispatch_interval_secs: default_dispatch_interval_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            cooldown_secs: default_cooldown_secs(),
            max_signals_per_day: default_max_signals_per_day(),
            send_throttle_ms: default_send_throttle_ms(),
            delivery_max_attempts: default_delivery_max_attempts(),
            max_retry_wait_secs: default_max_retry_wait_secs(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing or malformed file is an error; the caller decides whether to
    /// fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read relay config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse relay config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.default_symbols,
            reference = %config.reference_symbol,
            "relay config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` via a `.tmp` sibling and rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise relay config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "relay config saved (atomic)");
        Ok(())
    }

    /// Apply `RELAY_*` environment overrides. `lookup` reads the environment
    /// in production.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(syms) = lookup("RELAY_SYMBOLS") {
            let parsed = parse_symbol_list(&syms);
            if !parsed.is_empty() {
                self.default_symbols = parsed;
            }
        }
        if let Some(addr) = lookup("RELAY_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup("RELAY_STORE_PATH") {
            self.store_path = path;
        }
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            min_confidence: self.min_confidence,
            market_context_filter: self.market_context_filter,
        }
    }
}

/// Comma-separated, trimmed, upper-cased, empties dropped.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.default_symbols.len(), 5);
        assert_eq!(cfg.reference_symbol, "BTCUSDT");
        assert_eq!(cfg.series_capacity, 500);
        assert_eq!(cfg.price_cache_ttl_secs, 30);
        assert_eq!(cfg.backfill_candles, 100);
        assert_eq!(cfg.dispatch_interval_secs, 60);
        assert_eq!(cfg.min_confidence, 80);
        assert!(!cfg.market_context_filter);
        assert!(cfg.delivery_max_attempts >= 1);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.cooldown_secs, 4 * 3600);
        assert_eq!(cfg.request_throttle_ms, 300);
        assert_eq!(cfg.store_path, "relay_store.json");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "default_symbols": ["ETHUSDT"], "min_confidence": 90 }"#;
        let cfg: RelayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.default_symbols, vec!["ETHUSDT"]);
        assert_eq!(cfg.min_confidence, 90);
        assert_eq!(cfg.max_signals_per_day, 3);
        assert_eq!(cfg.analyzer_config().min_confidence, 90);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("relay-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("relay_config.json");

        let mut cfg = RelayConfig::default();
        cfg.cooldown_secs = 1800;
        cfg.save(&path).unwrap();

        let loaded = RelayConfig::load(&path).unwrap();
        assert_eq!(loaded.cooldown_secs, 1800);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_error() {
        assert!(RelayConfig::load("/definitely/not/here/relay_config.json").is_err());
    }

    #[test]
    fn overrides_from_lookup() {
        let mut cfg = RelayConfig::default();
        cfg.apply_overrides(|key| match key {
            "RELAY_SYMBOLS" => Some(" adausdt, dogeusdt ,,".to_string()),
            "RELAY_BIND_ADDR" => Some("127.0.0.1:9000".to_string()),
            _ => None,
        });
        assert_eq!(cfg.default_symbols, vec!["ADAUSDT", "DOGEUSDT"]);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.store_path, "relay_store.json");

        // Blank list keeps the configured pairs.
        cfg.apply_overrides(|key| (key == "RELAY_SYMBOLS").then(|| " , ".to_string()));
        assert_eq!(cfg.default_symbols, vec!["ADAUSDT", "DOGEUSDT"]);
    }
}
