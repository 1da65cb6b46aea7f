// =============================================================================
// Engine Configuration — hot-reloadable settings with atomic save
// =============================================================================
//
// Central configuration hub for the trading engine. Every tunable parameter
// called out in the external-interfaces configuration list lives here.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_exchange_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_min_quote_volume_usd() -> f64 {
    1_000_000.0
}

fn default_trading_fee_pct() -> f64 {
    0.001
}

fn default_max_position_size_pct() -> f64 {
    0.25
}

fn default_max_concurrent_positions() -> u32 {
    5
}

fn default_regime_bandwidth_threshold() -> f64 {
    10.0
}

fn default_regime_adx_threshold() -> f64 {
    25.0
}

fn default_regime_score_bull_threshold() -> f64 {
    0.60
}

fn default_regime_score_bear_threshold() -> f64 {
    0.40
}

fn default_min_candles_per_symbol() -> usize {
    50
}

// =============================================================================
// ArchetypeCaps
// =============================================================================

/// Per-archetype overrides of the default max-concurrent-positions cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchetypeCaps {
    #[serde(default = "default_swing_cap")]
    pub swing: u32,
    #[serde(default = "default_breakout_cap")]
    pub breakout: u32,
    #[serde(default = "default_cross_tf_cap")]
    pub cross_timeframe: u32,
}

fn default_swing_cap() -> u32 {
    3
}
fn default_breakout_cap() -> u32 {
    2
}
fn default_cross_tf_cap() -> u32 {
    3
}

impl Default for ArchetypeCaps {
    fn default() -> Self {
        Self {
            swing: default_swing_cap(),
            breakout: default_breakout_cap(),
            cross_timeframe: default_cross_tf_cap(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level runtime configuration for the trading engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the public exchange REST API.
    #[serde(default = "default_exchange_base_url")]
    pub exchange_base_url: String,

    /// Minimum 24h quote volume (USDT) for a symbol to be considered active.
    #[serde(default = "default_min_quote_volume_usd")]
    pub min_quote_volume_usd: f64,

    /// Per-leg trading fee (entry and exit charged separately).
    #[serde(default = "default_trading_fee_pct")]
    pub trading_fee_pct: f64,

    /// Maximum position size as a fraction of equity at open time.
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,

    /// Default maximum concurrent open positions per agent.
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,

    /// Archetype-specific overrides of the default concurrency cap.
    #[serde(default)]
    pub archetype_caps: ArchetypeCaps,

    /// Minimum candle count required to keep a symbol in a pipeline run.
    #[serde(default = "default_min_candles_per_symbol")]
    pub min_candles_per_symbol: usize,

    /// Regime classifier thresholds.
    #[serde(default = "default_regime_bandwidth_threshold")]
    pub regime_bandwidth_threshold: f64,
    #[serde(default = "default_regime_adx_threshold")]
    pub regime_adx_threshold: f64,
    #[serde(default = "default_regime_score_bull_threshold")]
    pub regime_score_bull_threshold: f64,
    #[serde(default = "default_regime_score_bear_threshold")]
    pub regime_score_bear_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exchange_base_url: default_exchange_base_url(),
            min_quote_volume_usd: default_min_quote_volume_usd(),
            trading_fee_pct: default_trading_fee_pct(),
            max_position_size_pct: default_max_position_size_pct(),
            max_concurrent_positions: default_max_concurrent_positions(),
            archetype_caps: ArchetypeCaps::default(),
            min_candles_per_symbol: default_min_candles_per_symbol(),
            regime_bandwidth_threshold: default_regime_bandwidth_threshold(),
            regime_adx_threshold: default_regime_adx_threshold(),
            regime_score_bull_threshold: default_regime_score_bull_threshold(),
            regime_score_bear_threshold: default_regime_score_bear_threshold(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            exchange_base_url = %config.exchange_base_url,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert!((cfg.min_quote_volume_usd - 1_000_000.0).abs() < f64::EPSILON);
        assert!((cfg.trading_fee_pct - 0.001).abs() < f64::EPSILON);
        assert!((cfg.max_position_size_pct - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.max_concurrent_positions, 5);
        assert_eq!(cfg.archetype_caps.swing, 3);
        assert_eq!(cfg.archetype_caps.breakout, 2);
        assert_eq!(cfg.archetype_caps.cross_timeframe, 3);
        assert_eq!(cfg.min_candles_per_symbol, 50);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_concurrent_positions, 5);
        assert!((cfg.regime_adx_threshold - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "exchange_base_url": "https://testnet.example.com" }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.exchange_base_url, "https://testnet.example.com");
        assert_eq!(cfg.max_concurrent_positions, 5);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.exchange_base_url, cfg2.exchange_base_url);
        assert_eq!(cfg.max_concurrent_positions, cfg2.max_concurrent_positions);
    }
}
