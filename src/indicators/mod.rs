// =============================================================================
// Technical Indicators Module — the nine-indicator registry (C2)
// =============================================================================
//
// Pure, side-effect-free implementations of the technical indicators used by
// the scoring pipeline. Each indicator is a tagged variant of `Indicator`
// carrying its own weight/category/config, dispatched through
// `IndicatorRegistry::compute_all` rather than a duck-typed lookup table —
// no reflection, no runtime registry.
//
// Every `normalize` function maps a raw value bundle to a `Signal` in
// [-1, +1] plus a label and strength; insufficient history produces an
// all-NaN raw bundle and a neutral/weak signal rather than dropping the
// indicator from the output map, so downstream completeness accounting can
// still count it as "expected but invalid."
// =============================================================================

pub mod adx;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod rsi;
pub mod stochastic;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candle::Candle;

/// Direction label derived from a signal's sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLabel {
    Bullish,
    Bearish,
    Neutral,
}

/// Magnitude label derived from a signal's absolute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
}

/// Indicator category used for chip generation and display grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Momentum,
    Trend,
    Volume,
    Volatility,
}

/// Classify a normalized signal into (label, strength), matching the
/// original scorer's `_classify_signal`: |signal| < 0.2 weak, < 0.6
/// moderate, else strong; signal > 0.1 bullish, < -0.1 bearish, else
/// neutral.
pub fn classify_signal(signal: f64) -> (SignalLabel, SignalStrength) {
    if signal.is_nan() {
        return (SignalLabel::Neutral, SignalStrength::Weak);
    }

    let label = if signal > 0.1 {
        SignalLabel::Bullish
    } else if signal < -0.1 {
        SignalLabel::Bearish
    } else {
        SignalLabel::Neutral
    };

    let abs = signal.abs();
    let strength = if abs < 0.2 {
        SignalStrength::Weak
    } else if abs < 0.6 {
        SignalStrength::Moderate
    } else {
        SignalStrength::Strong
    };

    (label, strength)
}

/// One indicator's full output: its static metadata plus the computed raw
/// values and the derived normalized signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorOutput {
    pub name: &'static str,
    pub category: Category,
    pub weight: f64,
    /// Raw, indicator-specific field bundle as free-form JSON (mirrors the
    /// source's untyped `raw` dict; downstream consumers key into it by
    /// field name, e.g. `adx_14.raw.adx`).
    pub raw: serde_json::Value,
    pub signal: f64,
    pub label: SignalLabel,
    pub strength: SignalStrength,
}

/// The nine indicators the registry computes, tagged rather than looked up
/// by name through a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Rsi14,
    Macd12_26_9,
    Stoch14_3_3,
    Adx14,
    Obv,
    Bbands20_2,
    Ema20,
    Ema50,
    Ema200,
}

impl Indicator {
    pub const ALL: [Indicator; 9] = [
        Indicator::Rsi14,
        Indicator::Macd12_26_9,
        Indicator::Stoch14_3_3,
        Indicator::Adx14,
        Indicator::Obv,
        Indicator::Bbands20_2,
        Indicator::Ema20,
        Indicator::Ema50,
        Indicator::Ema200,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Indicator::Rsi14 => "rsi_14",
            Indicator::Macd12_26_9 => "macd_12_26_9",
            Indicator::Stoch14_3_3 => "stoch_14_3_3",
            Indicator::Adx14 => "adx_14",
            Indicator::Obv => "obv",
            Indicator::Bbands20_2 => "bbands_20_2",
            Indicator::Ema20 => "ema_20",
            Indicator::Ema50 => "ema_50",
            Indicator::Ema200 => "ema_200",
        }
    }

    pub fn category(self) -> Category {
        match self {
            Indicator::Rsi14 | Indicator::Macd12_26_9 | Indicator::Stoch14_3_3 => {
                Category::Momentum
            }
            Indicator::Adx14 | Indicator::Ema20 | Indicator::Ema50 | Indicator::Ema200 => {
                Category::Trend
            }
            Indicator::Obv => Category::Volume,
            Indicator::Bbands20_2 => Category::Volatility,
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            Indicator::Rsi14 => 0.12,
            Indicator::Macd12_26_9 => 0.15,
            Indicator::Stoch14_3_3 => 0.10,
            Indicator::Adx14 => 0.13,
            Indicator::Obv => 0.12,
            Indicator::Bbands20_2 => 0.10,
            Indicator::Ema20 => 0.08,
            Indicator::Ema50 => 0.10,
            Indicator::Ema200 => 0.10,
        }
    }

    /// Compute this indicator's raw bundle and normalized signal over the
    /// given candle window (ascending by open time, most recent last).
    pub fn compute(self, candles: &[Candle]) -> IndicatorOutput {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (raw, signal) = match self {
            Indicator::Rsi14 => rsi::compute(&closes),
            Indicator::Macd12_26_9 => macd::compute(&closes),
            Indicator::Stoch14_3_3 => stochastic::compute(candles),
            Indicator::Adx14 => adx::compute(candles),
            Indicator::Obv => obv::compute(candles),
            Indicator::Bbands20_2 => bollinger::compute(&closes),
            Indicator::Ema20 => ema::compute(&closes, 20, 0.5),
            Indicator::Ema50 => ema::compute(&closes, 50, 1.0),
            Indicator::Ema200 => ema::compute(&closes, 200, 1.5),
        };

        let (label, strength) = classify_signal(signal);

        IndicatorOutput {
            name: self.name(),
            category: self.category(),
            weight: self.weight(),
            raw,
            signal,
            label,
            strength,
        }
    }
}

/// Compute all nine indicators over a candle window. Indicators with
/// insufficient history still appear in the map, carrying an all-NaN raw
/// bundle and a neutral/weak signal of NaN.
pub fn compute_all(candles: &[Candle]) -> HashMap<&'static str, IndicatorOutput> {
    Indicator::ALL
        .iter()
        .map(|ind| (ind.name(), ind.compute(candles)))
        .collect()
}
