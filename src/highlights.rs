// =============================================================================
// Highlight Generator (C4)
// =============================================================================
//
// Stateless rules over a computed indicator map, each contributing at most
// one chip. Rules are plain functions rather than a trait object list — there
// are exactly seven of them and they never grow a plugin surface — evaluated
// in a fixed order so that priority ties resolve to that order (a stable
// sort, not an arbitrary one).
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipCategory {
    Bullish,
    Bearish,
    Neutral,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chip {
    pub text: &'static str,
    pub category: ChipCategory,
    pub priority: u32,
    pub source: &'static str,
}

fn raw_f64(raw: &serde_json::Value, field: &str) -> Option<f64> {
    raw.get(field).and_then(|v| v.as_f64())
}

fn rule_rsi(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let rsi = raw_f64(&outputs.get("rsi_14")?.raw, "rsi")?;
    if rsi <= 25.0 {
        Some(Chip { text: "RSI Oversold", category: ChipCategory::Bullish, priority: 90, source: "rsi_14" })
    } else if rsi >= 75.0 {
        Some(Chip { text: "RSI Overbought", category: ChipCategory::Bearish, priority: 90, source: "rsi_14" })
    } else {
        None
    }
}

fn rule_macd(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let raw = &outputs.get("macd_12_26_9")?.raw;
    let macd = raw_f64(raw, "macd")?;
    let histogram = raw_f64(raw, "histogram")?;
    if macd.abs() == 0.0 {
        return None;
    }
    let relative = histogram / macd.abs();
    if relative > 0.5 {
        Some(Chip { text: "MACD Bullish Cross", category: ChipCategory::Bullish, priority: 85, source: "macd_12_26_9" })
    } else if relative < -0.5 {
        Some(Chip { text: "MACD Bearish Cross", category: ChipCategory::Bearish, priority: 85, source: "macd_12_26_9" })
    } else {
        None
    }
}

fn rule_stoch(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let k = raw_f64(&outputs.get("stoch_14_3_3")?.raw, "k")?;
    if k <= 15.0 {
        Some(Chip { text: "Stoch Oversold", category: ChipCategory::Bullish, priority: 75, source: "stoch_14_3_3" })
    } else if k >= 85.0 {
        Some(Chip { text: "Stoch Overbought", category: ChipCategory::Bearish, priority: 75, source: "stoch_14_3_3" })
    } else {
        None
    }
}

fn rule_adx(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let raw = &outputs.get("adx_14")?.raw;
    let adx = raw_f64(raw, "adx")?;
    let plus_di = raw_f64(raw, "plus_di")?;
    let minus_di = raw_f64(raw, "minus_di")?;
    if adx >= 35.0 {
        if plus_di > minus_di {
            Some(Chip { text: "Strong Uptrend", category: ChipCategory::Bullish, priority: 95, source: "adx_14" })
        } else {
            Some(Chip { text: "Strong Downtrend", category: ChipCategory::Bearish, priority: 95, source: "adx_14" })
        }
    } else if adx < 20.0 {
        Some(Chip { text: "No Trend", category: ChipCategory::Neutral, priority: 50, source: "adx_14" })
    } else {
        None
    }
}

fn rule_obv(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let raw = &outputs.get("obv")?.raw;
    let slope_normalized = raw_f64(raw, "slope_normalized")?;
    if slope_normalized > 3.0 {
        Some(Chip { text: "Strong Buying", category: ChipCategory::Bullish, priority: 80, source: "obv" })
    } else if slope_normalized < -3.0 {
        Some(Chip { text: "Strong Selling", category: ChipCategory::Bearish, priority: 80, source: "obv" })
    } else {
        None
    }
}

fn rule_bollinger(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let raw = &outputs.get("bbands_20_2")?.raw;
    let percent_b = raw_f64(raw, "percent_b")?;
    if percent_b <= 0.0 {
        return Some(Chip { text: "Below BB Lower", category: ChipCategory::Bullish, priority: 70, source: "bbands_20_2" });
    }
    if percent_b >= 1.0 {
        return Some(Chip { text: "Above BB Upper", category: ChipCategory::Bearish, priority: 70, source: "bbands_20_2" });
    }
    let bandwidth = raw_f64(raw, "bandwidth")?;
    if bandwidth < 3.0 {
        return Some(Chip { text: "BB Squeeze", category: ChipCategory::Info, priority: 65, source: "bbands_20_2" });
    }
    None
}

fn rule_ema_alignment(outputs: &HashMap<&str, IndicatorOutput>) -> Option<Chip> {
    let pct20 = raw_f64(&outputs.get("ema_20")?.raw, "pct")?;
    let pct50 = raw_f64(&outputs.get("ema_50")?.raw, "pct")?;
    let pct200 = raw_f64(&outputs.get("ema_200")?.raw, "pct")?;

    if pct20 > 0.0 && pct50 > 0.0 && pct200 > 0.0 {
        Some(Chip { text: "EMA Bullish", category: ChipCategory::Bullish, priority: 88, source: "ema_20" })
    } else if pct20 < 0.0 && pct50 < 0.0 && pct200 < 0.0 {
        Some(Chip { text: "EMA Bearish", category: ChipCategory::Bearish, priority: 88, source: "ema_20" })
    } else if pct20 > 0.0 && pct200 < 0.0 {
        Some(Chip { text: "EMA Transition", category: ChipCategory::Info, priority: 60, source: "ema_20" })
    } else {
        None
    }
}

/// Run every rule over `outputs` and return the top four chips by priority,
/// ties broken by rule order (RSI, MACD, Stoch, ADX, OBV, Bollinger, EMA).
pub fn generate_highlights(outputs: &HashMap<&str, IndicatorOutput>) -> Vec<Chip> {
    let rules: [fn(&HashMap<&str, IndicatorOutput>) -> Option<Chip>; 7] = [
        rule_rsi,
        rule_macd,
        rule_stoch,
        rule_adx,
        rule_obv,
        rule_bollinger,
        rule_ema_alignment,
    ];

    let mut chips: Vec<Chip> = rules.iter().filter_map(|rule| rule(outputs)).collect();
    chips.sort_by(|a, b| b.priority.cmp(&a.priority));
    chips.truncate(4);
    chips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Category, SignalLabel, SignalStrength};

    fn make_output(name: &'static str, raw: serde_json::Value) -> IndicatorOutput {
        IndicatorOutput {
            name,
            category: Category::Momentum,
            weight: 0.1,
            raw,
            signal: 0.0,
            label: SignalLabel::Neutral,
            strength: SignalStrength::Weak,
        }
    }

    #[test]
    fn rsi_oversold_fires() {
        let mut outputs = HashMap::new();
        outputs.insert("rsi_14", make_output("rsi_14", serde_json::json!({ "rsi": 20.0 })));
        let chips = generate_highlights(&outputs);
        assert_eq!(chips.len(), 1);
        assert_eq!(chips[0].text, "RSI Oversold");
    }

    #[test]
    fn adx_strong_downtrend_fires() {
        let mut outputs = HashMap::new();
        outputs.insert(
            "adx_14",
            make_output("adx_14", serde_json::json!({ "adx": 40.0, "plus_di": 10.0, "minus_di": 30.0 })),
        );
        let chips = generate_highlights(&outputs);
        assert_eq!(chips[0].text, "Strong Downtrend");
        assert_eq!(chips[0].category, ChipCategory::Bearish);
    }

    #[test]
    fn top_four_by_priority_with_stable_ties() {
        let mut outputs = HashMap::new();
        outputs.insert("rsi_14", make_output("rsi_14", serde_json::json!({ "rsi": 20.0 }))); // 90
        outputs.insert(
            "adx_14",
            make_output("adx_14", serde_json::json!({ "adx": 40.0, "plus_di": 30.0, "minus_di": 10.0 })), // 95
        );
        outputs.insert(
            "macd_12_26_9",
            make_output("macd_12_26_9", serde_json::json!({ "macd": 2.0, "signal": 0.0, "histogram": 1.5 })), // 85
        );
        outputs.insert("stoch_14_3_3", make_output("stoch_14_3_3", serde_json::json!({ "k": 10.0, "d": 20.0 }))); // 75
        outputs.insert(
            "obv",
            make_output("obv", serde_json::json!({ "obv": 100.0, "slope": 10.0, "slope_normalized": 10.0 })), // 80
        );

        let chips = generate_highlights(&outputs);
        assert_eq!(chips.len(), 4);
        assert_eq!(chips[0].text, "Strong Uptrend"); // 95
        assert_eq!(chips[1].text, "RSI Oversold"); // 90
        assert_eq!(chips[2].text, "MACD Bullish Cross"); // 85
        assert_eq!(chips[3].text, "Strong Buying"); // 80
    }

    #[test]
    fn missing_fields_skip_rule_without_panic() {
        let outputs: HashMap<&str, IndicatorOutput> = HashMap::new();
        assert!(generate_highlights(&outputs).is_empty());
    }

    #[test]
    fn bb_squeeze_fires_on_narrow_bandwidth() {
        let mut outputs = HashMap::new();
        outputs.insert(
            "bbands_20_2",
            make_output(
                "bbands_20_2",
                serde_json::json!({ "upper": 101.0, "middle": 100.0, "lower": 99.0, "percent_b": 0.5, "bandwidth": 2.0 }),
            ),
        );
        let chips = generate_highlights(&outputs);
        assert_eq!(chips[0].text, "BB Squeeze");
        assert_eq!(chips[0].category, ChipCategory::Info);
    }
}
