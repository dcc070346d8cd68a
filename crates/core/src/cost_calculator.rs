// crates/core/src/cost_calculator.rs
//! `LocalCostCalculator` — streaming parse of the transcript, per-model
//! pricing (spec §4.10). Pricing-table shape and exact/substring lookup
//! are grounded on `claude-view-core`'s `pricing.rs` (`ModelPricing`,
//! `lookup_pricing`, `default_pricing`); the formula itself (cache-creation
//! at 1.25x input, cache-read at 0.10x input) is specific to spec §4.10
//! and does not use the teacher's tiered-above-200k pricing, which this
//! system's source data doesn't carry.

use std::collections::HashMap;

/// Per-model USD-per-token input/output rates (spec §4.10).
#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

/// Static per-model pricing table, exact-match first (spec §4.10: "exact
/// match -> substring match on family keyword -> default to highest-price
/// entry"). Mirrors the shape of `claude-view-core::pricing::default_pricing`,
/// trimmed to input/output rates since this system has no tiered-above-200k
/// billing data locally.
pub fn default_rates() -> HashMap<&'static str, ModelRate> {
    let mut m = HashMap::new();
    m.insert("claude-opus-4", ModelRate { input_per_token: 5e-6, output_per_token: 25e-6 });
    m.insert("claude-sonnet-4", ModelRate { input_per_token: 3e-6, output_per_token: 15e-6 });
    m.insert("claude-haiku-4", ModelRate { input_per_token: 0.8e-6, output_per_token: 4e-6 });
    m.insert("opus", ModelRate { input_per_token: 5e-6, output_per_token: 25e-6 });
    m.insert("sonnet", ModelRate { input_per_token: 3e-6, output_per_token: 15e-6 });
    m.insert("haiku", ModelRate { input_per_token: 0.8e-6, output_per_token: 4e-6 });
    m
}

/// Resolve a model id to a rate: exact match, then substring match on a
/// family keyword, then the highest-price entry in the table (spec §4.10).
pub fn resolve_rate<'a>(model_id: &str, table: &'a HashMap<&'static str, ModelRate>) -> &'a ModelRate {
    if let Some(rate) = table.get(model_id) {
        return rate;
    }
    let lower = model_id.to_ascii_lowercase();
    for (key, rate) in table {
        if lower.contains(key) {
            return rate;
        }
    }
    table
        .values()
        .max_by(|a, b| a.input_per_token.partial_cmp(&b.input_per_token).unwrap())
        .expect("default_rates is never empty")
}

/// Clamp a raw token count to a non-negative `u64` (spec §4.10: "negative
/// or non-numeric token counts are clamped to zero").
fn clamp_tokens(raw: Option<i64>) -> u64 {
    raw.unwrap_or(0).max(0) as u64
}

/// One assistant message's usage block, already clamped (spec §4.10).
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTokens {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

impl UsageTokens {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cache_creation + self.cache_read
    }
}

/// cost = input*inputPrice + output*outputPrice + cacheCreation*inputPrice*1.25
///      + cacheRead*inputPrice*0.10 (spec §4.10 formula, all rates per-token).
pub fn message_cost_usd(usage: &UsageTokens, rate: &ModelRate) -> f64 {
    usage.input as f64 * rate.input_per_token
        + usage.output as f64 * rate.output_per_token
        + usage.cache_creation as f64 * rate.input_per_token * 1.25
        + usage.cache_read as f64 * rate.input_per_token * 0.10
}

/// A single assistant-message JSONL line's usage, as loosely typed JSON
/// (transcripts are untyped JSON per spec §9; only the fields this
/// calculator needs are extracted, everything else is ignored).
#[derive(Debug, Clone, serde::Deserialize)]
struct AssistantLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    message: Option<AssistantMessage>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct AssistantMessage {
    model: Option<String>,
    usage: Option<UsageBlock>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct UsageBlock {
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cache_creation_input_tokens: Option<i64>,
    cache_read_input_tokens: Option<i64>,
}

/// Aggregate result of scanning an entire transcript (spec §4.10).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostAggregate {
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    /// Cost-per-hour and tokens-per-minute, only set when the transcript
    /// spans more than one minute (spec §4.10).
    pub cost_per_hour: Option<f64>,
    pub tokens_per_minute: Option<f64>,
}

fn parse_rfc3339_ms(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Stream the transcript's JSONL lines (already split by the caller via
/// `transcript_scanner::complete_lines`, or read whole for a one-shot
/// parse), accumulating cost across every assistant message with a usage
/// block. Invalid lines are skipped individually (spec §4.8 "a single
/// malformed line never poisons a scan").
pub fn aggregate<'a>(lines: impl Iterator<Item = &'a str>, table: &HashMap<&'static str, ModelRate>) -> CostAggregate {
    let mut total_cost = 0.0;
    let mut total_tokens = 0u64;
    let mut first_ts: Option<i64> = None;
    let mut last_ts: Option<i64> = None;

    for line in lines {
        let Ok(parsed) = serde_json::from_str::<AssistantLine>(line) else {
            continue;
        };
        if parsed.line_type.as_deref() != Some("assistant") {
            continue;
        }
        let Some(message) = parsed.message else {
            continue;
        };
        let Some(usage_block) = message.usage else {
            continue;
        };

        let usage = UsageTokens {
            input: clamp_tokens(usage_block.input_tokens),
            output: clamp_tokens(usage_block.output_tokens),
            cache_creation: clamp_tokens(usage_block.cache_creation_input_tokens),
            cache_read: clamp_tokens(usage_block.cache_read_input_tokens),
        };

        let model_id = message.model.as_deref().unwrap_or("");
        let rate = resolve_rate(model_id, table);
        total_cost += message_cost_usd(&usage, rate);
        total_tokens += usage.total();

        if let Some(ts) = parsed.timestamp.as_deref().and_then(parse_rfc3339_ms) {
            first_ts = Some(first_ts.map_or(ts, |f| f.min(ts)));
            last_ts = Some(last_ts.map_or(ts, |l| l.max(ts)));
        }
    }

    let duration_ms = match (first_ts, last_ts) {
        (Some(a), Some(b)) => (b - a).max(0),
        _ => 0,
    };
    let duration_minutes = duration_ms as f64 / 60_000.0;

    let (cost_per_hour, tokens_per_minute) = if duration_minutes > 1.0 {
        let hours = duration_minutes / 60.0;
        (
            Some(total_cost / hours),
            Some(total_tokens as f64 / duration_minutes),
        )
    } else {
        (None, None)
    };

    CostAggregate {
        total_cost_usd: total_cost,
        total_tokens,
        cost_per_hour,
        tokens_per_minute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rate_exact_match_wins() {
        let table = default_rates();
        let rate = resolve_rate("claude-opus-4", &table);
        assert_eq!(rate.input_per_token, 5e-6);
    }

    #[test]
    fn resolve_rate_falls_back_to_substring_family_match() {
        let table = default_rates();
        let rate = resolve_rate("claude-sonnet-4-5-20250929", &table);
        assert_eq!(rate.input_per_token, 3e-6);
    }

    #[test]
    fn resolve_rate_unknown_model_uses_highest_price_entry() {
        let table = default_rates();
        let rate = resolve_rate("some-future-model-xyz", &table);
        assert_eq!(rate.input_per_token, 5e-6);
    }

    #[test]
    fn message_cost_applies_cache_multipliers() {
        let rate = ModelRate { input_per_token: 1e-6, output_per_token: 2e-6 };
        let usage = UsageTokens { input: 1_000_000, output: 0, cache_creation: 1_000_000, cache_read: 1_000_000 };
        let cost = message_cost_usd(&usage, &rate);
        // 1.0 (input) + 1.25 (cache creation) + 0.10 (cache read)
        assert!((cost - 2.35).abs() < 1e-9);
    }

    #[test]
    fn aggregate_skips_malformed_and_non_assistant_lines() {
        let lines = vec![
            "not json",
            r#"{"type":"user","message":{}}"#,
            r#"{"type":"assistant","timestamp":"2024-01-01T00:00:00Z","message":{"model":"claude-opus-4","usage":{"input_tokens":1000,"output_tokens":500,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
        ];
        let table = default_rates();
        let agg = aggregate(lines.into_iter(), &table);
        assert!(agg.total_cost_usd > 0.0);
        assert_eq!(agg.total_tokens, 1_500);
    }

    #[test]
    fn aggregate_clamps_negative_token_counts() {
        let line = r#"{"type":"assistant","message":{"model":"haiku","usage":{"input_tokens":-50,"output_tokens":100,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#;
        let table = default_rates();
        let agg = aggregate(std::iter::once(line), &table);
        assert_eq!(agg.total_tokens, 100);
    }

    #[test]
    fn duration_under_one_minute_has_no_rate_fields() {
        let lines = vec![
            r#"{"type":"assistant","timestamp":"2024-01-01T00:00:00Z","message":{"model":"haiku","usage":{"input_tokens":10,"output_tokens":10,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
            r#"{"type":"assistant","timestamp":"2024-01-01T00:00:30Z","message":{"model":"haiku","usage":{"input_tokens":10,"output_tokens":10,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
        ];
        let table = default_rates();
        let agg = aggregate(lines.into_iter(), &table);
        assert!(agg.cost_per_hour.is_none());
        assert!(agg.tokens_per_minute.is_none());
    }

    #[test]
    fn duration_over_one_minute_derives_rates() {
        let lines = vec![
            r#"{"type":"assistant","timestamp":"2024-01-01T00:00:00Z","message":{"model":"haiku","usage":{"input_tokens":100,"output_tokens":0,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
            r#"{"type":"assistant","timestamp":"2024-01-01T00:10:00Z","message":{"model":"haiku","usage":{"input_tokens":100,"output_tokens":0,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
        ];
        let table = default_rates();
        let agg = aggregate(lines.into_iter(), &table);
        assert!(agg.cost_per_hour.is_some());
        assert!(agg.tokens_per_minute.is_some());
    }
}
