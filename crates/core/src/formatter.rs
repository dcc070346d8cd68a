// crates/core/src/formatter.rs
//! `StatuslineFormatter` — renders `SessionHealth` into the width-keyed
//! line sets a front-end renderer displays verbatim (spec §4.15).
//!
//! Everything here is pure and synchronous: it only reads the fields
//! `UnifiedBroker::gather_all` already computed, never touches the
//! filesystem. Width classes are pre-rendered once per gather and stored
//! in `SessionHealth.formattedOutput` so the per-second front-end read
//! never has to re-run the shrink cascade.

use session_health_types::{FormattedOutput, HealthStatus, SessionHealth};

/// Terminal-width classes to pre-render (spec §4.15).
pub const WIDTH_CLASSES: &[u32] = &[40, 60, 80, 100, 120, 150, 200];
/// Dedicated single-line variant, capped regardless of width class.
pub const SINGLE_LINE_MAX: usize = 240;
/// Fraction of a width class actually usable for rendering.
const EFFECTIVE_WIDTH_FRACTION: f64 = 0.75;

fn effective_width(class: u32) -> usize {
    ((class as f64) * EFFECTIVE_WIDTH_FRACTION).floor() as usize
}

/// Visible column width: strips SGR escape sequences (`\x1b[...m`) and
/// counts each emoji glyph as 2 columns (spec §4.15 "Visible width
/// computation").
pub fn visible_width(s: &str) -> usize {
    let mut width = 0usize;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        width += if is_wide_glyph(c) { 2 } else { 1 };
    }
    width
}

fn is_wide_glyph(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x2190..=0x21FF | 0x2B00..=0x2BFF
    )
}

fn health_glyph(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "",
        HealthStatus::Warning => "\u{26a0}",  // ⚠
        HealthStatus::Critical => "\u{1f53a}", // 🔺
        HealthStatus::Unknown => "?",
    }
}

fn abbreviate_model(model: &str) -> String {
    let lower = model.to_lowercase();
    if lower.contains("opus") {
        "o-".to_string()
    } else if lower.contains("sonnet") {
        "s-".to_string()
    } else if lower.contains("haiku") {
        "h-".to_string()
    } else if lower.contains("claude") {
        "c".to_string()
    } else {
        model.to_string()
    }
}

fn truncate_branch(branch: &str, max_chars: usize) -> String {
    if branch.chars().count() <= max_chars {
        branch.to_string()
    } else {
        let truncated: String = branch.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{truncated}\u{2026}")
    }
}

fn git_suffix(health: &SessionHealth) -> String {
    let mut parts = Vec::new();
    if health.git.ahead > 0 {
        parts.push(format!("+{}", health.git.ahead));
    }
    if health.git.behind > 0 {
        parts.push(format!("-{}", health.git.behind));
    }
    if health.git.dirty {
        parts.push("*".to_string());
    }
    parts.join("")
}

fn git_segment(health: &SessionHealth, width_class: u32) -> Option<String> {
    let branch = health.git.branch.as_ref()?;
    let cap = if width_class >= 100 { 30 } else { 15 };
    let truncated = truncate_branch(branch, cap);
    let suffix = git_suffix(health);
    if suffix.is_empty() {
        Some(truncated)
    } else {
        Some(format!("{truncated} {suffix}"))
    }
}

/// Render a full context bar like `[######----] 62%` at `bar_len` slots.
fn context_bar(percent_used: u32, bar_len: usize) -> String {
    let filled = ((percent_used as usize * bar_len) / 100).min(bar_len);
    let empty = bar_len - filled;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}

fn free_tokens_annotation(health: &SessionHealth) -> String {
    format!("{}k free", health.context.tokens_left / 1000)
}

/// One candidate rendering of the model+context block, paired with the
/// cascade step that produced it (spec §4.15 "shrink cascade").
struct ModelContextCandidate {
    text: String,
    /// Whether context stays on Line 1 (false means it belongs on Line 2).
    context_on_line1: bool,
}

/// Model/context shrink cascade (spec §4.15): try each of the 8 steps in
/// order and keep the first whose text fits `budget` columns.
fn model_context_cascade(health: &SessionHealth, budget: usize) -> ModelContextCandidate {
    let model = &health.model.value;
    let pct = health.context.percent_used;

    let candidates = [
        format!("{model} {} {}", context_bar(pct, 10), free_tokens_annotation(health)),
        format!("{model} {} {}", context_bar(pct, 5), free_tokens_annotation(health)),
        format!("{model} {} {}%", context_bar(pct, 3), pct),
        format!("{model} {}%", pct),
    ];
    for text in candidates {
        if visible_width(&text) <= budget {
            return ModelContextCandidate { text, context_on_line1: true };
        }
    }

    let abbrev = abbreviate_model(model);
    let abbrev_candidates = [
        format!("{abbrev} {} {}%", context_bar(pct, 3), pct),
        format!("{abbrev} {}%", pct),
    ];
    for text in abbrev_candidates {
        if visible_width(&text) <= budget {
            return ModelContextCandidate { text, context_on_line1: true };
        }
    }

    if visible_width(&abbrev) <= budget {
        return ModelContextCandidate { text: abbrev, context_on_line1: false };
    }

    ModelContextCandidate { text: String::new(), context_on_line1: false }
}

fn line1(health: &SessionHealth, width_class: u32, budget: usize) -> (String, Option<String>) {
    let glyph = health_glyph(health.status);
    let dir = crate::sources::home_collapsed(&health.project_path);
    let git = git_segment(health, width_class);

    let mut prefix_parts = vec![glyph.to_string(), dir];
    if let Some(git) = git {
        prefix_parts.push(git);
    }
    let prefix = prefix_parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ");

    let remaining = budget.saturating_sub(visible_width(&prefix) + 1);
    let model_ctx = model_context_cascade(health, remaining);

    if model_ctx.context_on_line1 {
        (format!("{prefix} {}", model_ctx.text), None)
    } else {
        let overflow = format!(
            "{}%{}",
            health.context.percent_used,
            if health.context.near_compaction { " near-compaction" } else { "" }
        );
        (format!("{prefix} {}", model_ctx.text), Some(overflow))
    }
}

/// `displayMinutes = max(0, rawMinutes - ageMinutes)` with the escalated
/// double-warning marker (spec §4.15 "Budget display is locally age-adjusted").
fn budget_display(raw_minutes: f64, age_minutes: f64) -> String {
    let display = (raw_minutes - age_minutes).max(0.0);
    if display == 0.0 && raw_minutes > 10.0 && age_minutes > raw_minutes {
        format!("\u{26a0}\u{26a0}{raw_minutes:.0}m (stale)")
    } else {
        format!("{display:.0}m")
    }
}

fn time_budget_weekly_block(health: &SessionHealth, age_minutes: f64) -> String {
    let mut parts = vec![budget_display(health.billing.budget_remaining_minutes, age_minutes)];
    if let Some(weekly) = &health.billing.weekly {
        parts.push(format!("wk:{}%", weekly.percent));
    }
    parts.join(" ")
}

fn usage_turns_cost_segments(health: &SessionHealth) -> Vec<String> {
    let mut segments = Vec::new();
    segments.push(format!("${:.2}", health.billing.cost_today));
    if health.billing.burn_rate_per_hour > 0.0 {
        segments.push(format!("{:.2}/hr", health.billing.burn_rate_per_hour));
    }
    if health.transcript.message_count >= 1000 {
        segments.push(format!("{}msg", health.transcript.message_count));
    }
    if health.billing.total_tokens > 0 {
        segments.push(format!("{}tok", health.billing.total_tokens));
    }
    segments
}

/// Line 2 drop cascade (spec §4.15): drop usage, then turns (only ever
/// shown if >=1000 messages so dropping it is a no-op below that), then
/// burn rate, keeping the bare cost figure last; time/budget/weekly is
/// never dropped.
fn line2(health: &SessionHealth, budget: usize, age_minutes: f64) -> String {
    let tbw = time_budget_weekly_block(health, age_minutes);
    let mut segments = usage_turns_cost_segments(health);

    loop {
        let candidate = std::iter::once(tbw.clone()).chain(segments.clone()).collect::<Vec<_>>().join(" ");
        if visible_width(&candidate) <= budget || segments.is_empty() {
            return candidate;
        }
        // Drop order: tok (usage) -> msg (turns) -> burn-rate, keep cost.
        let drop_idx = segments
            .iter()
            .position(|s| s.ends_with("tok"))
            .or_else(|| segments.iter().position(|s| s.ends_with("msg")))
            .or_else(|| segments.iter().position(|s| s.ends_with("/hr")));
        match drop_idx {
            Some(i) => {
                segments.remove(i);
            }
            None => return candidate,
        }
    }
}

fn xml_like(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('<') && text.trim_end().ends_with('>')
}

fn line3(health: &SessionHealth, budget: usize, now_ms: i64) -> String {
    let preview = if xml_like(&health.transcript.last_message_preview) {
        "(system message)".to_string()
    } else {
        health.transcript.last_message_preview.clone()
    };
    let age_s = ((now_ms - health.transcript.last_modified).max(0)) / 1000;
    let age_label = if age_s < 60 {
        format!("{age_s}s ago")
    } else {
        format!("{}m ago", age_s / 60)
    };
    let line = format!("{preview} ({age_label})");
    if visible_width(&line) <= budget {
        line
    } else {
        let mut truncated: String = line.chars().take(budget.saturating_sub(1)).collect();
        truncated.push('\u{2026}');
        truncated
    }
}

/// Render all lines for one width class (spec §4.15 Line 1/2/3 layout).
fn render_for_class(health: &SessionHealth, width_class: u32, now_ms: i64) -> Vec<String> {
    let budget = effective_width(width_class);
    let age_minutes = ((now_ms - health.billing.last_fetched).max(0) as f64) / 60_000.0;

    let (l1, overflow) = line1(health, width_class, budget);
    let mut lines = vec![l1];

    let l2 = if let Some(overflow) = overflow {
        format!("{overflow} {}", line2(health, budget, age_minutes))
    } else {
        line2(health, budget, age_minutes)
    };
    lines.push(l2);

    if !health.transcript.last_message_preview.is_empty() {
        lines.push(line3(health, budget, now_ms));
    }

    lines
}

/// Render the dedicated single-line variant, capped at `SINGLE_LINE_MAX`
/// visible columns (spec §4.15).
fn render_single_line(health: &SessionHealth, now_ms: i64) -> String {
    let budget = SINGLE_LINE_MAX;
    let age_minutes = ((now_ms - health.billing.last_fetched).max(0) as f64) / 60_000.0;
    let (l1, _overflow) = line1(health, 200, budget);
    let l2 = line2(health, budget.saturating_sub(visible_width(&l1) + 1), age_minutes);
    let combined = format!("{l1} | {l2}");
    if visible_width(&combined) <= SINGLE_LINE_MAX {
        combined
    } else {
        combined.chars().take(SINGLE_LINE_MAX).collect()
    }
}

/// Pre-render every width class plus the single-line variant into
/// `SessionHealth.formattedOutput` (spec §4.15). Pure and infallible: a
/// malformed/missing field only yields an emptier line, never an error.
pub fn format_all(health: &SessionHealth, now_ms: i64) -> FormattedOutput {
    let mut by_width_class = std::collections::BTreeMap::new();
    for &class in WIDTH_CLASSES {
        by_width_class.insert(class.to_string(), render_for_class(health, class, now_ms));
    }
    by_width_class.insert("single-line".to_string(), vec![render_single_line(health, now_ms)]);
    FormattedOutput { by_width_class }
}
