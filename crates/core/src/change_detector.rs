// crates/core/src/change_detector.rs
//! `ChangeDetector` — 32-bit FNV-1a content hash of durable state (spec
//! §4.11). Used to gate optional external sync on actual change rather than
//! on every gather.

use session_health_types::DurableSessionState;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Build the canonical pipe-delimited string over the fixed ordered field
/// set spec §4.11 names, explicitly excluding `updatedAt` and the hash
/// field itself (invariant 7).
fn canonical_string(state: &DurableSessionState) -> String {
    let weekly = state.weekly_percent.map(|p| p.to_string()).unwrap_or_default();
    let git = state.git_branch.clone().unwrap_or_default();

    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        state.session_id,
        state.auth_profile_id,
        state.status,
        state.issues.join(","),
        state.cost_today_cents,
        state.session_cost_cents,
        state.burn_rate_cents_per_hour,
        state.total_tokens,
        state.tokens_per_minute_x100,
        state.model,
        state.model_confidence,
        state.tokens_used,
        state.tokens_left,
        state.percent_used,
        state.alert_bitmask,
        weekly,
        git,
        "", // reserved slot kept stable so future additive fields don't shift existing ones
    )
}

/// `computeHash(state)` (spec §4.11): deterministic FNV-1a 32-bit hash,
/// rendered as 8 lowercase hex digits.
pub fn compute_hash(state: &DurableSessionState) -> String {
    let canonical = canonical_string(state);
    format!("{:08x}", fnv1a_32(canonical.as_bytes()))
}

/// `stamp(state)` (spec §4.11): write the computed hash into `state`,
/// return whether it changed relative to the value already stored there
/// (the record is "new" the first time a hash is computed, i.e. when the
/// previous hash was empty or different).
pub fn stamp(state: &mut DurableSessionState) -> bool {
    let new_hash = compute_hash(state);
    let changed = state.hash != new_hash;
    state.hash = new_hash;
    changed
}
