// crates/core/src/sanitizer.rs
//! Path- and log-safe string sanitization (spec §4.1).
//!
//! All operations here are pure — no I/O, no observable side effects —
//! mirroring `claude-view-core`'s leaf-module style (e.g. `paths.rs`).

const MAX_SESSION_ID_LEN: usize = 128;
const MAX_ERROR_STRING_LEN: usize = 120;
const FALLBACK_SESSION_ID: &str = "unknown-session";

/// Sanitize a session identifier for safe use as a filename component.
///
/// Collapses `..`, strips leading dots, replaces path separators and any
/// character outside `[A-Za-z0-9._-]` with `_`, caps at 128 characters,
/// and falls back to `"unknown-session"` if the result would be empty.
pub fn sanitize_session_id(raw: &str) -> String {
    let without_traversal = raw.replace("..", "");
    let trimmed = without_traversal.trim_start_matches('.');

    let mut out: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    out.truncate(MAX_SESSION_ID_LEN);

    if out.is_empty() {
        FALLBACK_SESSION_ID.to_string()
    } else {
        out
    }
}

/// Sanitize an arbitrary error/log string: first line only, secrets
/// redacted, capped at 120 characters.
pub fn sanitize_error_string(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or("");
    let redacted = redact_secrets(first_line);
    truncate_chars(&redacted, MAX_ERROR_STRING_LEN)
}

/// Redact URLs, bearer tokens, API-key-shaped substrings, and `token=...`
/// assignments from a string, replacing each with `[REDACTED]`.
fn redact_secrets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        match find_next_secret(rest) {
            Some((start, end)) => {
                out.push_str(&rest[..start]);
                out.push_str("[REDACTED]");
                rest = &rest[end..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }

    out
}

/// Find the next secret-shaped span `(start, end)` in `s`, scanning token
/// by token (split on ASCII whitespace boundaries handled manually so we
/// keep surrounding punctuation out of the match when possible).
fn find_next_secret(s: &str) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    let mut i = 0usize;
    let mut best: Option<(usize, usize)> = None;

    while i < bytes.len() {
        // Skip to the start of the next "word" (non-whitespace run).
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let word_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if word_start == i {
            break;
        }
        let word = &s[word_start..i];

        if is_bearer_token(word) {
            // Extend the match to swallow the token value in the next word
            // too ("Bearer xyz123..." must not leave "xyz123..." exposed).
            let mut end = i;
            while end < bytes.len() && bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            let value_start = end;
            while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            best = Some((word_start, if end > value_start { end } else { i }));
            break;
        }

        if is_url(word) || is_api_key(word) || is_token_assignment(word) {
            best = Some((word_start, i));
            break;
        }
    }

    best
}

fn is_url(word: &str) -> bool {
    word.starts_with("http://") || word.starts_with("https://")
}

fn is_bearer_token(word: &str) -> bool {
    word.eq_ignore_ascii_case("bearer")
}

fn is_api_key(word: &str) -> bool {
    (word.starts_with("sk-") && word.len() >= 23)
        || (word.starts_with("AKIA") && word.len() == 20 && word[4..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
        || ((word.starts_with("ghp_") || word.starts_with("ghs_")) && word.len() >= 40)
}

fn is_token_assignment(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.starts_with("token=") && word.len() > "token=".len()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Redact an email address: preserve the first two characters and the
/// entire domain (`ab***@example.com`). Non-email input is truncated to
/// 3 characters plus `***`.
pub fn redact_email(raw: &str) -> String {
    match raw.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            let keep: String = local.chars().take(2).collect();
            format!("{keep}***@{domain}")
        }
        _ => {
            let keep: String = raw.chars().take(3).collect();
            format!("{keep}***")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_plain_session_id_unchanged() {
        assert_eq!(sanitize_session_id("abc-123_session.1"), "abc-123_session.1");
    }

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(sanitize_session_id("../../etc/passwd"), "_etc_passwd");
    }

    #[test]
    fn sanitize_strips_leading_dots() {
        assert_eq!(sanitize_session_id("...hidden"), "hidden");
    }

    #[test]
    fn sanitize_replaces_disallowed_chars() {
        assert_eq!(sanitize_session_id("sess/with spaces!"), "sess_with_spaces_");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(300);
        let out = sanitize_session_id(&long);
        assert_eq!(out.len(), MAX_SESSION_ID_LEN);
    }

    #[test]
    fn sanitize_empty_falls_back() {
        assert_eq!(sanitize_session_id(""), FALLBACK_SESSION_ID);
        assert_eq!(sanitize_session_id("..."), FALLBACK_SESSION_ID);
    }

    #[test]
    fn error_string_takes_first_line_only() {
        let out = sanitize_error_string("first line\nsecond line");
        assert_eq!(out, "first line");
    }

    #[test]
    fn error_string_redacts_bearer_and_url() {
        let out = sanitize_error_string("failed calling https://api.example.com/v1 with Bearer xyz123secretvalue");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("api.example.com"));
        assert!(!out.contains("xyz123secretvalue"));
    }

    #[test]
    fn error_string_redacts_api_key_patterns() {
        let out = sanitize_error_string("key sk-abcdefghijklmnopqrstuvwxyz invalid");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("sk-abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn error_string_redacts_token_assignment() {
        let out = sanitize_error_string("auth failed token=abc123supersecret");
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn error_string_caps_at_120_chars() {
        let long = "x".repeat(500);
        let out = sanitize_error_string(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_STRING_LEN);
    }

    #[test]
    fn email_redaction_preserves_prefix_and_domain() {
        assert_eq!(redact_email("alice@example.com"), "al***@example.com");
    }

    #[test]
    fn non_email_redaction_truncates() {
        assert_eq!(redact_email("not-an-email"), "not***");
    }
}
