// crates/core/src/transcript_scanner.rs
//! `IncrementalTranscriptScanner` — byte-offset-tracked tail reads of
//! append-only logs (spec §4.8). Grounded on `claude-view-server`'s
//! `FilePositionTracker` (`file_tracker.rs`): offset + mtime tracking,
//! truncation handling, and "only complete lines count" discipline, but
//! generalized to spec §4.8's four fast-paths and a hard read-size cap.

use std::path::Path;

/// Reject transcripts larger than this rather than risk OOM on an
/// adversarial or runaway file (spec §4.8 "bound read size").
pub const MAX_SCAN_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanPosition {
    pub offset: u64,
    pub mtime_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub new_bytes: Vec<u8>,
    pub new_offset: u64,
    pub mtime_ms: i64,
    pub size: u64,
    pub cache_hit: bool,
}

impl ScanResult {
    fn zero() -> Self {
        Self::default()
    }
}

fn mtime_ms(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Scan `path` for bytes appended since `prev`, applying spec §4.8's four
/// fast-paths in order. Never returns an `Err` to the orchestrator — any
/// I/O error yields the zero result (spec §4.8 "Any I/O error yields the
/// zero result"); the read-size cap is enforced by truncating to a full
/// re-read capped at `MAX_SCAN_BYTES` rather than by erroring, since a
/// statusline update must never hard-fail on an oversized transcript.
pub fn scan(path: &Path, prev: ScanPosition) -> ScanResult {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return ScanResult::zero(), // file absent or unreadable
    };

    let size = meta.len();
    let mtime = mtime_ms(&meta);

    if mtime == prev.mtime_ms && size == prev.offset {
        return ScanResult {
            new_bytes: Vec::new(),
            new_offset: prev.offset,
            mtime_ms: mtime,
            size,
            cache_hit: true,
        };
    }

    let (read_from, read_to) = if size < prev.offset {
        // Truncated (user cleared it): read the entire file from scratch.
        (0u64, size)
    } else {
        (prev.offset, size)
    };

    let span = read_to - read_from;
    if span > MAX_SCAN_BYTES {
        // Cap: read only the trailing MAX_SCAN_BYTES window rather than
        // the whole thing, to bound memory use on an adversarial file.
        let capped_from = read_to - MAX_SCAN_BYTES;
        return read_span(path, capped_from, read_to, mtime, size);
    }

    read_span(path, read_from, read_to, mtime, size)
}

fn read_span(path: &Path, from: u64, to: u64, mtime: i64, size: u64) -> ScanResult {
    use std::io::{Read, Seek, SeekFrom};

    let Ok(mut file) = std::fs::File::open(path) else {
        return ScanResult::zero();
    };
    if file.seek(SeekFrom::Start(from)).is_err() {
        return ScanResult::zero();
    }
    let mut buf = vec![0u8; (to - from) as usize];
    if file.read_exact(&mut buf).is_err() {
        return ScanResult::zero();
    }

    ScanResult {
        new_bytes: buf,
        new_offset: to,
        mtime_ms: mtime,
        size,
        cache_hit: false,
    }
}

/// Split raw bytes into complete lines, discarding a trailing incomplete
/// line (it will be re-read once it's terminated). Invalid UTF-8 within a
/// line is replaced lossily rather than skipping the whole scan (spec
/// §4.8: "a single malformed line never poisons a scan").
pub fn complete_lines(bytes: &[u8]) -> Vec<String> {
    let Some(last_newline) = bytes.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    bytes[..=last_newline]
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}
