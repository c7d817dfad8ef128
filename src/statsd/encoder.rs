//! StatsD line encoding.
//!
//! `<prefix>.<name>:<value>|<g|c|ms>`, one line per metric-value pair,
//! newline-joined into size-bounded payloads.

use std::time::Duration;

use crate::metrics::{MetricKind, Snapshot, SnapshotValue};

/// Namespace used by the serving engine.
pub const DEFAULT_PREFIX: &str = "vllm";

/// Safe UDP payload size across the public internet.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 512;

/// Turns snapshots into StatsD lines.
#[derive(Debug, Clone)]
pub struct StatsdEncoder {
    prefix: String,
}

impl StatsdEncoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: sanitize(&prefix.into()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encode every metric in the snapshot. Non-finite values are dropped;
    /// the rest of the batch is kept.
    pub fn encode(&self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::with_capacity(snapshot.len());
        let mut dropped = 0usize;

        for (name, value) in &snapshot.metrics {
            match value {
                SnapshotValue::Gauge { value } => {
                    push_or_count(&mut lines, &mut dropped, self.line(name, *value, MetricKind::Gauge))
                }
                SnapshotValue::Counter { delta, .. } => {
                    push_or_count(&mut lines, &mut dropped, self.line(name, *delta, MetricKind::Counter))
                }
                SnapshotValue::Timer { observations } => {
                    for d in observations {
                        push_or_count(&mut lines, &mut dropped, self.timer_line(name, *d));
                    }
                }
            }
        }

        if dropped > 0 {
            tracing::debug!(dropped, "non-finite metric values left out of batch");
        }
        lines
    }

    /// One line, or `None` when the value has no wire representation.
    pub fn line(&self, name: &str, value: f64, kind: MetricKind) -> Option<String> {
        let value = format_value(value)?;
        Some(format!(
            "{}.{}:{}|{}",
            self.prefix,
            sanitize(name),
            value,
            kind.wire_type()
        ))
    }

    /// Timer line with the duration converted to milliseconds.
    pub fn timer_line(&self, name: &str, elapsed: Duration) -> Option<String> {
        self.line(name, duration_ms(elapsed), MetricKind::Timer)
    }
}

impl Default for StatsdEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn push_or_count(lines: &mut Vec<String>, dropped: &mut usize, line: Option<String>) {
    match line {
        Some(l) => lines.push(l),
        None => *dropped += 1,
    }
}

// ─── Value / name formatting ─────────────────────────────────────

/// Milliseconds rounded to microsecond precision.
pub fn duration_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1_000_000.0).round() / 1_000.0
}

/// `f64` Display is locale independent, shortest round-trip and never uses
/// an exponent; integral values print without a fraction (`42`).
pub fn format_value(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    // Avoid "-0" on the wire
    let value = if value == 0.0 { 0.0 } else { value };
    Some(format!("{value}"))
}

/// Replace the characters that would break line framing.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '|' | '@' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect()
}

// ─── Payload packing ─────────────────────────────────────────────

/// Join lines with `\n` into payloads of at most `max_bytes`.
///
/// Batches are split across payloads rather than truncated; a line that is
/// longer than the limit on its own travels in its own payload.
pub fn pack(lines: &[String], max_bytes: usize) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for line in lines {
        let needed = if current.is_empty() { line.len() } else { line.len() + 1 };
        if !current.is_empty() && current.len() + needed > max_bytes {
            payloads.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(b'\n');
        }
        current.extend_from_slice(line.as_bytes());
    }

    if !current.is_empty() {
        payloads.push(current);
    }
    payloads
}

// ─── Reference parser ────────────────────────────────────────────

/// Parse one StatsD line back into `(name, kind, value)`.
/// Sample rates (`|@0.5`) and tags are not produced by the encoder and are
/// rejected.
pub fn parse_line(line: &str) -> Option<(String, MetricKind, f64)> {
    let (name, rest) = line.rsplit_once(':')?;
    let (value, ty) = rest.split_once('|')?;
    let kind = match ty {
        "g" => MetricKind::Gauge,
        "c" => MetricKind::Counter,
        "ms" => MetricKind::Timer,
        _ => return None,
    };
    if name.is_empty() {
        return None;
    }
    let value: f64 = value.parse().ok()?;
    Some((name.to_owned(), kind, value))
}
