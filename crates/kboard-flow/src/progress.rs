//! Live progress tracking for running workers.
//!
//! Workers emit human-readable lines containing a bracketed
//! `[current/total]` marker (`[37/200] Samsung Electronics ...`). Each line
//! of worker output is scanned incrementally — never a whole-buffer pass —
//! and matching fractions update the tracker. Many HTTP pollers read the
//! tracker concurrently; only the single in-flight worker stream writes.
//!
//! Progress state is a live hint, not authoritative: it is lost on restart
//! and the status evaluator remains the source of truth for completion.

use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::stage::CollectionStage;

/// Read-only view of a tracker, served to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Items processed so far.
    pub current: u64,
    /// Expected total items.
    pub total: u64,
    /// `floor(current / total * 100)`, clamped to `[0, 100]`; 0 when
    /// `total` is 0.
    pub percent: u64,
    /// Whether a worker is currently streaming output to this tracker.
    pub is_running: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    current: u64,
    total: u64,
    is_running: bool,
}

/// Mutable progress counters for one stage kind.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    /// Creates an idle tracker with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to `{current: 0, total, is_running: true}`. Called when a
    /// stage launches; the first parsed marker overwrites `total`.
    pub fn reset(&self, total: u64) {
        let mut state = self.write();
        state.current = 0;
        state.total = total;
        state.is_running = true;
    }

    /// Clears the running flag, leaving the last counters visible.
    pub fn finish(&self) {
        self.write().is_running = false;
    }

    /// Scans one worker output line for a `[current/total]` marker and
    /// applies it. Values are accepted as-is; the worker is trusted to
    /// emit ordered progress, so no monotonicity is enforced.
    pub fn observe_line(&self, line: &str) {
        if let Some((current, total)) = parse_marker(line) {
            let mut state = self.write();
            state.current = current;
            state.total = total;
        }
    }

    /// Returns a consistent snapshot of the counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let percent = if state.total == 0 {
            0
        } else {
            // Widened so worker-supplied values near u64::MAX cannot
            // overflow the scaling multiply.
            let scaled = u128::from(state.current) * 100 / u128::from(state.total);
            u64::try_from(scaled.min(100)).unwrap_or(100)
        };
        ProgressSnapshot {
            current: state.current,
            total: state.total,
            percent,
            is_running: state.is_running,
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scans `line` for the first bracketed digits/slash/digits marker.
///
/// The textual delimiters are an external-worker contract: `[`, digits,
/// `/`, digits, `]` with nothing else between the brackets. Bracketed tags
/// like `[SKIP]` or `[ERROR]` do not match.
fn parse_marker(line: &str) -> Option<(u64, u64)> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some((current, total, end)) = parse_fraction(bytes, i + 1) {
                debug_assert!(bytes[end] == b']');
                return Some((current, total));
            }
        }
        i += 1;
    }
    None
}

/// Parses `digits '/' digits ']'` starting at `start`; returns the pair and
/// the index of the closing bracket.
fn parse_fraction(bytes: &[u8], start: usize) -> Option<(u64, u64, usize)> {
    let (current, after_current) = parse_digits(bytes, start)?;
    if bytes.get(after_current) != Some(&b'/') {
        return None;
    }
    let (total, after_total) = parse_digits(bytes, after_current + 1)?;
    if bytes.get(after_total) != Some(&b']') {
        return None;
    }
    Some((current, total, after_total))
}

fn parse_digits(bytes: &[u8], start: usize) -> Option<(u64, usize)> {
    let mut i = start;
    let mut value: u64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value.checked_mul(10)?.checked_add(u64::from(bytes[i] - b'0'))?;
        i += 1;
    }
    if i == start {
        return None;
    }
    Some((value, i))
}

/// Process-wide progress trackers, one per stage kind.
///
/// The two collection stages report through a single tracker (they share
/// one progress surface and never run concurrently); Best-K has its own.
/// Passed by reference into the orchestrator and the route handlers rather
/// than living in module-level globals.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    collect: ProgressTracker,
    best_k: ProgressTracker,
}

impl ProgressRegistry {
    /// Creates a registry with idle trackers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracker that receives the given stage's worker output.
    #[must_use]
    pub fn tracker(&self, stage: CollectionStage) -> &ProgressTracker {
        match stage {
            CollectionStage::MarketCap | CollectionStage::Ohlcv => &self.collect,
            CollectionStage::BestK => &self.best_k,
        }
    }

    /// The shared tracker for the two collection stages.
    #[must_use]
    pub fn collect(&self) -> &ProgressTracker {
        &self.collect
    }

    /// The Best-K tracker.
    #[must_use]
    pub fn best_k(&self) -> &ProgressTracker {
        &self.best_k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marker_anywhere_in_line() {
        assert_eq!(parse_marker("[10/200] Samsung (005930)"), Some((10, 200)));
        assert_eq!(
            parse_marker("2024-06-14 INFO [37/200] processing"),
            Some((37, 200))
        );
    }

    #[test]
    fn ignores_non_fraction_brackets() {
        assert_eq!(parse_marker("[SKIP] not enough data"), None);
        assert_eq!(parse_marker("[ERROR] boom"), None);
        assert_eq!(parse_marker("no brackets at all"), None);
        assert_eq!(parse_marker("[10/] half a marker"), None);
        assert_eq!(parse_marker("[/200] other half"), None);
    }

    #[test]
    fn skips_tag_then_matches_real_marker() {
        assert_eq!(parse_marker("[SUCCESS] saved [180/200]"), Some((180, 200)));
    }

    #[test]
    fn tracker_applies_lines_in_order() {
        let tracker = ProgressTracker::new();
        tracker.reset(200);
        tracker.observe_line("... [10/200] ...");
        tracker.observe_line("... [200/200] ...");

        let snap = tracker.snapshot();
        assert_eq!(snap.current, 200);
        assert_eq!(snap.total, 200);
        assert_eq!(snap.percent, 100);
        assert!(snap.is_running);
    }

    #[test]
    fn percent_floors_and_never_divides_by_zero() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot().percent, 0);

        tracker.reset(0);
        assert_eq!(tracker.snapshot().percent, 0);

        tracker.reset(3);
        tracker.observe_line("[1/3] a");
        assert_eq!(tracker.snapshot().percent, 33);
    }

    #[test]
    fn extreme_marker_values_do_not_overflow_percent() {
        let tracker = ProgressTracker::new();
        tracker.reset(200);

        // Largest value parse_digits accepts; the scaling multiply must
        // not wrap.
        tracker.observe_line("[18446744073709551615/18446744073709551615] all");
        assert_eq!(tracker.snapshot().percent, 100);

        tracker.observe_line("[18446744073709551615/2] runaway current");
        assert_eq!(tracker.snapshot().percent, 100);
    }

    #[test]
    fn decreasing_values_are_accepted_as_is() {
        let tracker = ProgressTracker::new();
        tracker.reset(200);
        tracker.observe_line("[50/200] x");
        tracker.observe_line("[40/200] retry window");
        assert_eq!(tracker.snapshot().current, 40);
    }

    #[test]
    fn finish_clears_running_but_keeps_counters() {
        let tracker = ProgressTracker::new();
        tracker.reset(10);
        tracker.observe_line("[10/10] done");
        tracker.finish();

        let snap = tracker.snapshot();
        assert!(!snap.is_running);
        assert_eq!(snap.percent, 100);
    }

    #[test]
    fn registry_shares_the_collect_tracker() {
        let registry = ProgressRegistry::new();
        registry
            .tracker(CollectionStage::MarketCap)
            .observe_line("[5/50] x");
        assert_eq!(registry.tracker(CollectionStage::Ohlcv).snapshot().current, 5);
        assert_eq!(registry.best_k().snapshot().current, 0);
    }
}
