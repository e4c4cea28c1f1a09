//! Canonical calendar-day reference.
//!
//! Every "today" decision in the pipeline — the status evaluator's
//! freshness checks and the period resolver's window arithmetic — must use
//! the same calendar-day boundary. The collected markets operate on Korea
//! Standard Time, so the canonical day is the KST calendar day.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// KST is a fixed UTC+9 offset with no daylight saving.
const KST_OFFSET_SECONDS: i32 = 9 * 3600;

fn kst() -> FixedOffset {
    // Statically valid offset; east_opt only fails outside +/-24h.
    FixedOffset::east_opt(KST_OFFSET_SECONDS).expect("KST offset is within range")
}

/// Returns the current instant in KST.
#[must_use]
pub fn now_kst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

/// Returns the canonical "today" as a KST calendar date.
#[must_use]
pub fn today_kst() -> NaiveDate {
    now_kst().date_naive()
}
