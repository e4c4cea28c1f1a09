//! Daily collection schedule.
//!
//! A thin wrapper over the same pipeline entry point the HTTP surface
//! uses: once a day at a configured KST wall-clock time it requests the
//! market-cap stage. Downstream stages are not chained automatically — an
//! operator (or the UI) advances the pipeline after checking status, same
//! as a manual run.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveTime};

use kboard_core::clock::now_kst;

use crate::orchestrator::Orchestrator;
use crate::stage::CollectionStage;

/// A daily KST wall-clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    /// Hour of day (0-23).
    pub hour: u32,
    /// Minute of hour (0-59).
    pub minute: u32,
}

impl DailySchedule {
    /// Parses `"HH:MM"`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (h, m) = s.split_once(':')?;
        let hour: u32 = h.parse().ok()?;
        let minute: u32 = m.parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    /// Seconds from now (KST) until the next occurrence of this tick.
    fn seconds_until_next(self) -> u64 {
        let now = now_kst();
        // Out-of-range fields (the struct is freely constructible) fall
        // back to midnight.
        let tick_time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default();
        let today_tick = now.date_naive().and_time(tick_time);
        let now_naive = now.naive_local();
        let next = if now_naive < today_tick {
            today_tick
        } else {
            today_tick + ChronoDuration::days(1)
        };
        let delta = next - now_naive;
        u64::try_from(delta.num_seconds()).unwrap_or(0).max(1)
    }
}

/// Runs the daily schedule forever.
///
/// Each tick requests the market-cap stage; a locked pipeline or an
/// evaluation failure is logged and the loop waits for the next tick.
pub async fn run_daily(orchestrator: Arc<Orchestrator>, schedule: DailySchedule) {
    tracing::info!(
        hour = schedule.hour,
        minute = schedule.minute,
        "daily collection schedule active (KST)"
    );
    loop {
        let wait = schedule.seconds_until_next();
        tracing::debug!(seconds = wait, "sleeping until next collection tick");
        tokio::time::sleep(std::time::Duration::from_secs(wait)).await;

        match orchestrator
            .request_stage(CollectionStage::MarketCap, None)
            .await
        {
            Ok(()) => tracing::info!("scheduled market-cap collection started"),
            Err(err) => tracing::warn!(error = %err, "scheduled collection skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ticks() {
        assert_eq!(
            DailySchedule::parse("06:30"),
            Some(DailySchedule {
                hour: 6,
                minute: 30
            })
        );
        assert_eq!(DailySchedule::parse("0:5"), Some(DailySchedule { hour: 0, minute: 5 }));
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert_eq!(DailySchedule::parse("24:00"), None);
        assert_eq!(DailySchedule::parse("12:60"), None);
        assert_eq!(DailySchedule::parse("noon"), None);
        assert_eq!(DailySchedule::parse(""), None);
    }

    #[test]
    fn next_tick_is_within_a_day() {
        let schedule = DailySchedule { hour: 6, minute: 0 };
        let wait = schedule.seconds_until_next();
        assert!(wait >= 1);
        assert!(wait <= 24 * 3600);
    }
}
