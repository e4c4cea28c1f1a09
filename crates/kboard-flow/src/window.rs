//! Period/window resolution.
//!
//! Translates a symbolic time-window selector plus optional explicit bounds
//! into a concrete calendar date range. Symbolic keys always end at the
//! canonical "today" (KST); `custom` requires both bounds. The key set and
//! lookback lengths are a contract with the Best-K worker, which stores
//! results under the same labels.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Symbolic time-window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKey {
    /// Last 3 calendar days.
    #[serde(rename = "days_3")]
    Days3,
    /// Last week.
    #[serde(rename = "week_1")]
    Week1,
    /// Last 30 days.
    #[serde(rename = "month_1")]
    Month1,
    /// Last 90 days.
    #[serde(rename = "month_3")]
    Month3,
    /// Alias for `month_3`; accepted on the wire, stored as `month_3`.
    #[serde(rename = "quarter")]
    Quarter,
    /// Last 180 days.
    #[serde(rename = "half_year")]
    HalfYear,
    /// Last 365 days.
    #[serde(rename = "year_1")]
    Year1,
    /// Caller-supplied explicit bounds.
    #[serde(rename = "custom")]
    Custom,
}

impl PeriodKey {
    /// The symbolic (non-custom) keys, in menu order.
    pub const SYMBOLIC: [Self; 6] = [
        Self::Days3,
        Self::Week1,
        Self::Month1,
        Self::Month3,
        Self::HalfYear,
        Self::Year1,
    ];

    /// Lookback length in days; `None` for `custom`.
    #[must_use]
    pub const fn lookback_days(self) -> Option<i64> {
        match self {
            Self::Days3 => Some(3),
            Self::Week1 => Some(7),
            Self::Month1 => Some(30),
            Self::Month3 | Self::Quarter => Some(90),
            Self::HalfYear => Some(180),
            Self::Year1 => Some(365),
            Self::Custom => None,
        }
    }

    /// The canonical key under which results are stored. `quarter` shares
    /// the `month_3` label; every other key is its own canonical form.
    #[must_use]
    pub const fn canonical(self) -> Self {
        match self {
            Self::Quarter => Self::Month3,
            other => other,
        }
    }

    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Days3 => "days_3",
            Self::Week1 => "week_1",
            Self::Month1 => "month_1",
            Self::Month3 => "month_3",
            Self::Quarter => "quarter",
            Self::HalfYear => "half_year",
            Self::Year1 => "year_1",
            Self::Custom => "custom",
        }
    }

    /// Human-readable label for period menus.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Days3 => "3 days",
            Self::Week1 => "1 week",
            Self::Month1 => "1 month",
            Self::Month3 | Self::Quarter => "3 months",
            Self::HalfYear => "6 months",
            Self::Year1 => "1 year",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for PeriodKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "days_3" => Ok(Self::Days3),
            "week_1" => Ok(Self::Week1),
            "month_1" => Ok(Self::Month1),
            "month_3" => Ok(Self::Month3),
            "quarter" => Ok(Self::Quarter),
            "half_year" => Ok(Self::HalfYear),
            "year_1" => Ok(Self::Year1),
            "custom" => Ok(Self::Custom),
            other => Err(Error::unknown_period(other)),
        }
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved concrete date range plus optional market filter for a Best-K
/// computation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    /// The period key the window was resolved from (canonical form).
    pub period: PeriodKey,
    /// Inclusive start date.
    pub start: NaiveDate,
    /// Inclusive end date. Always `today` for symbolic keys.
    pub end: NaiveDate,
    /// Optional market filter (e.g. KOSPI, KOSDAQ).
    pub market: Option<String>,
}

/// Resolves a period key and optional explicit bounds into a window.
///
/// `today` is the canonical KST calendar day, passed in so the resolver
/// stays pure; callers use [`kboard_core::clock::today_kst`].
///
/// # Errors
///
/// - [`Error::MissingBounds`] if `custom` lacks either bound
/// - [`Error::InvalidWindow`] if `start > end`
pub fn resolve(
    key: PeriodKey,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    market: Option<String>,
    today: NaiveDate,
) -> Result<WindowSpec> {
    let (start, end) = match key.lookback_days() {
        Some(days) => (today - Duration::days(days), today),
        None => {
            let (Some(start), Some(end)) = (start, end) else {
                return Err(Error::MissingBounds);
            };
            (start, end)
        }
    };

    if start > end {
        return Err(Error::invalid_window(format!(
            "startDate {start} is after endDate {end}"
        )));
    }

    Ok(WindowSpec {
        period: key.canonical(),
        start,
        end,
        market,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid date literal")
    }

    const TODAY: &str = "2024-06-14";

    #[test]
    fn symbolic_keys_end_today_and_look_back() {
        let today = date(TODAY);
        for key in PeriodKey::SYMBOLIC {
            let spec = resolve(key, None, None, None, today).expect("resolves");
            assert_eq!(spec.end, today, "{key}");
            let days = key.lookback_days().expect("symbolic key has lookback");
            assert_eq!(spec.start, today - Duration::days(days), "{key}");
        }
    }

    #[test]
    fn quarter_resolves_like_month_3() {
        let today = date(TODAY);
        let quarter = resolve(PeriodKey::Quarter, None, None, None, today).unwrap();
        let month_3 = resolve(PeriodKey::Month3, None, None, None, today).unwrap();
        assert_eq!(quarter.start, month_3.start);
        assert_eq!(quarter.period, PeriodKey::Month3);
    }

    #[test]
    fn custom_requires_both_bounds() {
        let today = date(TODAY);
        let err = resolve(
            PeriodKey::Custom,
            None,
            Some(date("2024-01-01")),
            None,
            today,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingBounds));

        let err = resolve(
            PeriodKey::Custom,
            Some(date("2024-01-01")),
            None,
            None,
            today,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingBounds));
    }

    #[test]
    fn custom_rejects_inverted_bounds() {
        let err = resolve(
            PeriodKey::Custom,
            Some(date("2024-02-01")),
            Some(date("2024-01-01")),
            None,
            date(TODAY),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidWindow { .. }));
    }

    #[test]
    fn custom_accepts_explicit_bounds_and_market() {
        let spec = resolve(
            PeriodKey::Custom,
            Some(date("2024-01-01")),
            Some(date("2024-02-01")),
            Some("KOSPI".to_string()),
            date(TODAY),
        )
        .unwrap();
        assert_eq!(spec.start, date("2024-01-01"));
        assert_eq!(spec.end, date("2024-02-01"));
        assert_eq!(spec.market.as_deref(), Some("KOSPI"));
    }

    #[test]
    fn unknown_key_fails_parse() {
        let err = "fortnight".parse::<PeriodKey>().unwrap_err();
        assert!(matches!(err, Error::UnknownPeriod { .. }));
    }
}
