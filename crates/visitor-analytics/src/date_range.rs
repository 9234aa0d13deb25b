//! Calendar range classification.
//!
//! Every named range is a half-open window `[start, end)` whose bounds are
//! local midnights relative to "now". Custom ranges include the whole end day.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use visitor_core::config::WeekStart;

/// A named date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RangeType {
    #[default]
    All,
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    LastMonth,
    ThisYear,
    Custom,
}

impl RangeType {
    /// Parse a range name. Unknown names fall back to [`RangeType::All`].
    ///
    /// Case, `-` and `_` are ignored, so `thisWeek`, `this_week` and
    /// `this-week` are the same range. The legacy persisted names
    /// (`vandaag`, `deze-week`, ...) are accepted too.
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.trim() {
            "" | "all" | "alles" => RangeType::All,
            "today" | "vandaag" => RangeType::Today,
            "yesterday" | "gisteren" => RangeType::Yesterday,
            "thisweek" | "dezeweek" => RangeType::ThisWeek,
            "lastweek" | "vorigeweek" => RangeType::LastWeek,
            "lastmonth" | "vorigemaand" => RangeType::LastMonth,
            "thisyear" | "ditjaar" => RangeType::ThisYear,
            "custom" | "aangepast" => RangeType::Custom,
            _ => {
                tracing::debug!("Unknown range type {:?}, treating as all", name);
                RangeType::All
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeType::All => "all",
            RangeType::Today => "today",
            RangeType::Yesterday => "yesterday",
            RangeType::ThisWeek => "thisWeek",
            RangeType::LastWeek => "lastWeek",
            RangeType::LastMonth => "lastMonth",
            RangeType::ThisYear => "thisYear",
            RangeType::Custom => "custom",
        }
    }
}

impl From<String> for RangeType {
    fn from(name: String) -> Self {
        RangeType::parse(&name)
    }
}

impl From<RangeType> for String {
    fn from(range: RangeType) -> Self {
        range.as_str().to_string()
    }
}

impl fmt::Display for RangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open instant window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Classifies instants against ranges relative to a fixed "now".
#[derive(Debug, Clone)]
pub struct DateRangeClassifier<Tz: TimeZone> {
    now: DateTime<Tz>,
    week_start: WeekStart,
}

impl DateRangeClassifier<Local> {
    /// Classifier for the current local time.
    pub fn local(week_start: WeekStart) -> Self {
        Self::at(Local::now(), week_start)
    }
}

impl<Tz: TimeZone> DateRangeClassifier<Tz> {
    pub fn at(now: DateTime<Tz>, week_start: WeekStart) -> Self {
        Self { now, week_start }
    }

    /// The window a range selects, or `None` when it does not constrain.
    ///
    /// `All` is unconstrained, and so is `Custom` unless both bounds are set.
    pub fn window(
        &self,
        range: RangeType,
        custom_from: Option<NaiveDate>,
        custom_to: Option<NaiveDate>,
    ) -> Option<DateWindow> {
        let tz = self.now.timezone();
        let today = self.now.date_naive();

        match range {
            RangeType::All => None,
            RangeType::Today => span(&tz, today, shift(today, 1)?),
            RangeType::Yesterday => span(&tz, shift(today, -1)?, today),
            RangeType::ThisWeek => {
                let start = self.week_start_of(today)?;
                span(&tz, start, shift(start, 7)?)
            }
            RangeType::LastWeek => {
                let start = self.week_start_of(today)?;
                span(&tz, shift(start, -7)?, start)
            }
            RangeType::LastMonth => {
                let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
                let prev_month = if today.month() == 1 {
                    NaiveDate::from_ymd_opt(today.year() - 1, 12, 1)?
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() - 1, 1)?
                };
                span(&tz, prev_month, this_month)
            }
            RangeType::ThisYear => {
                let jan_first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
                let next_year = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?;
                span(&tz, jan_first, next_year)
            }
            RangeType::Custom => match (custom_from, custom_to) {
                (Some(from), Some(to)) => span(&tz, from, shift(to, 1)?),
                _ => None,
            },
        }
    }

    /// Whether `instant` falls in the range.
    ///
    /// An unreadable instant (`None`) matches only unconstrained ranges.
    pub fn classify(
        &self,
        instant: Option<DateTime<Utc>>,
        range: RangeType,
        custom_from: Option<NaiveDate>,
        custom_to: Option<NaiveDate>,
    ) -> bool {
        match self.window(range, custom_from, custom_to) {
            None => true,
            Some(window) => instant.is_some_and(|t| window.contains(t)),
        }
    }

    fn week_start_of(&self, day: NaiveDate) -> Option<NaiveDate> {
        let offset = match self.week_start {
            WeekStart::Sunday => day.weekday().num_days_from_sunday(),
            WeekStart::Monday => day.weekday().num_days_from_monday(),
        };
        shift(day, -i64::from(offset))
    }
}

/// Classify against the current local time with Sunday-start weeks.
pub fn classify(
    instant: Option<DateTime<Utc>>,
    range: RangeType,
    custom_from: Option<NaiveDate>,
    custom_to: Option<NaiveDate>,
) -> bool {
    DateRangeClassifier::local(WeekStart::Sunday).classify(instant, range, custom_from, custom_to)
}

fn shift(day: NaiveDate, days: i64) -> Option<NaiveDate> {
    day.checked_add_signed(Duration::days(days))
}

fn span<Tz: TimeZone>(tz: &Tz, from: NaiveDate, to: NaiveDate) -> Option<DateWindow> {
    Some(DateWindow {
        start: start_of_day(tz, from)?,
        end: start_of_day(tz, to)?,
    })
}

/// First instant of `day` in `tz`.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST jump: the day starts after the gap.
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}
