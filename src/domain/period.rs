use crate::domain::error::DomainError;
use crate::domain::models::{Goal, GoalType};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Civil calendar used for every "now"-relative boundary, independent of the host timezone.
pub const CIVIL_UTC_OFFSET_SECONDS: i32 = 3 * 60 * 60;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_now_provider() -> NowProvider {
    Arc::new(Utc::now)
}

pub fn civil_offset() -> FixedOffset {
    FixedOffset::east_opt(CIVIL_UTC_OFFSET_SECONDS).expect("valid fixed offset")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodRange {
    pub begin: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl PeriodRange {
    /// `begin/end` interval notation accepted by the activity backend.
    pub fn to_timeperiod(&self) -> String {
        format!("{}/{}", self.begin.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Resolves the active window of `goal` for the instant `now`.
///
/// Recurring goals are anchored to `now`, so the window rolls over without touching stored state.
/// `now` is read once by the caller, which keeps begin and end on the same side of a boundary.
pub fn resolve(goal: &Goal, now: DateTime<Utc>) -> Result<PeriodRange, DomainError> {
    let offset = civil_offset();
    let today = now.with_timezone(&offset).date_naive();

    match goal.goal_type {
        GoalType::Daily => day_span(today, today, offset),
        GoalType::Monthly => {
            let first = first_day_of_month(today.year(), today.month())?;
            let last = last_day_of_month(today.year(), today.month())?;
            day_span(first, last, offset)
        }
        GoalType::Yearly => {
            let first = calendar_date(today.year(), 1, 1)?;
            let last = calendar_date(today.year(), 12, 31)?;
            day_span(first, last, offset)
        }
        GoalType::Custom => custom_span(goal, offset),
    }
}

fn custom_span(goal: &Goal, offset: FixedOffset) -> Result<PeriodRange, DomainError> {
    let (Some(begin), Some(end)) = (goal.begin_date, goal.end_date) else {
        return Err(DomainError::InvalidPeriod(
            "custom goals require begin_date and end_date".to_string(),
        ));
    };
    if begin > end {
        return Err(DomainError::InvalidPeriod(format!(
            "custom period begins after it ends: {} > {}",
            begin.to_rfc3339(),
            end.to_rfc3339()
        )));
    }
    Ok(PeriodRange {
        begin: begin.with_timezone(&offset),
        end: end.with_timezone(&offset),
    })
}

fn day_span(
    first: NaiveDate,
    last: NaiveDate,
    offset: FixedOffset,
) -> Result<PeriodRange, DomainError> {
    let start_of_day = fixed_time(0, 0, 0)?;
    let end_of_day = fixed_time(23, 59, 59)?;
    Ok(PeriodRange {
        begin: civil_instant(first, start_of_day, offset)?,
        end: civil_instant(last, end_of_day, offset)?,
    })
}

fn fixed_time(hour: u32, minute: u32, second: u32) -> Result<NaiveTime, DomainError> {
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
        DomainError::InvalidPeriod(format!("invalid time {hour:02}:{minute:02}:{second:02}"))
    })
}

fn civil_instant(
    date: NaiveDate,
    time: NaiveTime,
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>, DomainError> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| {
            DomainError::InvalidPeriod(format!("unrepresentable civil time {date} {time}"))
        })
}

fn calendar_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, DomainError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        DomainError::InvalidPeriod(format!("invalid date {year}-{month:02}-{day:02}"))
    })
}

fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate, DomainError> {
    calendar_date(year, month, 1)
}

fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, DomainError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    calendar_date(next_year, next_month, 1)?
        .pred_opt()
        .ok_or_else(|| DomainError::InvalidPeriod(format!("no last day for {year}-{month:02}")))
}
