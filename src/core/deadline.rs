//! Race deadline computation
//!
//! Betting closes a fixed margin before the posted start time. All times are
//! local wall-clock times on the race date embedded in the race id.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{RaceId, RaceIdError};

/// Default gap between betting close and the posted start time
pub const DEFAULT_DEADLINE_MARGIN_SECS: i64 = 60;

/// Stand-in posted time when a provider does not know it
pub const DEFAULT_POSTED_TIME: &str = "10:00";

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Fixed time, for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadlineParseError {
    #[error("invalid race id: {0}")]
    InvalidRaceId(#[from] RaceIdError),

    #[error("race id does not start with a valid date: {0}")]
    InvalidDate(String),

    #[error("invalid posted time {0:?}, expected HH:MM")]
    InvalidPostedTime(String),

    #[error("deadline margin of {0}s is out of range")]
    MarginOutOfRange(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineStatus {
    Active,
    Past,
    /// Deadline could not be computed; never read as active
    Unknown,
}

/// Deadline classification for one race at a reference time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineInfo {
    pub posted_time: Option<NaiveDateTime>,
    pub deadline: Option<NaiveDateTime>,
    pub reference_time: NaiveDateTime,
    pub is_past: Option<bool>,
    pub seconds_until_deadline: Option<i64>,
    pub status: DeadlineStatus,
    pub deadline_margin_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeadlineInfo {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Human readable status, if the deadline is known
    pub fn time_status(&self) -> Option<String> {
        self.seconds_until_deadline.map(format_time_status)
    }
}

/// Combine the race date with an HH:MM posted time
pub fn posted_datetime(
    race_id: &str,
    posted_time: &str,
) -> Result<NaiveDateTime, DeadlineParseError> {
    let race_id = RaceId::parse(race_id)?;
    let date = NaiveDate::parse_from_str(race_id.date_key(), "%Y%m%d")
        .map_err(|_| DeadlineParseError::InvalidDate(race_id.date_key().to_string()))?;
    let time = NaiveTime::parse_from_str(posted_time.trim(), "%H:%M")
        .map_err(|_| DeadlineParseError::InvalidPostedTime(posted_time.to_string()))?;
    Ok(date.and_time(time))
}

/// Compute deadline info
///
/// `seconds_until_deadline` is floored and negative after the deadline.
/// Parse failures are reported in `error` with `status: Unknown`.
pub fn deadline_info(
    race_id: &str,
    posted_time: &str,
    reference_time: NaiveDateTime,
    margin_seconds: i64,
) -> DeadlineInfo {
    let resolved = posted_datetime(race_id, posted_time).and_then(|posted| {
        let deadline = Duration::try_seconds(margin_seconds)
            .and_then(|margin| posted.checked_sub_signed(margin))
            .ok_or(DeadlineParseError::MarginOutOfRange(margin_seconds))?;
        Ok((posted, deadline))
    });
    let (posted, deadline) = match resolved {
        Ok(times) => times,
        Err(e) => {
            return DeadlineInfo {
                posted_time: None,
                deadline: None,
                reference_time,
                is_past: None,
                seconds_until_deadline: None,
                status: DeadlineStatus::Unknown,
                deadline_margin_seconds: margin_seconds,
                error: Some(e.to_string()),
            }
        }
    };

    let is_past = reference_time > deadline;
    let millis = (deadline - reference_time).num_milliseconds();

    DeadlineInfo {
        posted_time: Some(posted),
        deadline: Some(deadline),
        reference_time,
        is_past: Some(is_past),
        seconds_until_deadline: Some(millis.div_euclid(1000)),
        status: if is_past {
            DeadlineStatus::Past
        } else {
            DeadlineStatus::Active
        },
        deadline_margin_seconds: margin_seconds,
        error: None,
    }
}

/// Point in time `seconds_before` ahead of a deadline
pub fn time_before_deadline(deadline: NaiveDateTime, seconds_before: u32) -> NaiveDateTime {
    deadline - Duration::seconds(i64::from(seconds_before))
}

/// Render a signed seconds-until-deadline count
///
/// ```
/// use keiba::core::deadline::format_time_status;
///
/// assert_eq!(format_time_status(300), "5m 0s before deadline");
/// assert_eq!(format_time_status(-7200), "2h after deadline");
/// ```
pub fn format_time_status(seconds_until: i64) -> String {
    if seconds_until < 0 {
        let secs = seconds_until.unsigned_abs();
        if secs < 60 {
            format!("{}s after deadline", secs)
        } else if secs < 3600 {
            format!("{}m after deadline", secs / 60)
        } else {
            format!("{}h after deadline", secs / 3600)
        }
    } else if seconds_until < 60 {
        format!("{}s before deadline", seconds_until)
    } else if seconds_until < 3600 {
        format!(
            "{}m {}s before deadline",
            seconds_until / 60,
            seconds_until % 60
        )
    } else {
        format!(
            "{}h {}m before deadline",
            seconds_until / 3600,
            (seconds_until % 3600) / 60
        )
    }
}
