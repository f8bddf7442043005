use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::resolver::SourceKind;

/// Length of a JV-Data race key
pub const RACE_ID_LEN: usize = 16;

/// Length of the date prefix used as a listing key
pub const DATE_KEY_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaceIdError {
    #[error("race id must be 16 characters, got {0}")]
    InvalidLength(usize),

    #[error("race id must contain only ASCII digits: {0:?}")]
    NonNumeric(String),
}

/// 16-character race key: YYYYMMDD + venue(2) + meeting(2) + day(2) + race(2)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RaceId(String);

impl RaceId {
    pub fn parse(value: &str) -> Result<Self, RaceIdError> {
        let value = value.trim();
        if value.len() != RACE_ID_LEN {
            return Err(RaceIdError::InvalidLength(value.chars().count()));
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RaceIdError::NonNumeric(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Build a race id from its components
    pub fn from_parts(
        date: &str,
        venue: u8,
        meeting: u8,
        day: u8,
        race_no: u8,
    ) -> Result<Self, RaceIdError> {
        Self::parse(&format!(
            "{}{:02}{:02}{:02}{:02}",
            date, venue, meeting, day, race_no
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading YYYYMMDD, used to partition the cache and list races
    pub fn date_key(&self) -> &str {
        &self.0[..DATE_KEY_LEN]
    }

    /// Calendar date, if the leading 8 digits form a valid date
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date_key(), "%Y%m%d").ok()
    }

    pub fn venue_code(&self) -> &str {
        &self.0[8..10]
    }

    pub fn meeting(&self) -> u8 {
        self.0[10..12].parse().unwrap_or(0)
    }

    pub fn day_of_meeting(&self) -> u8 {
        self.0[12..14].parse().unwrap_or(0)
    }

    pub fn race_number(&self) -> u8 {
        self.0[14..16].parse().unwrap_or(0)
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RaceId {
    type Err = RaceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RaceId {
    type Error = RaceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RaceId> for String {
    fn from(id: RaceId) -> Self {
        id.0
    }
}

/// Check a YYYYMMDD listing key
pub fn is_date_key(date: &str) -> bool {
    date.len() == DATE_KEY_LEN && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
}

/// JRA venue code to name mapping
pub fn venue_name(code: &str) -> &'static str {
    match code {
        "01" => "札幌",
        "02" => "函館",
        "03" => "福島",
        "04" => "新潟",
        "05" => "東京",
        "06" => "中山",
        "07" => "中京",
        "08" => "京都",
        "09" => "阪神",
        "10" => "小倉",
        _ => "不明",
    }
}

/// Race metadata attached to cached and provider results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_name: Option<String>,
    /// Posted start time, HH:MM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_number: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_type: Option<String>,
}

impl RaceInfo {
    /// Fill fields that are still empty from another source
    pub fn merge_missing(&mut self, other: &RaceInfo) {
        if self.race_name.is_none() {
            self.race_name = other.race_name.clone();
        }
        if self.posted_time.is_none() {
            self.posted_time = other.posted_time.clone();
        }
        if self.venue.is_none() {
            self.venue = other.venue.clone();
        }
        if self.race_number.is_none() {
            self.race_number = other.race_number;
        }
        if self.distance.is_none() {
            self.distance = other.distance;
        }
        if self.track_type.is_none() {
            self.track_type = other.track_type.clone();
        }
    }
}

/// One row of a date listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSummary {
    pub race_id: String,
    #[serde(flatten)]
    pub info: RaceInfo,
}

/// Race detail returned by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceDetail {
    pub race_id: String,
    pub race_info: RaceInfo,
    pub odds_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    pub data_source: SourceKind,
}

/// Race listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct RacesResponse {
    pub date: String,
    pub count: usize,
    pub races: Vec<RaceSummary>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub available_sources: Vec<SourceKind>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
