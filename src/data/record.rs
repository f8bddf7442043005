//! Typed odds records
//!
//! One `OddsRecord` is produced per decoded JV-Data odds line. The bet
//! type lives in the payload variant; `tag()` maps it back to the wire tag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Wire tag of an odds record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordTag {
    #[serde(rename = "O1")]
    WinPlace,
    #[serde(rename = "O2")]
    BracketQuinella,
    #[serde(rename = "O3")]
    Quinella,
    #[serde(rename = "O4")]
    Wide,
    #[serde(rename = "O5")]
    Exacta,
    #[serde(rename = "O6")]
    Trio,
    #[serde(rename = "JG")]
    TimeSeries,
}

impl RecordTag {
    pub const ALL: [RecordTag; 7] = [
        RecordTag::WinPlace,
        RecordTag::BracketQuinella,
        RecordTag::Quinella,
        RecordTag::Wide,
        RecordTag::Exacta,
        RecordTag::Trio,
        RecordTag::TimeSeries,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordTag::WinPlace => "O1",
            RecordTag::BracketQuinella => "O2",
            RecordTag::Quinella => "O3",
            RecordTag::Wide => "O4",
            RecordTag::Exacta => "O5",
            RecordTag::Trio => "O6",
            RecordTag::TimeSeries => "JG",
        }
    }

    /// Human readable bet type
    pub fn label(&self) -> &'static str {
        match self {
            RecordTag::WinPlace => "win/place",
            RecordTag::BracketQuinella => "bracket quinella",
            RecordTag::Quinella => "quinella",
            RecordTag::Wide => "wide",
            RecordTag::Exacta => "exacta",
            RecordTag::Trio => "trio",
            RecordTag::TimeSeries => "time series",
        }
    }

    /// Snapshot odds tags (everything except JG)
    pub fn is_snapshot(&self) -> bool {
        !matches!(self, RecordTag::TimeSeries)
    }
}

impl fmt::Display for RecordTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinOdds {
    pub horse: u8,
    pub odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOdds {
    pub horse: u8,
    pub odds_min: f64,
    pub odds_max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WinPlaceOdds {
    pub win: Vec<WinOdds>,
    pub place: Vec<PlaceOdds>,
}

impl WinPlaceOdds {
    /// Get win odds for a horse
    pub fn win_odds(&self, horse: u8) -> Option<f64> {
        self.win.iter().find(|w| w.horse == horse).map(|w| w.odds)
    }
}

/// Odds for an ordered or unordered pair (brackets or horses)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairOdds {
    pub first: u8,
    pub second: u8,
    pub odds: f64,
}

/// Wide odds carry a range like place odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeOdds {
    pub first: u8,
    pub second: u8,
    pub odds_min: f64,
    pub odds_max: f64,
}

/// Trio odds keyed "a-b-c"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrioOdds {
    pub combinations: BTreeMap<String, f64>,
}

impl TrioOdds {
    /// Get odds for a specific combination
    pub fn get(&self, a: u8, b: u8, c: u8) -> Option<f64> {
        self.combinations.get(&trio_key(a, b, c)).copied()
    }

    /// Convert to a tuple keyed map
    pub fn to_tuple_map(&self) -> BTreeMap<(u8, u8, u8), f64> {
        self.combinations
            .iter()
            .filter_map(|(key, odds)| parse_trio_key(key).map(|k| (k, *odds)))
            .collect()
    }
}

/// Build a trio key "a-b-c"
pub fn trio_key(a: u8, b: u8, c: u8) -> String {
    format!("{}-{}-{}", a, b, c)
}

/// Parse trio key "1-2-3" to (1, 2, 3)
pub fn parse_trio_key(key: &str) -> Option<(u8, u8, u8)> {
    let mut parts = key.split('-');
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    let c = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b, c))
}

/// One observation of a time-series (JG) record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesOdds {
    /// Posted start time carried by the record, HH:MM
    pub posted_time: Option<String>,
    /// Observation time, HH:MM:SS
    pub observed_at: Option<String>,
    pub odds: WinPlaceOdds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bet_type", rename_all = "snake_case")]
pub enum OddsPayload {
    WinPlace(WinPlaceOdds),
    BracketQuinella { combinations: Vec<PairOdds> },
    Quinella { combinations: Vec<PairOdds> },
    Wide { combinations: Vec<RangeOdds> },
    Exacta { combinations: Vec<PairOdds> },
    Trio(TrioOdds),
    TimeSeries(TimeSeriesOdds),
}

/// Which kind of odds value a visitor is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsField {
    Win,
    Place,
    Combination,
}

impl OddsPayload {
    pub fn tag(&self) -> RecordTag {
        match self {
            OddsPayload::WinPlace(_) => RecordTag::WinPlace,
            OddsPayload::BracketQuinella { .. } => RecordTag::BracketQuinella,
            OddsPayload::Quinella { .. } => RecordTag::Quinella,
            OddsPayload::Wide { .. } => RecordTag::Wide,
            OddsPayload::Exacta { .. } => RecordTag::Exacta,
            OddsPayload::Trio(_) => RecordTag::Trio,
            OddsPayload::TimeSeries(_) => RecordTag::TimeSeries,
        }
    }

    /// Number of priced entries
    pub fn entry_count(&self) -> usize {
        match self {
            OddsPayload::WinPlace(wp) => wp.win.len() + wp.place.len(),
            OddsPayload::BracketQuinella { combinations }
            | OddsPayload::Quinella { combinations }
            | OddsPayload::Exacta { combinations } => combinations.len(),
            OddsPayload::Wide { combinations } => combinations.len(),
            OddsPayload::Trio(trio) => trio.combinations.len(),
            OddsPayload::TimeSeries(ts) => ts.odds.win.len() + ts.odds.place.len(),
        }
    }

    /// Visit every odds value, including both ends of min/max ranges
    pub fn visit_odds_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(OddsField, &mut f64),
    {
        fn win_place<F: FnMut(OddsField, &mut f64)>(odds: &mut WinPlaceOdds, f: &mut F) {
            for w in &mut odds.win {
                f(OddsField::Win, &mut w.odds);
            }
            for p in &mut odds.place {
                f(OddsField::Place, &mut p.odds_min);
                f(OddsField::Place, &mut p.odds_max);
            }
        }

        match self {
            OddsPayload::WinPlace(wp) => win_place(wp, &mut f),
            OddsPayload::TimeSeries(ts) => win_place(&mut ts.odds, &mut f),
            OddsPayload::BracketQuinella { combinations }
            | OddsPayload::Quinella { combinations }
            | OddsPayload::Exacta { combinations } => {
                for c in combinations {
                    f(OddsField::Combination, &mut c.odds);
                }
            }
            OddsPayload::Wide { combinations } => {
                for c in combinations {
                    f(OddsField::Combination, &mut c.odds_min);
                    f(OddsField::Combination, &mut c.odds_max);
                }
            }
            OddsPayload::Trio(trio) => {
                for odds in trio.combinations.values_mut() {
                    f(OddsField::Combination, odds);
                }
            }
        }
    }
}

/// Entries that could not be decoded inside an otherwise valid record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeIssue {
    pub skipped_entries: usize,
    pub raw_preview: String,
}

/// Marks a record produced by the replay simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInfo {
    pub simulated: bool,
    pub target_seconds_before_deadline: u32,
    pub variance_applied: f64,
}

/// Decoded odds record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub race_id: String,
    /// Data kind character from the record header
    pub data_kind: String,
    /// Record timestamp as carried on the wire (HHMMSS)
    pub record_time: String,
    pub payload: OddsPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_issue: Option<DecodeIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationInfo>,
}

impl OddsRecord {
    pub fn new(race_id: impl Into<String>, payload: OddsPayload) -> Self {
        Self {
            race_id: race_id.into(),
            data_kind: String::new(),
            record_time: String::new(),
            payload,
            decode_issue: None,
            simulation: None,
        }
    }

    pub fn tag(&self) -> RecordTag {
        self.payload.tag()
    }

    pub fn is_simulated(&self) -> bool {
        self.simulation.as_ref().map(|s| s.simulated).unwrap_or(false)
    }

    /// Observation time of a time-series record
    pub fn observed_at(&self) -> Option<&str> {
        match &self.payload {
            OddsPayload::TimeSeries(ts) => ts.observed_at.as_deref(),
            _ => None,
        }
    }

    /// Posted time carried by a time-series record
    pub fn posted_time(&self) -> Option<&str> {
        match &self.payload {
            OddsPayload::TimeSeries(ts) => ts.posted_time.as_deref(),
            _ => None,
        }
    }
}

/// Round odds to one decimal place
pub fn round_odds(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
