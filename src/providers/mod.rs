//! Interchangeable odds providers
//!
//! - `historical`: archived odds from the on-disk cache
//! - `realtime`: decodes raw records from a live feed
//! - `mock`: fixture or synthetic odds for development

pub mod historical;
pub mod mock;
pub mod realtime;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::resolver::SourceKind;
use crate::data::cache::CacheError;
use crate::data::record::OddsRecord;
use crate::feed::FeedError;
use crate::models::{RaceDetail, RaceId, RaceInfo, RaceSummary};

pub use historical::{HistoricalProvider, ImportSummary, RecordImport};
pub use mock::{MockFixture, MockProvider, MockRace, SyntheticOddsGenerator};
pub use realtime::RealtimeProvider;

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no odds available for race {0}")]
    RaceNotFound(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("invalid fixture {path}: {reason}")]
    Fixture { path: String, reason: String },
}

/// Odds for one race as a provider returns them
#[derive(Debug, Clone, Default)]
pub struct OddsSnapshot {
    pub race_info: RaceInfo,
    /// Latest known odds
    pub odds: Vec<OddsRecord>,
    /// Recorded observations, oldest first; empty when none were captured
    pub timeline: Vec<OddsRecord>,
    pub cached_at: Option<DateTime<Utc>>,
}

impl OddsSnapshot {
    /// Posted time from race info, falling back to the timeline
    pub fn posted_time(&self) -> Option<String> {
        self.race_info.posted_time.clone().or_else(|| {
            self.timeline
                .iter()
                .chain(&self.odds)
                .find_map(|r| r.posted_time().map(str::to_string))
        })
    }
}

/// Query interface every data source implements
pub trait OddsProvider: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn is_available(&self) -> bool {
        true
    }

    /// Races for a YYYYMMDD date; an unknown date is an empty list
    fn list_races(&self, date: &str) -> Result<Vec<RaceSummary>, ProviderError>;

    /// `Ok(None)` when the provider does not know the race
    fn race_detail(&self, race_id: &RaceId) -> Result<Option<RaceDetail>, ProviderError>;

    fn fetch_odds(&self, race_id: &RaceId) -> Result<OddsSnapshot, ProviderError>;

    fn close(&self) {}
}
