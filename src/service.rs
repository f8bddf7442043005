//! Odds data service
//!
//! Composes providers, source resolution, the deadline clock and odds replay
//! behind three queries: races for a date, race detail, and odds optionally
//! shifted to some seconds before the deadline.

use chrono::{DateTime, Local, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::deadline::{
    deadline_info, format_time_status, time_before_deadline, Clock, DeadlineInfo, SystemClock,
    DEFAULT_DEADLINE_MARGIN_SECS, DEFAULT_POSTED_TIME,
};
use crate::core::replay::{nearest_observation, ReplaySimulator};
use crate::core::resolver::{ResolveError, RunMode, SourceHint, SourceKind, SourceResolver};
use crate::data::cache::{CacheError, CacheStats, OddsCache};
use crate::data::record::OddsRecord;
use crate::feed::{DumpFileFeed, FeedError, RecordFeed};
use crate::models::{is_date_key, RaceDetail, RaceId, RaceIdError, RaceInfo, RaceSummary};
use crate::providers::{
    HistoricalProvider, MockProvider, OddsProvider, OddsSnapshot, ProviderError, RealtimeProvider,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidRaceId(#[from] RaceIdError),

    #[error("invalid date {0:?}, expected YYYYMMDD")]
    InvalidDate(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// How time-shifted odds were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMethod {
    /// Nearest recorded observation
    Timeline,
    /// Perturbed from the latest snapshot
    Simulated,
}

/// Odds with deadline annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsResponse {
    pub race_id: String,
    pub data_source: SourceKind,
    pub race_info: RaceInfo,
    pub odds: Vec<OddsRecord>,
    pub deadline_info: DeadlineInfo,
    /// True when the posted time was unknown and the stand-in was used
    pub posted_time_assumed: bool,
    pub is_past_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub past_data_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_before_deadline: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub kind: SourceKind,
    pub available: bool,
}

/// Service status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub mode: RunMode,
    pub default_source: SourceHint,
    pub providers: Vec<ProviderStatus>,
    pub deadline_margin_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

pub struct DataService {
    providers: BTreeMap<SourceKind, Box<dyn OddsProvider>>,
    resolver: SourceResolver,
    clock: Box<dyn Clock>,
    simulator: ReplaySimulator,
    rng: Mutex<StdRng>,
    deadline_margin_secs: i64,
    cache: Option<Arc<OddsCache>>,
}

impl DataService {
    pub fn new(resolver: SourceResolver) -> Self {
        Self {
            providers: BTreeMap::new(),
            resolver,
            clock: Box::new(SystemClock),
            simulator: ReplaySimulator::default(),
            rng: Mutex::new(StdRng::from_entropy()),
            deadline_margin_secs: DEFAULT_DEADLINE_MARGIN_SECS,
            cache: None,
        }
    }

    /// Register a provider, replacing any of the same kind
    pub fn with_provider(mut self, provider: Box<dyn OddsProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_simulator(mut self, simulator: ReplaySimulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn with_deadline_margin(mut self, seconds: i64) -> Self {
        self.deadline_margin_secs = seconds;
        self
    }

    /// Cache reported by `status`
    pub fn with_cache(mut self, cache: Arc<OddsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the providers a configuration asks for
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let resolver = SourceResolver::new(config.run_mode(), config.default_source);
        let mut service = DataService::new(resolver)
            .with_simulator(ReplaySimulator::new(config.replay_variance))
            .with_deadline_margin(config.deadline_margin_secs);
        if let Some(seed) = config.replay_seed {
            service = service.with_seed(seed);
        }

        let feed: Option<Arc<dyn RecordFeed>> = match &config.feed_dump_file {
            Some(path) => Some(Arc::new(DumpFileFeed::open(path)?)),
            None => None,
        };

        let cache = if config.enable_historical || config.enable_data_save {
            Some(Arc::new(OddsCache::open(&config.cache_dir)?))
        } else {
            None
        };

        if let (true, Some(cache)) = (config.enable_historical, &cache) {
            let mut provider = HistoricalProvider::new(cache.clone());
            if let (true, Some(feed)) = (config.historical_auto_fetch, &feed) {
                provider = provider.with_backfill(feed.clone());
            }
            service = service.with_provider(Box::new(provider));
        }

        if let Some(feed) = &feed {
            let mut provider = RealtimeProvider::new(feed.clone());
            if let (true, Some(cache)) = (config.enable_data_save, &cache) {
                provider = provider.with_write_through(cache.clone());
            }
            service = service.with_provider(Box::new(provider));
        }

        if config.use_mock {
            let today = Local::now().date_naive();
            let provider = MockProvider::load(&config.mock_data_file, today, config.replay_seed)?;
            service = service.with_provider(Box::new(provider));
        }

        if let Some(cache) = cache {
            service = service.with_cache(cache);
        }

        info!(
            "Data service ready: mode={:?}, default_source={}, providers={:?}",
            service.resolver.mode(),
            service.resolver.default_hint(),
            service.providers.keys().collect::<Vec<_>>()
        );
        Ok(service)
    }

    /// Registered providers that are currently available
    pub fn available_sources(&self) -> Vec<SourceKind> {
        self.providers
            .values()
            .filter(|p| p.is_available())
            .map(|p| p.kind())
            .collect()
    }

    fn provider(&self, hint: SourceHint) -> Result<&dyn OddsProvider, ServiceError> {
        let kind = self.resolver.resolve(hint, &self.available_sources())?;
        let provider = self
            .providers
            .get(&kind)
            .ok_or(ResolveError::ProviderUnavailable(kind))?;
        Ok(provider.as_ref())
    }

    /// Races for a YYYYMMDD date
    pub fn get_race_info(
        &self,
        date: &str,
        hint: SourceHint,
    ) -> Result<Vec<RaceSummary>, ServiceError> {
        if !is_date_key(date) {
            return Err(ServiceError::InvalidDate(date.to_string()));
        }
        let provider = self.provider(hint)?;
        let races = provider.list_races(date)?;
        info!(
            "Listed {} races for {} from {}",
            races.len(),
            date,
            provider.kind()
        );
        Ok(races)
    }

    pub fn get_race_detail(
        &self,
        race_id: &str,
        hint: SourceHint,
    ) -> Result<Option<RaceDetail>, ServiceError> {
        let race_id = RaceId::parse(race_id)?;
        Ok(self.provider(hint)?.race_detail(&race_id)?)
    }

    /// Odds for a race, optionally as they stood `offset` seconds before the deadline
    ///
    /// With an offset a recorded timeline is searched first; only when none
    /// matches is the latest snapshot simulated.
    pub fn get_realtime_odds(
        &self,
        race_id: &str,
        offset: Option<u32>,
        hint: SourceHint,
    ) -> Result<OddsResponse, ServiceError> {
        let race_id = RaceId::parse(race_id)?;
        let provider = self.provider(hint)?;
        let source = provider.kind();
        info!("Fetching odds for race {} from {}", race_id, source);

        let snapshot = provider.fetch_odds(&race_id)?;
        let posted = snapshot.posted_time();
        let posted_time_assumed = posted.is_none();
        if posted_time_assumed {
            warn!(
                "No posted time for race {}, assuming {}",
                race_id, DEFAULT_POSTED_TIME
            );
        }
        let deadline = deadline_info(
            race_id.as_str(),
            posted.as_deref().unwrap_or(DEFAULT_POSTED_TIME),
            self.clock.now(),
            self.deadline_margin_secs,
        );

        let mut response = OddsResponse {
            race_id: race_id.to_string(),
            data_source: source,
            race_info: snapshot.race_info.clone(),
            odds: Vec::new(),
            deadline_info: deadline,
            posted_time_assumed,
            is_past_data: false,
            past_data_note: None,
            seconds_before_deadline: offset,
            time_status: None,
            replay: None,
            cached_at: snapshot.cached_at,
        };

        match offset {
            Some(seconds) => {
                let (odds, method) =
                    self.replay(&race_id, &snapshot, &response.deadline_info, seconds);
                response.odds = odds;
                response.replay = Some(method);
                response.is_past_data = true;
                response.past_data_note = Some(match method {
                    ReplayMethod::Timeline => {
                        format!("Recorded odds nearest to {}s before deadline", seconds)
                    }
                    ReplayMethod::Simulated => {
                        format!("Simulated odds for {}s before deadline", seconds)
                    }
                });
                response.time_status = Some(format_time_status(i64::from(seconds)));
            }
            None => {
                response.odds = snapshot.odds;
                let deadline_passed = response.deadline_info.is_past == Some(true);
                if deadline_passed {
                    let elapsed = response
                        .deadline_info
                        .seconds_until_deadline
                        .map(i64::unsigned_abs)
                        .unwrap_or(0);
                    response.is_past_data = true;
                    response.past_data_note =
                        Some(format!("Deadline passed {}s ago; odds are final", elapsed));
                } else if source == SourceKind::Historical {
                    response.is_past_data = true;
                    response.past_data_note = Some("Archived odds from the cache".to_string());
                }
                response.time_status = response.deadline_info.time_status();
            }
        }

        Ok(response)
    }

    fn replay(
        &self,
        race_id: &RaceId,
        snapshot: &OddsSnapshot,
        deadline: &DeadlineInfo,
        seconds: u32,
    ) -> (Vec<OddsRecord>, ReplayMethod) {
        if let (Some(deadline), Some(date)) = (deadline.deadline, race_id.date()) {
            let target = time_before_deadline(deadline, seconds);
            let recorded = nearest_observation(&snapshot.timeline, date, target);
            if !recorded.is_empty() {
                return (recorded, ReplayMethod::Timeline);
            }
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let odds = self
            .simulator
            .simulate_all(&snapshot.odds, seconds, &mut *rng);
        (odds, ReplayMethod::Simulated)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            mode: self.resolver.mode(),
            default_source: self.resolver.default_hint(),
            providers: self
                .providers
                .values()
                .map(|p| ProviderStatus {
                    kind: p.kind(),
                    available: p.is_available(),
                })
                .collect(),
            deadline_margin_seconds: self.deadline_margin_secs,
            cache: self.cache.as_ref().map(|c| c.stats()),
        }
    }

    /// Release provider resources
    pub fn close(&self) {
        for provider in self.providers.values() {
            provider.close();
        }
        info!("Data service closed");
    }
}
