//! Archived odds served from the on-disk cache
//!
//! With a backfill feed attached, cache misses are fetched from the feed,
//! imported, and answered from the cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{OddsProvider, OddsSnapshot, ProviderError};
use crate::core::replay::latest_observation;
use crate::core::resolver::SourceKind;
use crate::data::cache::{CacheEntry, CacheError, CachedOdds, OddsCache};
use crate::data::parser::{decode, DecodeError};
use crate::data::race_record::merge_race_summaries;
use crate::data::record::{OddsPayload, OddsRecord};
use crate::feed::{RawRecord, RecordFeed};
use crate::models::{RaceDetail, RaceId, RaceInfo, RaceSummary};

/// Races decoded from raw records, ready to be written to the cache
#[derive(Debug, Default)]
pub struct PendingRace {
    pub race_info: RaceInfo,
    pub odds: Vec<OddsRecord>,
    pub timeline: Vec<OddsRecord>,
}

/// Outcome of writing an import to the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub saved: usize,
    /// Snapshot records not kept because their race also had a timeline
    pub dropped_snapshot_records: usize,
}

/// Raw records grouped per race
///
/// Time-series (JG) records become a timeline entry; otherwise the O1-O6
/// records become a snapshot. A cache entry holds one or the other, so a
/// race with both keeps the timeline and drops its snapshot records.
#[derive(Debug, Default)]
pub struct RecordImport {
    pub races: BTreeMap<RaceId, PendingRace>,
    pub decode_errors: Vec<DecodeError>,
}

impl RecordImport {
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut import = Self::default();

        let summaries =
            merge_race_summaries(records.iter().filter(|r| r.is_race()).map(RawRecord::as_pair));
        for summary in summaries {
            if let Ok(race_id) = RaceId::parse(&summary.race_id) {
                import.races.entry(race_id).or_default().race_info = summary.info;
            }
        }

        for raw in records.iter().filter(|r| r.is_odds()) {
            let record = match decode(&raw.tag, &raw.bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping undecodable {} record: {}", e.tag(), e);
                    import.decode_errors.push(e);
                    continue;
                }
            };
            let Ok(race_id) = RaceId::parse(&record.race_id) else {
                warn!("Skipping {} record with bad race key {:?}", raw.tag, record.race_id);
                continue;
            };
            let race = import.races.entry(race_id).or_default();
            if let OddsPayload::TimeSeries(ts) = &record.payload {
                if race.race_info.posted_time.is_none() {
                    race.race_info.posted_time = ts.posted_time.clone();
                }
                race.timeline.push(record);
            } else {
                race.odds.push(record);
            }
        }

        import
    }

    pub fn race_count(&self) -> usize {
        self.races.len()
    }

    pub fn record_count(&self) -> usize {
        self.races
            .values()
            .map(|r| r.odds.len() + r.timeline.len())
            .sum()
    }

    /// Write every race to the cache, reporting each one as it lands
    pub fn commit<F>(
        self,
        cache: &OddsCache,
        mut on_saved: F,
    ) -> Result<ImportSummary, CacheError>
    where
        F: FnMut(&RaceId),
    {
        let mut summary = ImportSummary::default();
        for (race_id, race) in self.races {
            let odds = if race.timeline.is_empty() {
                CachedOdds::Snapshot(race.odds)
            } else {
                if !race.odds.is_empty() {
                    warn!(
                        "Race {} has a timeline; dropping {} snapshot records",
                        race_id,
                        race.odds.len()
                    );
                    summary.dropped_snapshot_records += race.odds.len();
                }
                let mut timeline = race.timeline;
                timeline.sort_by(|a, b| a.record_time.cmp(&b.record_time));
                CachedOdds::TimeSeries(timeline)
            };
            cache.save(&race_id, odds, Some(race.race_info), None)?;
            on_saved(&race_id);
            summary.saved += 1;
        }
        Ok(summary)
    }
}

/// Provider over the odds cache
pub struct HistoricalProvider {
    cache: Arc<OddsCache>,
    backfill: Option<Arc<dyn RecordFeed>>,
}

impl HistoricalProvider {
    pub fn new(cache: Arc<OddsCache>) -> Self {
        Self {
            cache,
            backfill: None,
        }
    }

    /// Fill cache misses from a feed
    pub fn with_backfill(mut self, feed: Arc<dyn RecordFeed>) -> Self {
        self.backfill = Some(feed);
        self
    }

    pub fn cache(&self) -> &OddsCache {
        &self.cache
    }

    fn backfill_date(&self, date: &str) -> Result<usize, ProviderError> {
        let Some(feed) = &self.backfill else {
            return Ok(0);
        };
        info!("Cache miss for {}, backfilling from feed", date);
        let records = feed.race_records(date)?;
        let summary = RecordImport::from_records(&records).commit(&self.cache, |_| {})?;
        Ok(summary.saved)
    }

    fn backfill_race(&self, race_id: &RaceId) -> Result<Option<CacheEntry>, ProviderError> {
        let Some(feed) = &self.backfill else {
            return Ok(None);
        };
        info!("Cache miss for race {}, backfilling from feed", race_id);
        let records = feed.odds_records(race_id)?;
        if records.is_empty() {
            return Ok(None);
        }
        RecordImport::from_records(&records).commit(&self.cache, |_| {})?;
        Ok(self.cache.load(race_id)?)
    }

    fn load_or_backfill(&self, race_id: &RaceId) -> Result<Option<CacheEntry>, ProviderError> {
        match self.cache.load(race_id)? {
            Some(entry) => Ok(Some(entry)),
            None => self.backfill_race(race_id),
        }
    }
}

impl OddsProvider for HistoricalProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Historical
    }

    fn list_races(&self, date: &str) -> Result<Vec<RaceSummary>, ProviderError> {
        let mut race_ids = self.cache.list_by_date(Some(date));
        if race_ids.is_empty() && self.backfill_date(date)? > 0 {
            race_ids = self.cache.list_by_date(Some(date));
        }

        let mut races = Vec::with_capacity(race_ids.len());
        for race_id in race_ids {
            let Ok(id) = RaceId::parse(&race_id) else {
                warn!("Skipping malformed cached race id {:?}", race_id);
                continue;
            };
            match self.cache.load(&id) {
                Ok(Some(entry)) => races.push(RaceSummary {
                    race_id,
                    info: entry.race_info,
                }),
                Ok(None) => warn!("Indexed race {} has no cache file", race_id),
                Err(e) => warn!("Skipping unreadable cached race {}: {}", race_id, e),
            }
        }
        Ok(races)
    }

    fn race_detail(&self, race_id: &RaceId) -> Result<Option<RaceDetail>, ProviderError> {
        Ok(self.load_or_backfill(race_id)?.map(|entry| RaceDetail {
            race_id: entry.race_id,
            race_info: entry.race_info,
            odds_count: entry.odds.len(),
            cached_at: Some(entry.cached_at),
            data_source: SourceKind::Historical,
        }))
    }

    fn fetch_odds(&self, race_id: &RaceId) -> Result<OddsSnapshot, ProviderError> {
        let entry = self
            .load_or_backfill(race_id)?
            .ok_or_else(|| ProviderError::RaceNotFound(race_id.to_string()))?;

        let (odds, timeline) = match entry.odds {
            CachedOdds::Snapshot(odds) => (odds, Vec::new()),
            CachedOdds::TimeSeries(timeline) => (latest_observation(&timeline), timeline),
        };

        Ok(OddsSnapshot {
            race_info: entry.race_info,
            odds,
            timeline,
            cached_at: Some(entry.cached_at),
        })
    }

    fn close(&self) {
        if let Some(feed) = &self.backfill {
            feed.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{dump, jg, o1, ra};
    use crate::feed::DumpFileFeed;
    use tempfile::TempDir;

    const RACE: &str = "2025110205041111";
    const OTHER: &str = "2025110205041112";

    fn race(id: &str) -> RaceId {
        RaceId::parse(id).unwrap()
    }

    fn records() -> Vec<RawRecord> {
        DumpFileFeed::from_bytes(&dump(&[
            ra(RACE, "天皇賞（秋）"),
            jg(RACE, "1540", "153000", &[(1, 30)]),
            jg(RACE, "1540", "150000", &[(1, 35)]),
            o1(OTHER, "143000", &[(1, 25), (2, 60)]),
            b"O6 too short".to_vec(),
        ]))
        .records()
        .to_vec()
    }

    #[test]
    fn test_record_import_groups_races() {
        let import = RecordImport::from_records(&records());
        assert_eq!(import.race_count(), 2);
        assert_eq!(import.record_count(), 3);
        assert_eq!(import.decode_errors.len(), 1);

        let pending = &import.races[&race(RACE)];
        assert_eq!(pending.timeline.len(), 2);
        assert_eq!(pending.race_info.race_name.as_deref(), Some("天皇賞（秋）"));
        assert_eq!(pending.race_info.posted_time.as_deref(), Some("15:40"));
    }

    #[test]
    fn test_commit_writes_timeline_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let mut seen = Vec::new();
        let summary = RecordImport::from_records(&records())
            .commit(&cache, |id| seen.push(id.to_string()))
            .unwrap();
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.dropped_snapshot_records, 0);
        assert_eq!(seen, vec![RACE, OTHER]);

        let entry = cache.load(&race(RACE)).unwrap().unwrap();
        assert!(entry.odds.is_time_series());
        let observed: Vec<_> = entry.odds.records().iter().map(|r| r.observed_at()).collect();
        assert_eq!(observed, vec![Some("15:00:00"), Some("15:30:00")]);

        let entry = cache.load(&race(OTHER)).unwrap().unwrap();
        assert!(!entry.odds.is_time_series());
        assert_eq!(entry.odds.len(), 1);
    }

    #[test]
    fn test_mixed_race_keeps_timeline_and_counts_dropped_snapshots() {
        let records = DumpFileFeed::from_bytes(&dump(&[
            jg(RACE, "1540", "153000", &[(1, 30)]),
            o1(RACE, "153500", &[(1, 28), (2, 55)]),
            o1(OTHER, "143000", &[(1, 25)]),
        ]))
        .records()
        .to_vec();

        let import = RecordImport::from_records(&records);
        let pending = &import.races[&race(RACE)];
        assert_eq!((pending.timeline.len(), pending.odds.len()), (1, 1));

        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let summary = import.commit(&cache, |_| {}).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                saved: 2,
                dropped_snapshot_records: 1
            }
        );

        let entry = cache.load(&race(RACE)).unwrap().unwrap();
        assert!(entry.odds.is_time_series());
        assert_eq!(entry.odds.len(), 1);
        assert!(!cache.load(&race(OTHER)).unwrap().unwrap().odds.is_time_series());
    }

    #[test]
    fn test_fetch_odds_from_timeline() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(OddsCache::open(dir.path()).unwrap());
        RecordImport::from_records(&records()).commit(&cache, |_| {}).unwrap();

        let provider = HistoricalProvider::new(cache);
        let snapshot = provider.fetch_odds(&race(RACE)).unwrap();
        assert_eq!(snapshot.timeline.len(), 2);
        assert_eq!(snapshot.odds.len(), 1);
        assert_eq!(snapshot.odds[0].observed_at(), Some("15:30:00"));
        assert_eq!(snapshot.posted_time().as_deref(), Some("15:40"));
    }

    #[test]
    fn test_list_races_and_detail() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(OddsCache::open(dir.path()).unwrap());
        RecordImport::from_records(&records()).commit(&cache, |_| {}).unwrap();
        let provider = HistoricalProvider::new(cache);

        let races = provider.list_races("20251102").unwrap();
        assert_eq!(races.len(), 2);
        assert_eq!(races[0].info.race_name.as_deref(), Some("天皇賞（秋）"));
        assert!(provider.list_races("20251103").unwrap().is_empty());

        let detail = provider.race_detail(&race(OTHER)).unwrap().unwrap();
        assert_eq!(detail.odds_count, 1);
        assert_eq!(detail.data_source, SourceKind::Historical);
        assert!(provider.race_detail(&race("2025110205041101")).unwrap().is_none());
    }

    #[test]
    fn test_miss_without_backfill() {
        let dir = TempDir::new().unwrap();
        let provider = HistoricalProvider::new(Arc::new(OddsCache::open(dir.path()).unwrap()));
        assert!(matches!(
            provider.fetch_odds(&race(RACE)),
            Err(ProviderError::RaceNotFound(_))
        ));
    }

    #[test]
    fn test_backfill_on_miss() {
        let feed: Arc<dyn RecordFeed> = Arc::new(DumpFileFeed::from_bytes(&dump(&[
            ra(RACE, "天皇賞（秋）"),
            jg(RACE, "1540", "153000", &[(1, 30)]),
            o1(OTHER, "143000", &[(1, 25)]),
        ])));

        let dir = TempDir::new().unwrap();
        let cache = Arc::new(OddsCache::open(dir.path()).unwrap());
        let provider = HistoricalProvider::new(cache.clone()).with_backfill(feed.clone());
        let snapshot = provider.fetch_odds(&race(OTHER)).unwrap();
        assert_eq!(snapshot.odds.len(), 1);
        assert!(cache.has(&race(OTHER)));
        assert!(!cache.has(&race(RACE)));

        let dir = TempDir::new().unwrap();
        let cache = Arc::new(OddsCache::open(dir.path()).unwrap());
        let provider = HistoricalProvider::new(cache.clone()).with_backfill(feed);
        let races = provider.list_races("20251102").unwrap();
        assert_eq!(races.len(), 2);
        assert!(cache.has(&race(RACE)));
        assert!(cache.has(&race(OTHER)));
    }
}
