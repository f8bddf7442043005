//! Live odds decoded from a record feed

use std::sync::Arc;
use tracing::{debug, warn};

use super::{OddsProvider, OddsSnapshot, ProviderError};
use crate::core::resolver::SourceKind;
use crate::data::cache::OddsCache;
use crate::data::parser::decode_batch;
use crate::data::race_record::merge_race_summaries;
use crate::data::record::OddsRecord;
use crate::feed::{RawRecord, RecordFeed};
use crate::models::{RaceDetail, RaceId, RaceInfo, RaceSummary};

pub struct RealtimeProvider {
    feed: Arc<dyn RecordFeed>,
    /// Snapshots are written through to this cache when set
    save_to: Option<Arc<OddsCache>>,
}

impl RealtimeProvider {
    pub fn new(feed: Arc<dyn RecordFeed>) -> Self {
        Self {
            feed,
            save_to: None,
        }
    }

    pub fn with_write_through(mut self, cache: Arc<OddsCache>) -> Self {
        self.save_to = Some(cache);
        self
    }

    fn decode_odds(&self, race_id: &RaceId) -> Result<Vec<OddsRecord>, ProviderError> {
        let raw = self.feed.odds_records(race_id)?;
        let batch = decode_batch(
            raw.iter()
                .filter(|r| r.tag.starts_with('O'))
                .map(RawRecord::as_pair),
        );
        for e in &batch.errors {
            warn!("Dropping {} record for race {}: {}", e.tag(), race_id, e);
        }
        debug!(
            "Decoded {} odds records for race {}",
            batch.records.len(),
            race_id
        );
        Ok(batch.records)
    }

    /// Race metadata from the feed's race records, if any
    fn race_info(&self, race_id: &RaceId) -> RaceInfo {
        match self.list_races(race_id.date_key()) {
            Ok(races) => races
                .into_iter()
                .find(|r| r.race_id == race_id.as_str())
                .map(|r| r.info)
                .unwrap_or_default(),
            Err(e) => {
                warn!("No race info for {}: {}", race_id, e);
                RaceInfo::default()
            }
        }
    }
}

impl OddsProvider for RealtimeProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Realtime
    }

    fn is_available(&self) -> bool {
        self.feed.is_connected()
    }

    fn list_races(&self, date: &str) -> Result<Vec<RaceSummary>, ProviderError> {
        let records = self.feed.race_records(date)?;
        Ok(merge_race_summaries(
            records
                .iter()
                .filter(|r| r.is_race())
                .map(RawRecord::as_pair),
        ))
    }

    fn race_detail(&self, race_id: &RaceId) -> Result<Option<RaceDetail>, ProviderError> {
        let odds = self.decode_odds(race_id)?;
        if odds.is_empty() {
            return Ok(None);
        }
        Ok(Some(RaceDetail {
            race_id: race_id.to_string(),
            race_info: self.race_info(race_id),
            odds_count: odds.len(),
            cached_at: None,
            data_source: SourceKind::Realtime,
        }))
    }

    fn fetch_odds(&self, race_id: &RaceId) -> Result<OddsSnapshot, ProviderError> {
        let odds = self.decode_odds(race_id)?;
        if odds.is_empty() {
            return Err(ProviderError::RaceNotFound(race_id.to_string()));
        }

        let race_info = self.race_info(race_id);
        if let Some(cache) = &self.save_to {
            if let Err(e) = cache.save_odds(race_id, odds.clone(), Some(race_info.clone())) {
                warn!("Failed to save odds for race {}: {}", race_id, e);
            }
        }

        Ok(OddsSnapshot {
            race_info,
            odds,
            ..Default::default()
        })
    }

    fn close(&self) {
        self.feed.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{dump, jg, o1, ra};
    use crate::feed::DumpFileFeed;
    use tempfile::TempDir;

    const RACE: &str = "2025110205041111";

    fn feed() -> Arc<dyn RecordFeed> {
        Arc::new(DumpFileFeed::from_bytes(&dump(&[
            ra(RACE, "天皇賞（秋）"),
            o1(RACE, "153000", &[(1, 30), (2, 55)]),
            b"O6120251102050411111530".to_vec(),
            jg(RACE, "1540", "153000", &[(1, 30)]),
        ])))
    }

    fn race(id: &str) -> RaceId {
        RaceId::parse(id).unwrap()
    }

    #[test]
    fn test_fetch_drops_bad_records() {
        let provider = RealtimeProvider::new(feed());
        let snapshot = provider.fetch_odds(&race(RACE)).unwrap();
        assert_eq!(snapshot.odds.len(), 1);
        assert!(snapshot.timeline.is_empty());
        assert_eq!(snapshot.race_info.posted_time.as_deref(), Some("15:40"));
        assert_eq!(snapshot.race_info.race_name.as_deref(), Some("天皇賞（秋）"));
    }

    #[test]
    fn test_unknown_race() {
        let provider = RealtimeProvider::new(feed());
        assert!(matches!(
            provider.fetch_odds(&race("2025110205041101")),
            Err(ProviderError::RaceNotFound(_))
        ));
        assert!(provider.race_detail(&race("2025110205041101")).unwrap().is_none());
    }

    #[test]
    fn test_write_through() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(OddsCache::open(dir.path()).unwrap());
        let provider = RealtimeProvider::new(feed()).with_write_through(cache.clone());
        provider.fetch_odds(&race(RACE)).unwrap();
        let entry = cache.load(&race(RACE)).unwrap().unwrap();
        assert_eq!(entry.odds.len(), 1);
        assert_eq!(entry.race_info.posted_time.as_deref(), Some("15:40"));
    }

    #[test]
    fn test_list_races() {
        let provider = RealtimeProvider::new(feed());
        let races = provider.list_races("20251102").unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].info.race_name.as_deref(), Some("天皇賞（秋）"));
        assert_eq!(races[0].info.posted_time.as_deref(), Some("15:40"));
    }

    #[test]
    fn test_close_makes_unavailable() {
        let provider = RealtimeProvider::new(feed());
        assert!(provider.is_available());
        provider.close();
        assert!(!provider.is_available());
        assert!(provider.fetch_odds(&race(RACE)).is_err());
    }
}
