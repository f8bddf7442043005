//! Persistent odds cache
//!
//! ```text
//! cache_root/
//!   cache_index.json
//!   20251102/
//!     2025110205041101.json
//! ```
//!
//! The index maps race ids to `{cached_at, file_path, odds_count |
//! timeline_count, data_type?}` and backs date listings without scanning
//! directories. Every file is replaced atomically (temp file + rename).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::record::OddsRecord;
use crate::models::{is_date_key, RaceId, RaceInfo};

pub const INDEX_FILE: &str = "cache_index.json";

const TIME_SERIES: &str = "time_series";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Cached odds: a single snapshot or an observation timeline, never both
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOdds {
    Snapshot(Vec<OddsRecord>),
    TimeSeries(Vec<OddsRecord>),
}

impl CachedOdds {
    pub fn records(&self) -> &[OddsRecord] {
        match self {
            CachedOdds::Snapshot(records) | CachedOdds::TimeSeries(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<OddsRecord> {
        match self {
            CachedOdds::Snapshot(records) | CachedOdds::TimeSeries(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn is_time_series(&self) -> bool {
        matches!(self, CachedOdds::TimeSeries(_))
    }
}

/// One cached race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CacheFile", into = "CacheFile")]
pub struct CacheEntry {
    pub race_id: String,
    pub cached_at: DateTime<Utc>,
    pub race_info: RaceInfo,
    pub metadata: Metadata,
    pub odds: CachedOdds,
}

/// On-disk shape of a cache entry
#[derive(Serialize, Deserialize)]
struct CacheFile {
    race_id: String,
    cached_at: DateTime<Utc>,
    #[serde(default)]
    race_info: RaceInfo,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    odds: Option<Vec<OddsRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    odds_timeline: Option<Vec<OddsRecord>>,
}

impl TryFrom<CacheFile> for CacheEntry {
    type Error = String;

    fn try_from(file: CacheFile) -> Result<Self, Self::Error> {
        let odds = match (file.data_type.as_deref(), file.odds, file.odds_timeline) {
            (None, Some(odds), None) => CachedOdds::Snapshot(odds),
            (None | Some(TIME_SERIES), None, Some(timeline)) => CachedOdds::TimeSeries(timeline),
            (Some(other), _, _) if other != TIME_SERIES => {
                return Err(format!("unknown data_type {:?}", other));
            }
            _ => return Err("exactly one of odds/odds_timeline must be present".to_string()),
        };
        Ok(CacheEntry {
            race_id: file.race_id,
            cached_at: file.cached_at,
            race_info: file.race_info,
            metadata: file.metadata,
            odds,
        })
    }
}

impl From<CacheEntry> for CacheFile {
    fn from(entry: CacheEntry) -> Self {
        let (data_type, odds, odds_timeline) = match entry.odds {
            CachedOdds::Snapshot(odds) => (None, Some(odds), None),
            CachedOdds::TimeSeries(timeline) => {
                (Some(TIME_SERIES.to_string()), None, Some(timeline))
            }
        };
        CacheFile {
            race_id: entry.race_id,
            cached_at: entry.cached_at,
            race_info: entry.race_info,
            metadata: entry.metadata,
            data_type,
            odds,
            odds_timeline,
        }
    }
}

/// Index row for one cached race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub cached_at: DateTime<Utc>,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl IndexEntry {
    fn for_entry(entry: &CacheEntry, path: &Path) -> Self {
        let (odds_count, timeline_count, data_type) = match &entry.odds {
            CachedOdds::Snapshot(odds) => (Some(odds.len()), None, None),
            CachedOdds::TimeSeries(timeline) => {
                (None, Some(timeline.len()), Some(TIME_SERIES.to_string()))
            }
        };
        Self {
            cached_at: entry.cached_at,
            file_path: path.to_string_lossy().into_owned(),
            odds_count,
            timeline_count,
            data_type,
        }
    }

    /// Number of cached records, whichever shape
    pub fn record_count(&self) -> usize {
        self.odds_count.or(self.timeline_count).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_races: usize,
    pub total_dates: usize,
    pub location: String,
    pub index_file: String,
}

/// Date-partitioned JSON odds cache
pub struct OddsCache {
    root: PathBuf,
    index_path: PathBuf,
    index: Mutex<BTreeMap<String, IndexEntry>>,
}

impl OddsCache {
    /// Open (or create) a cache rooted at `root`
    ///
    /// A missing or unreadable index is rebuilt from the date directories.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let index_path = root.join(INDEX_FILE);

        let cache = Self {
            root,
            index_path,
            index: Mutex::new(BTreeMap::new()),
        };

        match cache.read_index() {
            Ok(Some(index)) => *cache.lock_index() = index,
            Ok(None) => {
                let count = cache.rebuild_index()?;
                if count > 0 {
                    info!("Rebuilt missing cache index with {} races", count);
                }
            }
            Err(e) => {
                warn!("Cache index unreadable ({}), rebuilding", e);
                cache.rebuild_index()?;
            }
        }

        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_index(&self) -> MutexGuard<'_, BTreeMap<String, IndexEntry>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_index(&self) -> Result<Option<BTreeMap<String, IndexEntry>>, CacheError> {
        let content = match fs::read(&self.index_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    fn write_index(&self, index: &BTreeMap<String, IndexEntry>) -> Result<(), CacheError> {
        write_json_atomic(&self.index_path, index)
    }

    /// Apply `edit` to a copy of the index, persist it, then swap it in
    ///
    /// The in-memory index only changes once the file write succeeded.
    fn update_index<F>(
        &self,
        index: &mut BTreeMap<String, IndexEntry>,
        edit: F,
    ) -> Result<(), CacheError>
    where
        F: FnOnce(&mut BTreeMap<String, IndexEntry>),
    {
        let mut updated = index.clone();
        edit(&mut updated);
        self.write_index(&updated)?;
        *index = updated;
        Ok(())
    }

    /// Path of a race's data file
    pub fn entry_path(&self, race_id: &RaceId) -> PathBuf {
        self.root
            .join(race_id.date_key())
            .join(format!("{}.json", race_id))
    }

    /// Write an entry, replacing any previous one for the race
    pub fn save(
        &self,
        race_id: &RaceId,
        odds: CachedOdds,
        race_info: Option<RaceInfo>,
        metadata: Option<Metadata>,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            race_id: race_id.to_string(),
            cached_at: Utc::now(),
            race_info: race_info.unwrap_or_default(),
            metadata: metadata.unwrap_or_default(),
            odds,
        };
        self.store(&entry)?;
        Ok(entry)
    }

    /// Write a fully built entry (keeps its `cached_at`)
    pub fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let race_id = RaceId::parse(&entry.race_id).map_err(|e| CacheError::Corrupt {
            path: entry.race_id.clone(),
            reason: e.to_string(),
        })?;
        let path = self.entry_path(&race_id);

        let mut index = self.lock_index();
        write_json_atomic(&path, entry)?;
        let row = IndexEntry::for_entry(entry, &path);
        self.update_index(&mut index, |updated| {
            updated.insert(entry.race_id.clone(), row);
        })?;

        info!(
            "Cached {} {} records for race {}",
            entry.odds.len(),
            if entry.odds.is_time_series() {
                "timeline"
            } else {
                "odds"
            },
            race_id
        );
        Ok(())
    }

    /// Save a snapshot of odds records
    pub fn save_odds(
        &self,
        race_id: &RaceId,
        odds: Vec<OddsRecord>,
        race_info: Option<RaceInfo>,
    ) -> Result<CacheEntry, CacheError> {
        self.save(race_id, CachedOdds::Snapshot(odds), race_info, None)
    }

    /// Save an observation timeline
    pub fn save_timeline(
        &self,
        race_id: &RaceId,
        timeline: Vec<OddsRecord>,
        race_info: Option<RaceInfo>,
    ) -> Result<CacheEntry, CacheError> {
        self.save(race_id, CachedOdds::TimeSeries(timeline), race_info, None)
    }

    /// Load a cached race; `Ok(None)` on a miss
    pub fn load(&self, race_id: &RaceId) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(race_id);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Cache miss for race {}", race_id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                path: path.to_string_lossy().into_owned(),
                reason: e.to_string(),
            })
    }

    pub fn has(&self, race_id: &RaceId) -> bool {
        self.entry_path(race_id).exists()
    }

    /// Remove a race; returns whether anything was removed
    pub fn delete(&self, race_id: &RaceId) -> Result<bool, CacheError> {
        let path = self.entry_path(race_id);
        let mut index = self.lock_index();

        let indexed = index.contains_key(race_id.as_str());
        if indexed {
            self.update_index(&mut index, |updated| {
                updated.remove(race_id.as_str());
            })?;
        }
        let removed = remove_if_exists(&path)?;
        if removed {
            remove_dir_if_empty(path.parent());
        }

        if indexed || removed {
            info!("Deleted cached race {}", race_id);
        }
        Ok(indexed || removed)
    }

    /// Race ids cached for a date (YYYYMMDD), or all races when `None`
    pub fn list_by_date(&self, date: Option<&str>) -> Vec<String> {
        let index = self.lock_index();
        index
            .keys()
            .filter(|race_id| date.map_or(true, |d| race_id.starts_with(d)))
            .cloned()
            .collect()
    }

    /// Index row for a race
    pub fn index_entry(&self, race_id: &RaceId) -> Option<IndexEntry> {
        self.lock_index().get(race_id.as_str()).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.lock_index();
        let dates: BTreeSet<&str> = index
            .keys()
            .filter_map(|race_id| race_id.get(..8))
            .collect();
        CacheStats {
            total_races: index.len(),
            total_dates: dates.len(),
            location: self.root.to_string_lossy().into_owned(),
            index_file: self.index_path.to_string_lossy().into_owned(),
        }
    }

    /// Remove entries cached more than `days` ago
    ///
    /// A cutoff before the earliest representable time evicts nothing.
    pub fn evict_older_than(&self, days: u32) -> Result<usize, CacheError> {
        let cutoff = Duration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.evict_before(cutoff),
            None => Ok(0),
        }
    }

    /// Remove entries cached before `cutoff`
    ///
    /// The index is persisted before data files are removed, so the index
    /// never points at a missing file.
    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut index = self.lock_index();
        let stale: Vec<(String, IndexEntry)> = index
            .iter()
            .filter(|(_, entry)| entry.cached_at < cutoff)
            .map(|(race_id, entry)| (race_id.clone(), entry.clone()))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        self.update_index(&mut index, |updated| {
            for (race_id, _) in &stale {
                updated.remove(race_id);
            }
        })?;

        for (race_id, entry) in &stale {
            let path = PathBuf::from(&entry.file_path);
            if let Err(e) = remove_if_exists(&path) {
                warn!("Failed to remove cache file for {}: {}", race_id, e);
                continue;
            }
            remove_dir_if_empty(path.parent());
        }

        info!("Evicted {} cached races older than {}", stale.len(), cutoff);
        Ok(stale.len())
    }

    /// Rebuild the index by scanning date directories
    pub fn rebuild_index(&self) -> Result<usize, CacheError> {
        let mut rebuilt = BTreeMap::new();

        for dir in fs::read_dir(&self.root)? {
            let dir = dir?;
            let name = dir.file_name().to_string_lossy().into_owned();
            if !dir.file_type()?.is_dir() || !is_date_key(&name) {
                continue;
            }
            for file in fs::read_dir(dir.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let entry: CacheEntry = match fs::read(&path)
                    .map_err(CacheError::from)
                    .and_then(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from))
                {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable cache file {}: {}", path.display(), e);
                        continue;
                    }
                };
                rebuilt.insert(entry.race_id.clone(), IndexEntry::for_entry(&entry, &path));
            }
        }

        let mut index = self.lock_index();
        *index = rebuilt;
        self.write_index(&index)?;
        Ok(index.len())
    }
}

/// Serialize to a sibling temp file, sync, then rename over the target
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        match fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) if path.exists() => {
                // Platforms without atomic replace
                fs::remove_file(path)?;
                fs::rename(&tmp, path)
            }
            Err(e) => Err(e),
        }
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(CacheError::from)
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn remove_dir_if_empty(dir: Option<&Path>) {
    if let Some(dir) = dir {
        // Fails harmlessly when other races remain
        let _ = fs::remove_dir(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::{OddsPayload, TimeSeriesOdds, WinOdds, WinPlaceOdds};
    use tempfile::TempDir;

    fn race(id: &str) -> RaceId {
        RaceId::parse(id).unwrap()
    }

    fn win_record(race_id: &str, odds: f64) -> OddsRecord {
        OddsRecord::new(
            race_id,
            OddsPayload::WinPlace(WinPlaceOdds {
                win: vec![WinOdds { horse: 1, odds }],
                place: vec![],
            }),
        )
    }

    fn named(name: &str) -> Option<RaceInfo> {
        Some(RaceInfo {
            race_name: Some(name.to_string()),
            posted_time: Some("15:40".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let id = race("2025110205041111");

        let records = vec![win_record(id.as_str(), 2.5), win_record(id.as_str(), 3.1)];
        cache.save_odds(&id, records, named("天皇賞")).unwrap();

        let entry = cache.load(&id).unwrap().unwrap();
        assert_eq!(entry.race_id, id.as_str());
        assert_eq!(entry.odds.len(), 2);
        assert_eq!(entry.race_info.race_name.as_deref(), Some("天皇賞"));
        assert!(cache.has(&id));
        assert!(dir.path().join("20251102").join("2025110205041111.json").exists());

        let index_entry = cache.index_entry(&id).unwrap();
        assert_eq!(index_entry.odds_count, Some(2));
        assert_eq!(index_entry.timeline_count, None);
    }

    #[test]
    fn test_file_schema() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let id = race("2025110205041111");
        let observation = OddsRecord::new(
            id.as_str(),
            OddsPayload::TimeSeries(TimeSeriesOdds {
                posted_time: Some("15:40".to_string()),
                observed_at: Some("15:30:00".to_string()),
                odds: WinPlaceOdds::default(),
            }),
        );
        cache.save_timeline(&id, vec![observation], None).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(cache.entry_path(&id)).unwrap()).unwrap();
        assert_eq!(raw["data_type"], "time_series");
        assert!(raw.get("odds").is_none());
        assert_eq!(raw["odds_timeline"].as_array().unwrap().len(), 1);

        let index: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(index[id.as_str()]["timeline_count"], 1);
        assert_eq!(index[id.as_str()]["data_type"], "time_series");
    }

    #[test]
    fn test_entry_requires_exactly_one_odds_shape() {
        let both = serde_json::json!({
            "race_id": "2025110205041111",
            "cached_at": "2025-11-02T00:00:00Z",
            "odds": [],
            "odds_timeline": [],
        });
        assert!(serde_json::from_value::<CacheEntry>(both).is_err());

        let neither = serde_json::json!({
            "race_id": "2025110205041111",
            "cached_at": "2025-11-02T00:00:00Z",
        });
        assert!(serde_json::from_value::<CacheEntry>(neither).is_err());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let id = race("2025110205041111");

        cache.save_odds(&id, vec![win_record(id.as_str(), 2.5)], None).unwrap();
        cache.save_odds(&id, vec![win_record(id.as_str(), 4.0)], named("再保存")).unwrap();

        let entry = cache.load(&id).unwrap().unwrap();
        assert_eq!(entry.odds.records()[0], win_record(id.as_str(), 4.0));
        assert_eq!(cache.list_by_date(None).len(), 1);
        assert!(!dir.path().join("20251102").join("2025110205041111.json.tmp").exists());
    }

    #[test]
    fn test_load_miss() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        assert!(cache.load(&race("2025110205041111")).unwrap().is_none());
        assert!(!cache.has(&race("2025110205041111")));
    }

    #[test]
    fn test_list_by_date() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let ids = [
            "2025110205041101",
            "2025110205041102",
            "2025110208041101",
            "2025110305041101",
        ];
        for id in ids {
            cache.save_odds(&race(id), vec![], None).unwrap();
        }

        let races = cache.list_by_date(Some("20251102"));
        assert_eq!(
            races,
            vec!["2025110205041101", "2025110205041102", "2025110208041101"]
        );
        assert_eq!(cache.list_by_date(None).len(), 4);
        assert!(cache.list_by_date(Some("20240101")).is_empty());

        let stats = cache.stats();
        assert_eq!(stats.total_races, 4);
        assert_eq!(stats.total_dates, 2);
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let id = race("2025110205041111");
        cache.save_odds(&id, vec![], None).unwrap();

        assert!(cache.delete(&id).unwrap());
        assert!(!cache.has(&id));
        assert!(cache.list_by_date(None).is_empty());
        assert!(!cache.delete(&id).unwrap());
    }

    #[test]
    fn test_evict_before_updates_index_and_files() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let old = race("2024010105010101");
        let fresh = race("2025110205041111");

        let mut entry = cache.save_odds(&old, vec![], None).unwrap();
        entry.cached_at = Utc::now() - Duration::days(400);
        cache.store(&entry).unwrap();
        cache.save_odds(&fresh, vec![], None).unwrap();

        assert_eq!(cache.evict_older_than(365).unwrap(), 1);
        assert!(!cache.has(&old));
        assert!(cache.has(&fresh));
        assert_eq!(cache.list_by_date(None), vec![fresh.to_string()]);

        let reopened = OddsCache::open(dir.path()).unwrap();
        assert_eq!(reopened.list_by_date(None), vec![fresh.to_string()]);
    }

    #[test]
    fn test_evict_with_extreme_ages_keeps_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let fresh = race("2025110205041111");
        cache.save_odds(&fresh, vec![], None).unwrap();

        assert_eq!(cache.evict_older_than(u32::MAX).unwrap(), 0);
        assert_eq!(cache.evict_older_than(36_500).unwrap(), 0);
        assert!(cache.has(&fresh));
        assert_eq!(cache.list_by_date(None), vec![fresh.to_string()]);
    }

    #[test]
    fn test_failed_index_write_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let kept = race("2025110205041101");
        cache.save_odds(&kept, vec![], None).unwrap();

        // A directory in place of the index file makes every index write fail
        fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();
        fs::create_dir(dir.path().join(INDEX_FILE)).unwrap();

        let added = race("2025110205041102");
        assert!(cache.save_odds(&added, vec![], None).is_err());
        assert!(cache.delete(&kept).is_err());
        assert_eq!(cache.list_by_date(None), vec![kept.to_string()]);
        assert!(cache.index_entry(&added).is_none());
    }

    #[test]
    fn test_rebuild_index_after_corruption() {
        let dir = TempDir::new().unwrap();
        {
            let cache = OddsCache::open(dir.path()).unwrap();
            cache.save_odds(&race("2025110205041101"), vec![], None).unwrap();
            cache.save_odds(&race("2025110205041102"), vec![], None).unwrap();
        }
        fs::write(dir.path().join(INDEX_FILE), b"{not json").unwrap();
        fs::write(dir.path().join("20251102").join("garbage.json"), b"[]").unwrap();

        let cache = OddsCache::open(dir.path()).unwrap();
        assert_eq!(cache.list_by_date(Some("20251102")).len(), 2);
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cache = OddsCache::open(dir.path()).unwrap();
        let id = race("2025110205041111");
        let path = cache.entry_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{\"race_id\": 1").unwrap();

        assert!(matches!(cache.load(&id), Err(CacheError::Corrupt { .. })));
    }
}
