//! Raw record feeds
//!
//! A feed hands out `(tag, bytes)` records exactly as the acquisition layer
//! delivered them; decoding happens elsewhere. `DumpFileFeed` serves a
//! newline-separated dump of raw JV-Data records.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::race_record;
use crate::data::record::RecordTag;
use crate::models::RaceId;

/// Feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("feed is closed")]
    Closed,
}

/// One raw record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub tag: String,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    /// Build from a raw line; the tag is its first two bytes
    pub fn from_line(line: &[u8]) -> Option<Self> {
        let tag = std::str::from_utf8(line.get(..2)?).ok()?;
        if !tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self {
            tag: tag.to_string(),
            bytes: line.to_vec(),
        })
    }

    pub fn is_odds(&self) -> bool {
        RecordTag::from_tag(&self.tag).is_some()
    }

    pub fn is_race(&self) -> bool {
        race_record::is_race_tag(&self.tag)
    }

    /// Race key, wherever this record type carries it
    pub fn race_key(&self) -> Option<&str> {
        let range = match self.tag.as_str() {
            "O1" | "O2" | "O3" | "O4" | "O5" | "O6" => 3..19,
            _ => 11..27,
        };
        std::str::from_utf8(self.bytes.get(range)?).ok()
    }

    pub fn as_pair(&self) -> (&str, &[u8]) {
        (&self.tag, &self.bytes)
    }
}

/// Source of raw records
pub trait RecordFeed: Send + Sync {
    /// Odds and time-series records for one race
    fn odds_records(&self, race_id: &RaceId) -> Result<Vec<RawRecord>, FeedError>;

    /// Every record (race, odds, time series) for a YYYYMMDD date
    fn race_records(&self, date: &str) -> Result<Vec<RawRecord>, FeedError>;

    fn is_connected(&self) -> bool {
        true
    }

    fn close(&self) {}
}

/// Feed backed by a record dump file loaded into memory
pub struct DumpFileFeed {
    path: PathBuf,
    records: Vec<RawRecord>,
    closed: AtomicBool,
}

impl DumpFileFeed {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read(&path).map_err(|source| FeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut feed = Self::from_bytes(&content);
        info!(
            "Loaded {} raw records from {}",
            feed.records.len(),
            path.display()
        );
        feed.path = path;
        Ok(feed)
    }

    pub fn from_bytes(content: &[u8]) -> Self {
        let records = content
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter_map(RawRecord::from_line)
            .collect();
        Self {
            path: PathBuf::new(),
            records,
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    fn ensure_open(&self) -> Result<(), FeedError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FeedError::Closed);
        }
        Ok(())
    }
}

impl RecordFeed for DumpFileFeed {
    fn odds_records(&self, race_id: &RaceId) -> Result<Vec<RawRecord>, FeedError> {
        self.ensure_open()?;
        let records: Vec<RawRecord> = self
            .records
            .iter()
            .filter(|r| r.is_odds() && r.race_key() == Some(race_id.as_str()))
            .cloned()
            .collect();
        debug!("Feed returned {} odds records for {}", records.len(), race_id);
        Ok(records)
    }

    fn race_records(&self, date: &str) -> Result<Vec<RawRecord>, FeedError> {
        self.ensure_open()?;
        Ok(self
            .records
            .iter()
            .filter(|r| r.race_key().map_or(false, |key| key.starts_with(date)))
            .cloned()
            .collect())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Raw record builders shared by tests
#[cfg(test)]
pub(crate) mod testing {
    use encoding_rs::SHIFT_JIS;

    fn pad(mut buf: Vec<u8>, len: usize) -> Vec<u8> {
        if buf.len() < len {
            buf.resize(len, b' ');
        }
        buf
    }

    fn win_entries(win: &[(u8, u32)]) -> String {
        win.iter()
            .map(|(horse, odds)| format!("{:02}{:05}", horse, odds))
            .collect()
    }

    /// O1 record with win odds (scaled by 10)
    pub fn o1(race_id: &str, time: &str, win: &[(u8, u32)]) -> Vec<u8> {
        format!("O11{}{}{}", race_id, time, win_entries(win)).into_bytes()
    }

    /// JG record with posted time, observation time and win odds
    pub fn jg(race_id: &str, posted: &str, observed: &str, win: &[(u8, u32)]) -> Vec<u8> {
        let line = format!(
            "JG1{}{}{}{}{}",
            &race_id[..8],
            race_id,
            posted,
            observed,
            win_entries(win)
        );
        pad(line.into_bytes(), 50)
    }

    /// RA record carrying a Shift_JIS race name
    pub fn ra(race_id: &str, name: &str) -> Vec<u8> {
        let mut buf = pad(format!("RA7{}{}", &race_id[..8], race_id).into_bytes(), 112);
        let (encoded, _, _) = SHIFT_JIS.encode(name);
        buf.extend_from_slice(&encoded);
        pad(buf, 182)
    }

    /// Newline-separated dump
    pub fn dump(lines: &[Vec<u8>]) -> Vec<u8> {
        lines.join(&b'\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dump() -> Vec<u8> {
        let lines = [
            "O112025110205041101143015  01  035".to_string(),
            "O112025110205041102143015  01  050".to_string(),
            "RA720251101202511020504110100000000000000000000".to_string(),
            "JG1202511012025110205041101154015301201  035".to_string(),
            "O112025110305041101143015  01  020".to_string(),
            String::new(),
            "\u{1}\u{2}junk".to_string(),
        ];
        lines.join("\r\n").into_bytes()
    }

    #[test]
    fn test_from_bytes_skips_blank_and_junk_lines() {
        let feed = DumpFileFeed::from_bytes(&dump());
        assert_eq!(feed.records().len(), 5);
        assert!(feed.records().iter().all(|r| !r.bytes.ends_with(b"\r")));
    }

    #[test]
    fn test_race_key_positions() {
        let feed = DumpFileFeed::from_bytes(&dump());
        let keys: Vec<_> = feed.records().iter().map(|r| r.race_key()).collect();
        assert_eq!(keys[0], Some("2025110205041101"));
        assert_eq!(keys[2], Some("2025110205041101"));
        assert_eq!(keys[3], Some("2025110205041101"));
    }

    #[test]
    fn test_odds_records_for_race() {
        let feed = DumpFileFeed::from_bytes(&dump());
        let race = RaceId::parse("2025110205041101").unwrap();
        let records = feed.odds_records(&race).unwrap();
        let tags: Vec<_> = records.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["O1", "JG"]);
    }

    #[test]
    fn test_race_records_for_date() {
        let feed = DumpFileFeed::from_bytes(&dump());
        assert_eq!(feed.race_records("20251102").unwrap().len(), 4);
        assert_eq!(feed.race_records("20251103").unwrap().len(), 1);
    }

    #[test]
    fn test_closed_feed() {
        let feed = DumpFileFeed::from_bytes(&dump());
        feed.close();
        assert!(!feed.is_connected());
        assert!(matches!(feed.race_records("20251102"), Err(FeedError::Closed)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = DumpFileFeed::open(dir.path().join("missing.dat"));
        assert!(matches!(result, Err(FeedError::Io { .. })));
    }

    #[test]
    fn test_open_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.dat");
        fs::write(&path, dump()).unwrap();
        let feed = DumpFileFeed::open(&path).unwrap();
        assert_eq!(feed.path(), path.as_path());
        assert_eq!(feed.records().len(), 5);
    }
}
