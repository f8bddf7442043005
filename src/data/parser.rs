//! Fixed-width JV-Data odds record decoder
//!
//! Odds records (O1-O6) share a 25-byte prefix:
//!
//! | bytes   | field       |
//! |---------|-------------|
//! | 0..2    | record tag  |
//! | 2..3    | data kind   |
//! | 3..19   | race key    |
//! | 19..25  | odds time (HHMMSS) |
//!
//! Time-series (JG) records use an extended header with the race key at
//! 11..27, posted time at 27..31 and observation time at 31..37.
//!
//! Odds values are integers scaled by 10. Entries with blank fields are
//! absent on the wire (unsold combinations); entries whose fields are
//! present but unparseable are skipped and counted in `decode_issue`.
//!
//! # Example
//!
//! ```
//! use keiba::data::parser::decode;
//!
//! let err = decode("X9", b"X9 garbage").unwrap_err();
//! assert_eq!(err.tag(), "X9");
//! ```

use encoding_rs::SHIFT_JIS;
use std::collections::BTreeMap;
use thiserror::Error;

use super::record::{
    trio_key, DecodeIssue, OddsPayload, OddsRecord, PairOdds, PlaceOdds, RangeOdds, RecordTag,
    TimeSeriesOdds, TrioOdds, WinOdds, WinPlaceOdds,
};

/// Bytes of raw input kept in error previews
pub const PREVIEW_LEN: usize = 100;

const HEADER_LEN: usize = 25;
const MAX_HORSES: usize = 18;

// O1
const WIN_ENTRY_LEN: usize = 7;
const PLACE_ENTRY_LEN: usize = 14;

// O2
const BRACKET_ENTRY_LEN: usize = 9;
const MAX_BRACKET_COMBINATIONS: usize = 36;

// O3 / O5
const PAIR_ENTRY_LEN: usize = 13;
const MAX_QUINELLA_COMBINATIONS: usize = 153;
const MAX_EXACTA_COMBINATIONS: usize = 306;

// O4
const WIDE_ENTRY_LEN: usize = 17;

// O6
const TRIO_HEADER_LEN: usize = 40;
const TRIO_ENTRY_LEN: usize = 17;

// JG
const JG_MIN_LEN: usize = 50;
const JG_BODY_START: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported record tag {tag:?}")]
    UnknownTag { tag: String, preview: String },

    #[error("{tag} record too short: {len} bytes, need at least {min}")]
    TooShort {
        tag: String,
        len: usize,
        min: usize,
        preview: String,
    },
}

impl DecodeError {
    pub fn tag(&self) -> &str {
        match self {
            DecodeError::UnknownTag { tag, .. } | DecodeError::TooShort { tag, .. } => tag,
        }
    }

    /// First bytes of the offending input, decoded as Shift_JIS
    pub fn preview(&self) -> &str {
        match self {
            DecodeError::UnknownTag { preview, .. } | DecodeError::TooShort { preview, .. } => {
                preview
            }
        }
    }
}

/// Minimum record length accepted for a tag
pub fn min_len(tag: RecordTag) -> usize {
    match tag {
        RecordTag::Trio => TRIO_HEADER_LEN,
        RecordTag::TimeSeries => JG_MIN_LEN,
        _ => HEADER_LEN,
    }
}

/// Decode one raw record
pub fn decode(tag: &str, raw: &[u8]) -> Result<OddsRecord, DecodeError> {
    let record_tag = RecordTag::from_tag(tag).ok_or_else(|| DecodeError::UnknownTag {
        tag: tag.to_string(),
        preview: preview(raw),
    })?;

    let min = min_len(record_tag);
    if raw.len() < min {
        return Err(DecodeError::TooShort {
            tag: tag.to_string(),
            len: raw.len(),
            min,
            preview: preview(raw),
        });
    }

    let mut scan = EntryScan::default();
    let payload = match record_tag {
        RecordTag::WinPlace => OddsPayload::WinPlace(scan.win_place(raw, HEADER_LEN)),
        RecordTag::BracketQuinella => OddsPayload::BracketQuinella {
            combinations: scan.brackets(raw),
        },
        RecordTag::Quinella => OddsPayload::Quinella {
            combinations: scan.pairs(raw, MAX_QUINELLA_COMBINATIONS),
        },
        RecordTag::Wide => OddsPayload::Wide {
            combinations: scan.wide(raw),
        },
        RecordTag::Exacta => OddsPayload::Exacta {
            combinations: scan.pairs(raw, MAX_EXACTA_COMBINATIONS),
        },
        RecordTag::Trio => OddsPayload::Trio(scan.trio(raw)),
        RecordTag::TimeSeries => OddsPayload::TimeSeries(TimeSeriesOdds {
            posted_time: format_hhmm(&ascii(raw, 27, 4)),
            observed_at: format_hhmmss(&ascii(raw, 31, 6)),
            odds: scan.win_place(raw, JG_BODY_START),
        }),
    };

    let (race_id, record_time) = match record_tag {
        RecordTag::TimeSeries => (ascii(raw, 11, 16), ascii(raw, 31, 6)),
        _ => (ascii(raw, 3, 16), ascii(raw, 19, 6)),
    };

    let decode_issue = (scan.skipped > 0).then(|| DecodeIssue {
        skipped_entries: scan.skipped,
        raw_preview: preview(raw),
    });

    Ok(OddsRecord {
        race_id,
        data_kind: ascii(raw, 2, 1),
        record_time,
        payload,
        decode_issue,
        simulation: None,
    })
}

/// Result of decoding a batch of raw records
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub records: Vec<OddsRecord>,
    pub errors: Vec<DecodeError>,
}

/// Decode a batch; failing records are collected, never fatal
pub fn decode_batch<'a, I>(raw_records: I) -> DecodedBatch
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut batch = DecodedBatch::default();
    for (tag, raw) in raw_records {
        match decode(tag, raw) {
            Ok(record) => batch.records.push(record),
            Err(e) => batch.errors.push(e),
        }
    }
    batch
}

/// Shift_JIS preview of the first bytes of a buffer
pub fn preview(raw: &[u8]) -> String {
    let end = raw.len().min(PREVIEW_LEN);
    let (text, _, _) = SHIFT_JIS.decode(&raw[..end]);
    text.into_owned()
}

/// Format "HHMM" as "HH:MM"
pub fn format_hhmm(raw: &str) -> Option<String> {
    (raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()))
        .then(|| format!("{}:{}", &raw[0..2], &raw[2..4]))
}

/// Format "HHMMSS" as "HH:MM:SS"
pub fn format_hhmmss(raw: &str) -> Option<String> {
    (raw.len() == 6 && raw.bytes().all(|b| b.is_ascii_digit()))
        .then(|| format!("{}:{}:{}", &raw[0..2], &raw[2..4], &raw[4..6]))
}

/// Trimmed ASCII header field; empty if out of range
fn ascii(raw: &[u8], start: usize, len: usize) -> String {
    raw.get(start..start + len)
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .unwrap_or_default()
}

/// Numeric fixed-width field
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Blank,
    Value(u32),
    Invalid,
}

impl Field {
    fn read(raw: &[u8], start: usize, len: usize) -> Self {
        let Some(bytes) = raw.get(start..start + len) else {
            return Field::Blank;
        };
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.trim(),
            Err(_) => return Field::Invalid,
        };
        if text.is_empty() {
            return Field::Blank;
        }
        text.parse().map(Field::Value).unwrap_or(Field::Invalid)
    }
}

/// Walks repeating entry blocks, counting entries that fail to parse
#[derive(Debug, Default)]
struct EntryScan {
    skipped: usize,
}

impl EntryScan {
    /// Resolve fields of one entry: all values, or None if blank or invalid
    fn values<const N: usize>(&mut self, fields: [Field; N]) -> Option<[u32; N]> {
        if fields.iter().any(|f| *f == Field::Blank) {
            return None;
        }
        let mut values = [0u32; N];
        for (slot, field) in values.iter_mut().zip(fields) {
            match field {
                Field::Value(v) => *slot = v,
                _ => {
                    self.skipped += 1;
                    return None;
                }
            }
        }
        Some(values)
    }

    fn number(&mut self, value: u32) -> Option<u8> {
        match u8::try_from(value) {
            Ok(n) => Some(n),
            Err(_) => {
                self.skipped += 1;
                None
            }
        }
    }

    fn win_place(&mut self, raw: &[u8], start: usize) -> WinPlaceOdds {
        let mut odds = WinPlaceOdds::default();

        for i in 0..MAX_HORSES {
            let pos = start + i * WIN_ENTRY_LEN;
            if pos + WIN_ENTRY_LEN > raw.len() {
                break;
            }
            let Some([horse, win]) =
                self.values([Field::read(raw, pos, 2), Field::read(raw, pos + 2, 5)])
            else {
                continue;
            };
            if let Some(horse) = self.number(horse) {
                odds.win.push(WinOdds {
                    horse,
                    odds: scaled(win),
                });
            }
        }

        let place_start = start + MAX_HORSES * WIN_ENTRY_LEN;
        for i in 0..MAX_HORSES {
            let pos = place_start + i * PLACE_ENTRY_LEN;
            if pos + PLACE_ENTRY_LEN > raw.len() {
                break;
            }
            let Some([horse, min, max]) = self.values([
                Field::read(raw, pos, 2),
                Field::read(raw, pos + 2, 5),
                Field::read(raw, pos + 7, 5),
            ]) else {
                continue;
            };
            if let Some(horse) = self.number(horse) {
                odds.place.push(PlaceOdds {
                    horse,
                    odds_min: scaled(min),
                    odds_max: scaled(max),
                });
            }
        }

        odds
    }

    fn brackets(&mut self, raw: &[u8]) -> Vec<PairOdds> {
        let mut combinations = Vec::new();
        for i in 0..MAX_BRACKET_COMBINATIONS {
            let pos = HEADER_LEN + i * BRACKET_ENTRY_LEN;
            if pos + BRACKET_ENTRY_LEN > raw.len() {
                break;
            }
            let Some([first, second, odds]) = self.values([
                Field::read(raw, pos, 1),
                Field::read(raw, pos + 1, 1),
                Field::read(raw, pos + 2, 5),
            ]) else {
                continue;
            };
            combinations.push(PairOdds {
                first: first as u8,
                second: second as u8,
                odds: scaled(odds),
            });
        }
        combinations
    }

    fn pairs(&mut self, raw: &[u8], max_entries: usize) -> Vec<PairOdds> {
        let mut combinations = Vec::new();
        for i in 0..max_entries {
            let pos = HEADER_LEN + i * PAIR_ENTRY_LEN;
            if pos + PAIR_ENTRY_LEN > raw.len() {
                break;
            }
            let Some([first, second, odds]) = self.values([
                Field::read(raw, pos, 2),
                Field::read(raw, pos + 2, 2),
                Field::read(raw, pos + 4, 6),
            ]) else {
                continue;
            };
            if odds == 0 {
                continue;
            }
            let (Some(first), Some(second)) = (self.number(first), self.number(second)) else {
                continue;
            };
            combinations.push(PairOdds {
                first,
                second,
                odds: scaled(odds),
            });
        }
        combinations
    }

    fn wide(&mut self, raw: &[u8]) -> Vec<RangeOdds> {
        let mut combinations = Vec::new();
        for i in 0..MAX_QUINELLA_COMBINATIONS {
            let pos = HEADER_LEN + i * WIDE_ENTRY_LEN;
            if pos + WIDE_ENTRY_LEN > raw.len() {
                break;
            }
            let Some([first, second, min, max]) = self.values([
                Field::read(raw, pos, 2),
                Field::read(raw, pos + 2, 2),
                Field::read(raw, pos + 4, 5),
                Field::read(raw, pos + 9, 5),
            ]) else {
                continue;
            };
            if min == 0 && max == 0 {
                continue;
            }
            let (Some(first), Some(second)) = (self.number(first), self.number(second)) else {
                continue;
            };
            combinations.push(RangeOdds {
                first,
                second,
                odds_min: scaled(min),
                odds_max: scaled(max),
            });
        }
        combinations
    }

    fn trio(&mut self, raw: &[u8]) -> TrioOdds {
        let mut combinations = BTreeMap::new();
        let entries = (raw.len() - TRIO_HEADER_LEN) / TRIO_ENTRY_LEN;
        for i in 0..entries {
            let pos = TRIO_HEADER_LEN + i * TRIO_ENTRY_LEN;
            let Some([a, b, c, odds]) = self.values([
                Field::read(raw, pos, 2),
                Field::read(raw, pos + 2, 2),
                Field::read(raw, pos + 4, 2),
                Field::read(raw, pos + 6, 7),
            ]) else {
                continue;
            };
            // Zero odds mark combinations not yet on sale
            if odds == 0 {
                continue;
            }
            let (Some(a), Some(b), Some(c)) = (self.number(a), self.number(b), self.number(c))
            else {
                continue;
            };
            combinations.insert(trio_key(a, b, c), scaled(odds));
        }
        TrioOdds { combinations }
    }
}

fn scaled(value: u32) -> f64 {
    value as f64 / 10.0
}
