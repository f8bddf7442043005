//! Race listing records (RA, H1, H6, JG)
//!
//! These share an extended header: tag(2) + data kind(1) + creation date(8)
//! + race key(16). RA additionally carries the race name, JG the posted time.

use encoding_rs::SHIFT_JIS;
use std::collections::BTreeMap;

use super::parser::format_hhmm;
use crate::models::{venue_name, RaceId, RaceInfo, RaceSummary};

/// Tags that describe races rather than odds
pub const RACE_TAGS: [&str; 4] = ["RA", "H1", "H6", "JG"];

const MIN_LEN: usize = 30;
const RA_MIN_LEN: usize = 50;
const RACE_NAME: std::ops::Range<usize> = 112..162;

pub fn is_race_tag(tag: &str) -> bool {
    RACE_TAGS.contains(&tag)
}

/// Race key at 11..27 of the extended header
pub fn race_key(raw: &[u8]) -> Option<RaceId> {
    let bytes = raw.get(11..27)?;
    RaceId::parse(std::str::from_utf8(bytes).ok()?).ok()
}

/// Parse one race record into a listing row
pub fn parse_race_record(tag: &str, raw: &[u8]) -> Option<RaceSummary> {
    if raw.len() < MIN_LEN || !is_race_tag(tag) {
        return None;
    }
    if tag == "RA" && raw.len() < RA_MIN_LEN {
        return None;
    }

    let race_id = race_key(raw)?;
    let mut info = RaceInfo {
        venue: Some(venue_name(race_id.venue_code()).to_string()),
        race_number: Some(race_id.race_number()),
        ..Default::default()
    };

    match tag {
        "RA" => info.race_name = race_name(raw),
        "JG" => {
            info.posted_time = raw
                .get(27..31)
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(format_hhmm);
        }
        _ => {}
    }

    Some(RaceSummary {
        race_id: race_id.to_string(),
        info,
    })
}

fn race_name(raw: &[u8]) -> Option<String> {
    let bytes = raw.get(RACE_NAME)?;
    let (text, _, _) = SHIFT_JIS.decode(bytes);
    let name = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{3000}');
    (!name.is_empty()).then(|| name.to_string())
}

/// Collapse race records into one row per race, in race id order
///
/// The first record for a race wins; later records only fill missing fields.
pub fn merge_race_summaries<'a, I>(records: I) -> Vec<RaceSummary>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut races: BTreeMap<String, RaceInfo> = BTreeMap::new();
    for (tag, raw) in records {
        let Some(summary) = parse_race_record(tag, raw) else {
            continue;
        };
        races
            .entry(summary.race_id)
            .and_modify(|info| info.merge_missing(&summary.info))
            .or_insert(summary.info);
    }
    races
        .into_iter()
        .map(|(race_id, info)| RaceSummary { race_id, info })
        .collect()
}
