//! Mock odds for development
//!
//! Races come from a JSON fixture `{races, race_schedules}`. When no fixture
//! exists one is generated from probability-weighted synthetic odds. Each
//! fetch jitters the stored odds so repeated calls look live.

use chrono::{Local, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::info;

use super::{OddsProvider, OddsSnapshot, ProviderError};
use crate::core::resolver::SourceKind;
use crate::data::cache::write_json_atomic;
use crate::data::record::{
    round_odds, OddsField, OddsPayload, OddsRecord, PairOdds, PlaceOdds, WinOdds, WinPlaceOdds,
};
use crate::models::{venue_name, RaceDetail, RaceId, RaceInfo, RaceSummary};

/// Default takeout for synthetic odds
pub const DEFAULT_MARGIN: f64 = 0.2;

/// Jitter applied on each fetch
const WIN_PLACE_JITTER: f64 = 0.05;
const COMBINATION_JITTER: f64 = 0.10;

/// Strength ratio between consecutive horses in a generated field
const STRENGTH_DECAY: f64 = 0.75;

/// Synthetic odds generator
///
/// Win probabilities come from relative strengths; combination
/// probabilities follow the Harville model:
/// P(1st=i, 2nd=j) = P(i) × P(j) / (1 − P(i))
pub struct SyntheticOddsGenerator {
    /// Takeout rate
    margin: f64,
    /// Win probability per horse (index 0 = horse 1)
    win_probs: Vec<f64>,
}

impl SyntheticOddsGenerator {
    /// Field of `field_size` horses with geometrically decreasing strength
    pub fn new(field_size: usize, margin: f64) -> Self {
        let strengths: Vec<f64> = (0..field_size)
            .map(|i| STRENGTH_DECAY.powi(i as i32))
            .collect();
        Self::from_strengths(&strengths, margin)
    }

    pub fn from_strengths(strengths: &[f64], margin: f64) -> Self {
        let total: f64 = strengths.iter().sum();
        let win_probs = strengths
            .iter()
            .map(|s| if total > 0.0 { s / total } else { 0.0 })
            .collect();
        Self { margin, win_probs }
    }

    pub fn field_size(&self) -> usize {
        self.win_probs.len()
    }

    fn prob(&self, horse: u8) -> f64 {
        horse
            .checked_sub(1)
            .and_then(|i| self.win_probs.get(i as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Odds = (1 − margin) / p, rounded to 0.1 and never below 1.0
    fn odds_for(&self, prob: f64) -> f64 {
        if prob <= 0.0 {
            return 0.0;
        }
        round_odds(((1.0 - self.margin) / prob).max(1.0))
    }

    fn horses(&self) -> impl Iterator<Item = u8> {
        1..=self.win_probs.len() as u8
    }

    /// Get win odds for a horse
    pub fn win_odds(&self, horse: u8) -> f64 {
        self.odds_for(self.prob(horse))
    }

    /// Probability of an exact first/second finish
    pub fn exacta_prob(&self, first: u8, second: u8) -> f64 {
        let p_first = self.prob(first);
        if first == second || p_first >= 1.0 {
            return 0.0;
        }
        p_first * self.prob(second) / (1.0 - p_first)
    }

    pub fn win_place(&self) -> WinPlaceOdds {
        let win = self
            .horses()
            .map(|horse| WinOdds {
                horse,
                odds: self.win_odds(horse),
            })
            .collect();
        // Place pays on a top-three finish; approximate with a scaled win chance
        let place = self
            .horses()
            .map(|horse| {
                let p = self.prob(horse);
                PlaceOdds {
                    horse,
                    odds_min: self.odds_for((p * 3.0).min(0.95)),
                    odds_max: self.odds_for((p * 2.0).min(0.95)),
                }
            })
            .collect();
        WinPlaceOdds { win, place }
    }

    pub fn quinella(&self) -> Vec<PairOdds> {
        let mut combinations = Vec::new();
        for first in self.horses() {
            for second in self.horses().filter(|s| *s > first) {
                let p = self.exacta_prob(first, second) + self.exacta_prob(second, first);
                combinations.push(PairOdds {
                    first,
                    second,
                    odds: self.odds_for(p),
                });
            }
        }
        combinations
    }

    pub fn exacta(&self) -> Vec<PairOdds> {
        let mut combinations = Vec::new();
        for first in self.horses() {
            for second in self.horses().filter(|s| *s != first) {
                combinations.push(PairOdds {
                    first,
                    second,
                    odds: self.odds_for(self.exacta_prob(first, second)),
                });
            }
        }
        combinations
    }

    /// Win/place, quinella and exacta records for a race
    pub fn records(&self, race_id: &RaceId, record_time: &str) -> Vec<OddsRecord> {
        [
            OddsPayload::WinPlace(self.win_place()),
            OddsPayload::Quinella {
                combinations: self.quinella(),
            },
            OddsPayload::Exacta {
                combinations: self.exacta(),
            },
        ]
        .into_iter()
        .map(|payload| OddsRecord {
            data_kind: "1".to_string(),
            record_time: record_time.to_string(),
            ..OddsRecord::new(race_id.as_str(), payload)
        })
        .collect()
    }
}

/// One fixture race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRace {
    pub race_name: String,
    pub venue: String,
    pub race_number: u8,
    /// HH:MM
    pub posted_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_type: Option<String>,
    #[serde(default)]
    pub odds: Vec<OddsRecord>,
}

impl MockRace {
    pub fn race_info(&self) -> RaceInfo {
        RaceInfo {
            race_name: Some(self.race_name.clone()),
            posted_time: Some(self.posted_time.clone()),
            venue: Some(self.venue.clone()),
            race_number: Some(self.race_number),
            distance: self.distance,
            track_type: self.track_type.clone(),
        }
    }
}

/// Fixture file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockFixture {
    #[serde(default)]
    pub races: BTreeMap<String, MockRace>,
    /// Date (YYYYMMDD) to race ids
    #[serde(default)]
    pub race_schedules: BTreeMap<String, Vec<String>>,
}

impl MockFixture {
    /// A synthetic card of `race_count` races at Tokyo on `date`
    pub fn generate<R: Rng + ?Sized>(date: NaiveDate, race_count: u8, rng: &mut R) -> Self {
        const FIELD_SIZE: usize = 12;
        const DISTANCES: [u32; 6] = [1200, 1400, 1600, 1800, 2000, 2400];

        // First post 10:05, then every 30 minutes
        const FIRST_POST_MINUTES: u32 = 10 * 60 + 5;

        let date_key = date.format("%Y%m%d").to_string();
        let mut fixture = Self::default();

        for race_no in 1..=race_count {
            let Ok(race_id) = RaceId::from_parts(&date_key, 5, 4, 1, race_no) else {
                continue;
            };

            let mut strengths: Vec<f64> = (0..FIELD_SIZE)
                .map(|i| STRENGTH_DECAY.powi(i as i32))
                .collect();
            strengths.shuffle(rng);
            let generator = SyntheticOddsGenerator::from_strengths(&strengths, DEFAULT_MARGIN);

            let posted = FIRST_POST_MINUTES + 30 * u32::from(race_no - 1);
            let race = MockRace {
                race_name: if race_no == 11 {
                    "メインレース".to_string()
                } else {
                    format!("{}R 一般", race_no)
                },
                venue: venue_name(race_id.venue_code()).to_string(),
                race_number: race_no,
                posted_time: format!("{:02}:{:02}", posted / 60, posted % 60),
                distance: Some(DISTANCES[usize::from(race_no) % DISTANCES.len()]),
                track_type: Some(if race_no % 2 == 0 { "芝" } else { "ダート" }.to_string()),
                odds: generator.records(&race_id, "090000"),
            };
            fixture.add_race(&race_id, race);
        }

        fixture
    }

    /// Insert or replace a race and list it under its date
    pub fn add_race(&mut self, race_id: &RaceId, race: MockRace) {
        let schedule = self
            .race_schedules
            .entry(race_id.date_key().to_string())
            .or_default();
        if !schedule.iter().any(|id| id == race_id.as_str()) {
            schedule.push(race_id.to_string());
        }
        self.races.insert(race_id.to_string(), race);
    }
}

/// Provider over a mock fixture
pub struct MockProvider {
    path: PathBuf,
    fixture: RwLock<MockFixture>,
    rng: Mutex<StdRng>,
}

impl MockProvider {
    /// Load the fixture at `path`, generating a card for `today` if absent
    pub fn load<P: AsRef<Path>>(
        path: P,
        today: NaiveDate,
        seed: Option<u64>,
    ) -> Result<Self, ProviderError> {
        let path = path.as_ref().to_path_buf();
        let mut rng = seeded(seed);

        let fixture = if path.exists() {
            let content = fs::read(&path).map_err(|e| fixture_error(&path, e))?;
            let fixture: MockFixture =
                serde_json::from_slice(&content).map_err(|e| fixture_error(&path, e))?;
            info!(
                "Loaded mock fixture with {} races from {}",
                fixture.races.len(),
                path.display()
            );
            fixture
        } else {
            info!(
                "No mock fixture at {}, generating races for {}",
                path.display(),
                today
            );
            MockFixture::generate(today, 12, &mut rng)
        };

        Ok(Self {
            path,
            fixture: RwLock::new(fixture),
            rng: Mutex::new(rng),
        })
    }

    pub fn from_fixture<P: AsRef<Path>>(path: P, fixture: MockFixture, seed: Option<u64>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fixture: RwLock::new(fixture),
            rng: Mutex::new(seeded(seed)),
        }
    }

    pub fn add_race(&self, race_id: &RaceId, race: MockRace) {
        self.fixture
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_race(race_id, race);
    }

    /// Persist the fixture back to its file
    pub fn save(&self) -> Result<(), ProviderError> {
        let fixture = self.fixture.read().unwrap_or_else(PoisonError::into_inner);
        write_json_atomic(&self.path, &*fixture).map_err(|e| fixture_error(&self.path, e))?;
        info!("Saved mock fixture to {}", self.path.display());
        Ok(())
    }

    /// Dates with scheduled races
    pub fn dates(&self) -> Vec<String> {
        self.fixture
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .race_schedules
            .keys()
            .cloned()
            .collect()
    }

    fn race(&self, race_id: &RaceId) -> Option<MockRace> {
        self.fixture
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .races
            .get(race_id.as_str())
            .cloned()
    }

    fn jitter(&self, records: &mut [OddsRecord]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Local::now().format("%H%M%S").to_string();
        for record in records {
            record.payload.visit_odds_mut(|field, odds| {
                let spread = match field {
                    OddsField::Win | OddsField::Place => WIN_PLACE_JITTER,
                    OddsField::Combination => COMBINATION_JITTER,
                };
                *odds = round_odds(*odds * rng.gen_range((1.0 - spread)..=(1.0 + spread)));
            });
            record.record_time = now.clone();
        }
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn fixture_error(path: &Path, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Fixture {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl OddsProvider for MockProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Mock
    }

    fn list_races(&self, date: &str) -> Result<Vec<RaceSummary>, ProviderError> {
        let fixture = self.fixture.read().unwrap_or_else(PoisonError::into_inner);
        let Some(race_ids) = fixture.race_schedules.get(date) else {
            return Ok(Vec::new());
        };
        Ok(race_ids
            .iter()
            .filter_map(|id| {
                fixture.races.get(id).map(|race| RaceSummary {
                    race_id: id.clone(),
                    info: race.race_info(),
                })
            })
            .collect())
    }

    fn race_detail(&self, race_id: &RaceId) -> Result<Option<RaceDetail>, ProviderError> {
        Ok(self.race(race_id).map(|race| RaceDetail {
            race_id: race_id.to_string(),
            race_info: race.race_info(),
            odds_count: race.odds.len(),
            cached_at: None,
            data_source: SourceKind::Mock,
        }))
    }

    fn fetch_odds(&self, race_id: &RaceId) -> Result<OddsSnapshot, ProviderError> {
        let race = self
            .race(race_id)
            .ok_or_else(|| ProviderError::RaceNotFound(race_id.to_string()))?;
        let race_info = race.race_info();
        let mut odds = race.odds;
        self.jitter(&mut odds);
        Ok(OddsSnapshot {
            race_info,
            odds,
            ..Default::default()
        })
    }
}
