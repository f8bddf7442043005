//! Odds replay
//!
//! Reconstructs what odds looked like some seconds before the deadline.
//! A recorded timeline is used when one exists (`nearest_observation`);
//! otherwise the latest snapshot is perturbed by a bounded random factor
//! that widens the further back the target lies.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;

use crate::data::record::{round_odds, OddsRecord, SimulationInfo};

/// Default variance at the deadline (10%)
pub const DEFAULT_VARIANCE_BASE: f64 = 0.1;

/// Largest accepted base; doubled it still leaves every factor positive
pub const MAX_VARIANCE_BASE: f64 = 0.45;

/// Offset at which variance reaches twice the base
const FULL_VARIANCE_HORIZON_SECS: f64 = 3600.0;

/// Stochastic odds replay
#[derive(Debug, Clone, Copy)]
pub struct ReplaySimulator {
    variance_base: f64,
}

impl Default for ReplaySimulator {
    fn default() -> Self {
        Self::new(DEFAULT_VARIANCE_BASE)
    }
}

impl ReplaySimulator {
    /// Non-finite bases fall back to the default; others are clamped to
    /// `[0, MAX_VARIANCE_BASE]`.
    pub fn new(variance_base: f64) -> Self {
        let variance_base = if variance_base.is_finite() {
            variance_base.abs().min(MAX_VARIANCE_BASE)
        } else {
            DEFAULT_VARIANCE_BASE
        };
        Self { variance_base }
    }

    pub fn variance_base(&self) -> f64 {
        self.variance_base
    }

    /// Variance for a target offset: base * (1 + min(secs / 3600, 1))
    pub fn variance(&self, seconds_before_deadline: u32) -> f64 {
        let time_factor =
            (f64::from(seconds_before_deadline) / FULL_VARIANCE_HORIZON_SECS).min(1.0);
        self.variance_base * (1.0 + time_factor)
    }

    /// Perturb one record
    ///
    /// Every odds value, including each end of a min/max range, gets an
    /// independent factor from `[1 - variance, 1 + variance]` and is rounded
    /// to one decimal. Ranges may therefore come out inverted.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        current: &OddsRecord,
        seconds_before_deadline: u32,
        rng: &mut R,
    ) -> OddsRecord {
        let variance = self.variance(seconds_before_deadline);
        let mut simulated = current.clone();

        simulated.payload.visit_odds_mut(|_, odds| {
            let factor = rng.gen_range((1.0 - variance)..=(1.0 + variance));
            *odds = round_odds(*odds * factor);
        });
        simulated.simulation = Some(SimulationInfo {
            simulated: true,
            target_seconds_before_deadline: seconds_before_deadline,
            variance_applied: variance,
        });

        simulated
    }

    pub fn simulate_all<R: Rng + ?Sized>(
        &self,
        records: &[OddsRecord],
        seconds_before_deadline: u32,
        rng: &mut R,
    ) -> Vec<OddsRecord> {
        records
            .iter()
            .map(|record| self.simulate(record, seconds_before_deadline, rng))
            .collect()
    }
}

/// Timeline records observed closest to `target`
///
/// All records sharing the winning observation time are returned, so a
/// multi-record observation stays together. Records without a parseable
/// observation time are ignored; an empty result means no usable timeline.
pub fn nearest_observation(
    timeline: &[OddsRecord],
    race_date: NaiveDate,
    target: NaiveDateTime,
) -> Vec<OddsRecord> {
    let observed = |record: &OddsRecord| -> Option<NaiveDateTime> {
        let time = NaiveTime::parse_from_str(record.observed_at()?, "%H:%M:%S").ok()?;
        Some(race_date.and_time(time))
    };

    let Some(best) = timeline
        .iter()
        .filter_map(|record| observed(record))
        .min_by_key(|at| (*at - target).num_seconds().abs())
    else {
        return Vec::new();
    };

    timeline
        .iter()
        .filter(|record| observed(*record) == Some(best))
        .cloned()
        .collect()
}

/// Latest observation in a timeline
pub fn latest_observation(timeline: &[OddsRecord]) -> Vec<OddsRecord> {
    let Some(latest) = timeline.iter().filter_map(|r| r.observed_at()).max() else {
        return timeline.to_vec();
    };
    timeline
        .iter()
        .filter(|r| r.observed_at() == Some(latest))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::{
        OddsPayload, PairOdds, PlaceOdds, TimeSeriesOdds, WinOdds, WinPlaceOdds,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn win_record(odds: f64) -> OddsRecord {
        OddsRecord::new(
            "2025110205041111",
            OddsPayload::WinPlace(WinPlaceOdds {
                win: vec![WinOdds { horse: 1, odds }],
                place: vec![PlaceOdds {
                    horse: 1,
                    odds_min: 1.5,
                    odds_max: 2.0,
                }],
            }),
        )
    }

    fn simulated_win(record: &OddsRecord) -> f64 {
        match &record.payload {
            OddsPayload::WinPlace(wp) => wp.win[0].odds,
            _ => panic!("payload variant changed"),
        }
    }

    fn observation(observed_at: &str, odds: f64) -> OddsRecord {
        OddsRecord::new(
            "2025110205041111",
            OddsPayload::TimeSeries(TimeSeriesOdds {
                posted_time: Some("15:40".to_string()),
                observed_at: Some(observed_at.to_string()),
                odds: WinPlaceOdds {
                    win: vec![WinOdds { horse: 1, odds }],
                    place: vec![],
                },
            }),
        )
    }

    #[test]
    fn test_variance_grows_with_offset() {
        let sim = ReplaySimulator::default();
        assert!((sim.variance(0) - 0.1).abs() < 1e-12);
        assert!((sim.variance(1800) - 0.15).abs() < 1e-12);
        assert!((sim.variance(3600) - 0.2).abs() < 1e-12);
        assert!((sim.variance(86_400) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_simulate_stays_in_band_at_deadline() {
        let sim = ReplaySimulator::default();
        let mut rng = StdRng::seed_from_u64(7);
        let record = win_record(2.5);
        for _ in 0..200 {
            let odds = simulated_win(&sim.simulate(&record, 0, &mut rng));
            assert!((2.25..=2.75).contains(&odds), "odds {}", odds);
        }
    }

    #[test]
    fn test_simulate_stays_in_band_an_hour_out() {
        let sim = ReplaySimulator::default();
        let mut rng = StdRng::seed_from_u64(11);
        let record = win_record(2.5);
        for _ in 0..200 {
            let odds = simulated_win(&sim.simulate(&record, 3600, &mut rng));
            assert!((2.0..=3.0).contains(&odds), "odds {}", odds);
        }
    }

    #[test]
    fn test_simulate_marks_result() {
        let sim = ReplaySimulator::default();
        let mut rng = StdRng::seed_from_u64(1);
        let out = sim.simulate(&win_record(2.5), 300, &mut rng);
        let info = out.simulation.clone().unwrap();
        assert!(info.simulated);
        assert_eq!(info.target_seconds_before_deadline, 300);
        assert!((info.variance_applied - (0.1 * (1.0 + 300.0 / 3600.0))).abs() < 1e-12);
        assert!(out.is_simulated());
    }

    #[test]
    fn test_simulate_is_reproducible_with_seed() {
        let sim = ReplaySimulator::default();
        let record = OddsRecord::new(
            "2025110205041111",
            OddsPayload::Exacta {
                combinations: vec![
                    PairOdds { first: 1, second: 2, odds: 12.3 },
                    PairOdds { first: 2, second: 1, odds: 20.5 },
                ],
            },
        );
        let a = sim.simulate(&record, 600, &mut StdRng::seed_from_u64(42));
        let b = sim.simulate(&record, 600, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_variance_is_identity() {
        let sim = ReplaySimulator::new(0.0);
        let mut rng = StdRng::seed_from_u64(3);
        let record = win_record(2.5);
        let out = sim.simulate(&record, 0, &mut rng);
        assert_eq!(out.payload, record.payload);
    }

    #[test]
    fn test_unusable_bases_are_sanitised() {
        assert_eq!(ReplaySimulator::new(f64::NAN).variance_base(), DEFAULT_VARIANCE_BASE);
        assert_eq!(ReplaySimulator::new(f64::INFINITY).variance_base(), DEFAULT_VARIANCE_BASE);
        assert_eq!(ReplaySimulator::new(1.5).variance_base(), MAX_VARIANCE_BASE);
        assert_eq!(ReplaySimulator::new(-0.2).variance_base(), 0.2);
    }

    #[test]
    fn test_widest_variance_keeps_odds_positive() {
        let sim = ReplaySimulator::new(1.5);
        let mut rng = StdRng::seed_from_u64(5);
        let record = win_record(1.1);
        for _ in 0..500 {
            let out = sim.simulate(&record, 86_400, &mut rng);
            assert!(simulated_win(&out) > 0.0);
        }
    }

    #[test]
    fn test_nearest_observation() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
        let timeline = vec![
            observation("15:00:00", 3.0),
            observation("15:30:00", 2.8),
            observation("15:30:00", 2.9),
            observation("15:38:00", 2.6),
        ];
        let target = date.and_hms_opt(15, 29, 0).unwrap();
        let nearest = nearest_observation(&timeline, date, target);
        assert_eq!(nearest.len(), 2);
        assert!(nearest.iter().all(|r| r.observed_at() == Some("15:30:00")));

        let target = date.and_hms_opt(14, 0, 0).unwrap();
        assert_eq!(
            nearest_observation(&timeline, date, target)[0].observed_at(),
            Some("15:00:00")
        );
    }

    #[test]
    fn test_nearest_observation_without_timestamps() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
        let target = date.and_hms_opt(15, 0, 0).unwrap();
        assert!(nearest_observation(&[win_record(2.5)], date, target).is_empty());
        assert!(nearest_observation(&[], date, target).is_empty());
    }

    #[test]
    fn test_latest_observation() {
        let timeline = vec![observation("15:00:00", 3.0), observation("15:38:00", 2.6)];
        let latest = latest_observation(&timeline);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].observed_at(), Some("15:38:00"));
    }
}
