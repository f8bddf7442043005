//! Keiba - horse racing odds service
//!
//! This library provides:
//! - Decoding of fixed-width JV-Data odds records (O1-O6, JG)
//! - Race deadline tracking and odds replay before the deadline
//! - A date-partitioned JSON odds cache
//! - Interchangeable historical, realtime and mock odds providers
//!
//! # Example
//!
//! ```no_run
//! use keiba::config::Config;
//! use keiba::core::SourceHint;
//! use keiba::service::DataService;
//!
//! let service = DataService::from_config(&Config::default()).unwrap();
//! let odds = service
//!     .get_realtime_odds("2025110205041111", Some(300), SourceHint::Auto)
//!     .unwrap();
//! println!("{} records, {:?}", odds.odds.len(), odds.time_status);
//! ```

pub mod config;
pub mod core;
pub mod data;
pub mod feed;
pub mod models;
pub mod providers;
pub mod service;

// API-specific modules (only available with api feature)
#[cfg(feature = "api")]
pub mod error;

// Re-export commonly used types
pub use data::{decode, OddsCache, OddsRecord};
pub use models::{RaceId, RaceInfo, RaceSummary};
pub use service::{DataService, OddsResponse, ServiceError};
