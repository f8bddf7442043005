//! Record types, wire decoding and the odds cache

pub mod cache;
pub mod parser;
pub mod race_record;
pub mod record;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheError, CachedOdds, OddsCache};
pub use parser::{decode, decode_batch, DecodeError};
pub use record::{OddsPayload, OddsRecord, RecordTag};
