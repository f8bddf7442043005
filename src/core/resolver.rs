//! Data source resolution
//!
//! An explicit hint is honoured only when that provider is available.
//! `auto` walks a mode-dependent preference list:
//!
//! | mode     | order                           |
//! |----------|---------------------------------|
//! | archival | historical → mock → realtime    |
//! | live     | realtime → historical           |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Concrete provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Historical,
    Realtime,
    Mock,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Historical => "historical",
            SourceKind::Realtime => "realtime",
            SourceKind::Mock => "mock",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's source request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHint {
    #[default]
    Auto,
    Historical,
    Realtime,
    Mock,
}

impl SourceHint {
    /// Provider kind named by an explicit hint
    pub fn kind(&self) -> Option<SourceKind> {
        match self {
            SourceHint::Auto => None,
            SourceHint::Historical => Some(SourceKind::Historical),
            SourceHint::Realtime => Some(SourceKind::Realtime),
            SourceHint::Mock => Some(SourceKind::Mock),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceHint::Auto => "auto",
            SourceHint::Historical => "historical",
            SourceHint::Realtime => "realtime",
            SourceHint::Mock => "mock",
        }
    }
}

impl From<SourceKind> for SourceHint {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Historical => SourceHint::Historical,
            SourceKind::Realtime => SourceHint::Realtime,
            SourceKind::Mock => SourceHint::Mock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown data source {0:?} (expected auto, historical, realtime or mock)")]
pub struct ParseSourceHintError(pub String);

impl FromStr for SourceHint {
    type Err = ParseSourceHintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(SourceHint::Auto),
            "historical" => Ok(SourceHint::Historical),
            "realtime" => Ok(SourceHint::Realtime),
            "mock" => Ok(SourceHint::Mock),
            other => Err(ParseSourceHintError(other.to_string())),
        }
    }
}

impl fmt::Display for SourceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment mode driving `auto` resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Archival,
    Live,
}

impl RunMode {
    /// Map an ENVIRONMENT value; anything but production is archival
    pub fn from_environment(environment: &str) -> Self {
        if environment.trim().eq_ignore_ascii_case("production") {
            RunMode::Live
        } else {
            RunMode::Archival
        }
    }

    /// Provider preference for `auto`
    pub fn preference(&self) -> &'static [SourceKind] {
        match self {
            RunMode::Archival => &[SourceKind::Historical, SourceKind::Mock, SourceKind::Realtime],
            RunMode::Live => &[SourceKind::Realtime, SourceKind::Historical],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("data source '{0}' is not available")]
    ProviderUnavailable(SourceKind),

    #[error("no data source is available")]
    NoProviderAvailable,
}

/// Stateless source selection policy
#[derive(Debug, Clone, Copy)]
pub struct SourceResolver {
    mode: RunMode,
    default_hint: SourceHint,
}

impl SourceResolver {
    /// `default_hint` replaces `auto` before the mode policy applies
    pub fn new(mode: RunMode, default_hint: SourceHint) -> Self {
        Self { mode, default_hint }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn default_hint(&self) -> SourceHint {
        self.default_hint
    }

    pub fn resolve(
        &self,
        hint: SourceHint,
        available: &[SourceKind],
    ) -> Result<SourceKind, ResolveError> {
        let hint = match hint {
            SourceHint::Auto => self.default_hint,
            explicit => explicit,
        };

        match hint.kind() {
            Some(kind) if available.contains(&kind) => Ok(kind),
            Some(kind) => Err(ResolveError::ProviderUnavailable(kind)),
            None => self
                .mode
                .preference()
                .iter()
                .copied()
                .find(|kind| available.contains(kind))
                .ok_or(ResolveError::NoProviderAvailable),
        }
    }
}
