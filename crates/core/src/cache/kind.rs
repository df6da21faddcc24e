use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::CacheError;

/// The concrete store that serves a cache call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Process-local expiring key-value store.
    #[default]
    #[serde(alias = "memory", alias = "webcache", alias = "in-process")]
    InProcess,
    /// Memcached cluster.
    Memcached,
    /// Redis database.
    Redis,
}

impl CacheKind {
    /// All backend kinds, in declaration order.
    pub const ALL: [CacheKind; 3] = [CacheKind::InProcess, CacheKind::Memcached, CacheKind::Redis];

    /// Stable lowercase name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::InProcess => "inprocess",
            CacheKind::Memcached => "memcached",
            CacheKind::Redis => "redis",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inprocess" | "in-process" | "memory" | "webcache" => Ok(CacheKind::InProcess),
            "memcached" => Ok(CacheKind::Memcached),
            "redis" => Ok(CacheKind::Redis),
            other => Err(CacheError::Configuration(format!(
                "unknown cache backend '{other}'"
            ))),
        }
    }
}

/// Picks the backend for a single call.
///
/// An explicit request always wins; otherwise the current default applies.
pub fn resolve(requested: Option<CacheKind>, default: CacheKind) -> CacheKind {
    requested.unwrap_or(default)
}
