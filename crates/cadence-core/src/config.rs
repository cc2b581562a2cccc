use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::expander::DEFAULT_HARD_CAP;
use crate::models::UpcomingQuery;

/// Engine settings, read from `cadence.toml` and `CADENCE_*` variables.
///
/// Nested keys use `__` in the environment, e.g.
/// `CADENCE_UPCOMING__MAX_COUNT=5` or `CADENCE_DATABASE__PATH=/tmp/c.db`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timezone (IANA format) for series created without one
    pub default_timezone: String,
    pub upcoming: UpcomingDefaults,
    /// Upper bound on dates produced by one expansion
    pub expansion_hard_cap: usize,
    /// Upper bound on occurrences returned by a history query
    pub history_hard_cap: usize,
    pub database: DatabaseConfig,
}

/// Defaults for the upcoming view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpcomingDefaults {
    pub max_count: usize,
    pub months_ahead: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            upcoming: UpcomingDefaults::default(),
            expansion_hard_cap: DEFAULT_HARD_CAP,
            history_hard_cap: 5000,
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for UpcomingDefaults {
    fn default() -> Self {
        let query = UpcomingQuery::default();
        Self {
            max_count: query.max_count,
            months_ahead: query.months_ahead,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cadence.db"),
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }
}

impl From<UpcomingDefaults> for UpcomingQuery {
    fn from(defaults: UpcomingDefaults) -> Self {
        UpcomingQuery {
            max_count: defaults.max_count,
            months_ahead: defaults.months_ahead,
        }
    }
}

impl EngineConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("cadence.toml"))
            .merge(Env::prefixed("CADENCE_").split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// A configuration backed by a database file at `path`, everything else default.
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig {
                path: path.into(),
                ..DatabaseConfig::default()
            },
            ..Self::default()
        }
    }
}
