// Dashboard query targets and time range resolution
use crate::error::{DatasourceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AGGREGATOR: &str = "last";

/// Persisted form of one pipeline stage inside a target's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFunction {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

/// One row of a dashboard query configuration. Constructed by the editing
/// surface, consumed read-only by the query client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTarget {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_mul")]
    pub mul: f64,
    #[serde(default)]
    pub add: f64,
    #[serde(rename = "consolidateby", default)]
    pub consolidate_by: Option<String>,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub functions: Vec<SavedFunction>,
}

fn default_mul() -> f64 {
    1.0
}

impl QueryTarget {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            alias: None,
            mul: 1.0,
            add: 0.0,
            consolidate_by: None,
            hide: false,
            functions: Vec::new(),
        }
    }

    /// Targets without a topic, or hidden ones, are skipped entirely.
    pub fn is_active(&self) -> bool {
        !self.hide && self.topic.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn aggregator(&self) -> &str {
        self.consolidate_by.as_deref().unwrap_or(DEFAULT_AGGREGATOR)
    }

    /// Series label in the result set: alias when set, topic otherwise.
    pub fn display_name(&self) -> &str {
        self.alias
            .as_deref()
            .filter(|a| !a.is_empty())
            .or(self.topic.as_deref())
            .unwrap_or_default()
    }
}

/// Query window, resolved to integer Unix seconds with `from` rounded down
/// and `to` rounded up so the window never shrinks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn parse(from: &str, to: &str) -> Result<Self> {
        Ok(Self {
            from: parse_bound(from)?,
            to: parse_bound(to)?,
        })
    }

    pub fn as_unix_seconds(&self) -> (i64, i64) {
        let from_ms = self.from.timestamp_millis();
        let to_ms = self.to.timestamp_millis();
        let to_secs = to_ms.div_euclid(1000) + i64::from(to_ms.rem_euclid(1000) != 0);
        (from_ms.div_euclid(1000), to_secs)
    }
}

fn parse_bound(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatasourceError::InvalidRange(format!("{value}: {e}")))
}

/// Everything one `query()` call needs: the window, the downsampling hint
/// forwarded to the server, and the target rows.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub range: TimeRange,
    pub max_data_points: usize,
    pub targets: Vec<QueryTarget>,
}
