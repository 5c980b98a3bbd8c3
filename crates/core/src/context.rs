//! The external-data snapshot every rule in one tick is evaluated against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open mapping of name to scalar or structured value.
pub type DataGroup = Map<String, Value>;

/// Immutable snapshot of external data for one scheduler tick.
///
/// Fields are private and there are no mutators: once built, a context is
/// shared read-only (usually behind an `Arc`) by every rule evaluated in the
/// same tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
    #[serde(default)]
    weather: DataGroup,
    #[serde(default)]
    market: DataGroup,
    #[serde(default)]
    news: DataGroup,
    #[serde(default)]
    custom: DataGroup,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl NotificationContext {
    pub fn builder() -> NotificationContextBuilder {
        NotificationContextBuilder::default()
    }

    pub fn weather(&self) -> &DataGroup {
        &self.weather
    }

    pub fn market(&self) -> &DataGroup {
        &self.market
    }

    pub fn news(&self) -> &DataGroup {
        &self.news
    }

    pub fn custom(&self) -> &DataGroup {
        &self.custom
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// JSON encoding handed to compiled rule units.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Builder for [`NotificationContext`]. The timestamp defaults to now.
#[derive(Debug, Default)]
pub struct NotificationContextBuilder {
    weather: DataGroup,
    market: DataGroup,
    news: DataGroup,
    custom: DataGroup,
    timestamp: Option<DateTime<Utc>>,
}

impl NotificationContextBuilder {
    pub fn weather(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.weather.insert(key.into(), value.into());
        self
    }

    pub fn market(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.market.insert(key.into(), value.into());
        self
    }

    pub fn news(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.news.insert(key.into(), value.into());
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn build(self) -> NotificationContext {
        NotificationContext {
            weather: self.weather,
            market: self.market,
            news: self.news,
            custom: self.custom,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
