//! Property change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value carried by an [`Event`].
///
/// Serialized untagged: text as a JSON string, numbers as a JSON number and
/// structured payloads as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(f64),
    Text(String),
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl EventValue {
    /// Render the value as plain text.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Structured(map) => serde_json::Value::Object(map.clone()).to_string(),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for EventValue {
    fn from(value: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::Structured(value)
    }
}

/// A property change broadcast to every gateway.
///
/// The timestamp is assigned once by [`Event::new`] and cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    timestamp: DateTime<Utc>,
    unix_timestamp: i64,
    domain: String,
    source: String,
    description: String,
    property: String,
    value: EventValue,
}

impl Event {
    /// Create an event stamped with the current UTC time.
    pub fn new(
        domain: impl Into<String>,
        source: impl Into<String>,
        description: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<EventValue>,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            timestamp,
            unix_timestamp: timestamp.timestamp_millis(),
            domain: domain.into(),
            source: source.into(),
            description: description.into(),
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Milliseconds since the Unix epoch.
    pub fn unix_timestamp(&self) -> i64 {
        self.unix_timestamp
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Dotted property path, e.g. `Status.Level`.
    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn value(&self) -> &EventValue {
        &self.value
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.domain, self.source, self.description, self.property, self.value
        )
    }
}
