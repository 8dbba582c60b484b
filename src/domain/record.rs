//! Record models flowing through an export
//!
//! [`RawRecord`] is what the source store yields. [`EnrichedRecord`] is the
//! analytics-ready form written to the warehouse; its serialized field set
//! is both the staging artifact line format and the warehouse column set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::ids::EntityId;

/// A single state change as stored by the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub entity_id: EntityId,
    pub domain: String,
    pub value: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub changed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub context_id: Option<String>,
    pub context_user_id: Option<String>,
}

impl RawRecord {
    /// Creates a record whose domain is taken from the entity id and whose
    /// `updated_at` equals `changed_at`
    pub fn new(entity_id: EntityId, value: impl Into<String>, changed_at: DateTime<Utc>) -> Self {
        Self {
            domain: entity_id.domain().to_string(),
            entity_id,
            value: value.into(),
            attributes: Map::new(),
            changed_at,
            updated_at: changed_at,
            context_id: None,
            context_user_id: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets `updated_at`, keeping the `changed_at <= updated_at` ordering
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at.max(self.changed_at);
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>, user_id: Option<String>) -> Self {
        self.context_id = Some(context_id.into());
        self.context_user_id = user_id;
        self
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.entity_id.clone(), self.changed_at)
    }
}

/// Logical identity of a warehouse row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupKey {
    pub entity_id: EntityId,
    pub changed_at: DateTime<Utc>,
}

impl DedupKey {
    pub fn new(entity_id: EntityId, changed_at: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            changed_at,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity_id, self.changed_at.to_rfc3339())
    }
}

/// Closed category taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Temperature,
    Humidity,
    Power,
    Energy,
    AirQuality,
    Hvac,
    Motion,
    DoorWindow,
    Light,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Temperature,
        Category::Humidity,
        Category::Power,
        Category::Energy,
        Category::AirQuality,
        Category::Hvac,
        Category::Motion,
        Category::DoorWindow,
        Category::Light,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Temperature => "temperature",
            Category::Humidity => "humidity",
            Category::Power => "power",
            Category::Energy => "energy",
            Category::AirQuality => "air_quality",
            Category::Hvac => "hvac",
            Category::Motion => "motion",
            Category::DoorWindow => "door_window",
            Category::Light => "light",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown category: {s}"))
    }
}

/// Climate-only fields, populated when the record's domain is `climate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateFields {
    #[serde(default)]
    pub hvac_mode: Option<String>,
    #[serde(default)]
    pub hvac_action: Option<String>,
    #[serde(default)]
    pub target_temperature: Option<f64>,
    #[serde(default)]
    pub target_temp_high: Option<f64>,
    #[serde(default)]
    pub target_temp_low: Option<f64>,
    #[serde(default)]
    pub current_temperature: Option<f64>,
    #[serde(default)]
    pub current_humidity: Option<f64>,
    #[serde(default)]
    pub fan_mode: Option<String>,
    #[serde(default)]
    pub preset_mode: Option<String>,
}

impl ClimateFields {
    pub fn is_empty(&self) -> bool {
        self == &ClimateFields::default()
    }
}

/// A raw record plus everything derived from it
///
/// `attributes` holds only the residual attributes that were not resolved
/// into a typed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub entity_id: EntityId,
    pub domain: String,
    pub value: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub changed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub context_id: Option<String>,
    pub context_user_id: Option<String>,
    pub friendly_name: String,
    pub unit_of_measurement: Option<String>,
    pub device_class: Option<String>,
    pub numeric_value: Option<f64>,
    pub category: Category,
    pub room: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub temperature_value: Option<f64>,
    pub humidity_value: Option<f64>,
    pub power_value: Option<f64>,
    pub energy_value: Option<f64>,
    #[serde(flatten)]
    pub climate: ClimateFields,
    pub exported_at: DateTime<Utc>,
}

impl EnrichedRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.entity_id.clone(), self.changed_at)
    }
}
