//! Feature extraction
//!
//! Turns a [`RawRecord`] into an analytics-ready [`EnrichedRecord`]: numeric
//! value, category, room, category-specific value columns, and the climate
//! fields. Enrichment is pure and never fails; anything that cannot be
//! derived is left empty.
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use serde_json::json;
//! use strata::core::enrich::FeatureExtractor;
//! use strata::domain::{Category, EntityId, RawRecord};
//!
//! let raw = RawRecord::new(EntityId::new("sensor.dryer").unwrap(), "450.5", Utc::now())
//!     .with_attribute("device_class", json!("power"));
//!
//! let enriched = FeatureExtractor::new(Utc::now()).enrich(&raw);
//! assert_eq!(enriched.numeric_value, Some(450.5));
//! assert_eq!(enriched.category, Category::Power);
//! assert_eq!(enriched.power_value, Some(450.5));
//! ```

pub mod room;
pub mod rules;

use crate::domain::{Category, ClimateFields, EnrichedRecord, RawRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Attribute keys resolved into typed fields for every domain
const COMMON_KEYS: &[&str] = &[
    "friendly_name",
    "unit_of_measurement",
    "device_class",
    "labels",
    "area",
    "area_name",
    "room",
];

/// Attribute keys resolved into typed fields for climate entities
const CLIMATE_KEYS: &[&str] = &[
    "hvac_mode",
    "hvac_action",
    "temperature",
    "target_temp_high",
    "target_temp_low",
    "current_temperature",
    "current_humidity",
    "fan_mode",
    "preset_mode",
];

const CLIMATE_DOMAIN: &str = "climate";

/// Attributes the extractor understands, resolved once per record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownAttributes {
    pub friendly_name: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub device_class: Option<String>,
    pub labels: Vec<String>,
    pub room: Option<String>,
    pub climate: ClimateFields,
}

impl KnownAttributes {
    /// Split `attributes` into known fields and the residual map
    pub fn resolve(domain: &str, attributes: &Map<String, Value>) -> (Self, Map<String, Value>) {
        let is_climate = domain == CLIMATE_DOMAIN;
        let known = Self {
            friendly_name: string_attr(attributes, "friendly_name"),
            unit_of_measurement: string_attr(attributes, "unit_of_measurement"),
            device_class: string_attr(attributes, "device_class"),
            labels: labels_attr(attributes),
            room: room::room_from_attributes(attributes),
            climate: if is_climate {
                ClimateFields {
                    hvac_mode: string_attr(attributes, "hvac_mode"),
                    hvac_action: string_attr(attributes, "hvac_action"),
                    target_temperature: number_attr(attributes, "temperature"),
                    target_temp_high: number_attr(attributes, "target_temp_high"),
                    target_temp_low: number_attr(attributes, "target_temp_low"),
                    current_temperature: number_attr(attributes, "current_temperature"),
                    current_humidity: number_attr(attributes, "current_humidity"),
                    fan_mode: string_attr(attributes, "fan_mode"),
                    preset_mode: string_attr(attributes, "preset_mode"),
                }
            } else {
                ClimateFields::default()
            },
        };

        let residual = attributes
            .iter()
            .filter(|(key, _)| {
                !COMMON_KEYS.contains(&key.as_str())
                    && !(is_climate && CLIMATE_KEYS.contains(&key.as_str()))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        (known, residual)
    }
}

/// Best-effort float parse: trimmed, finite values only
///
/// ```
/// use strata::core::enrich::parse_numeric;
///
/// assert_eq!(parse_numeric(" 21.5 "), Some(21.5));
/// assert_eq!(parse_numeric("on"), None);
/// assert_eq!(parse_numeric("NaN"), None);
/// ```
pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn string_attr(attributes: &Map<String, Value>, key: &str) -> Option<String> {
    match attributes.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_attr(attributes: &Map<String, Value>, key: &str) -> Option<f64> {
    match attributes.get(key)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

fn labels_attr(attributes: &Map<String, Value>) -> Vec<String> {
    match attributes.get("labels") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Enriches records with a fixed export timestamp
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    exported_at: DateTime<Utc>,
}

impl FeatureExtractor {
    /// `exported_at` is stamped on every record of the run
    pub fn new(exported_at: DateTime<Utc>) -> Self {
        Self { exported_at }
    }

    pub fn exported_at(&self) -> DateTime<Utc> {
        self.exported_at
    }

    pub fn enrich(&self, raw: &RawRecord) -> EnrichedRecord {
        let (known, residual) = KnownAttributes::resolve(&raw.domain, &raw.attributes);
        let numeric_value = parse_numeric(&raw.value);
        let category = rules::categorize(
            raw.entity_id.as_str(),
            &raw.domain,
            known.device_class.as_deref(),
        );
        let room = known
            .room
            .clone()
            .or_else(|| room::room_from_entity_id(raw.entity_id.as_str()));

        let value_for = |wanted: Category| numeric_value.filter(|_| category == wanted);

        let climate = if raw.domain == CLIMATE_DOMAIN {
            let mut climate = known.climate.clone();
            if climate.hvac_mode.is_none() && numeric_value.is_none() && !raw.value.is_empty() {
                climate.hvac_mode = Some(raw.value.clone());
            }
            if climate.current_temperature.is_none() {
                climate.current_temperature = numeric_value;
            }
            climate
        } else {
            ClimateFields::default()
        };

        EnrichedRecord {
            entity_id: raw.entity_id.clone(),
            domain: raw.domain.clone(),
            value: raw.value.clone(),
            attributes: residual,
            changed_at: raw.changed_at,
            updated_at: raw.updated_at,
            context_id: raw.context_id.clone(),
            context_user_id: raw.context_user_id.clone(),
            friendly_name: known
                .friendly_name
                .unwrap_or_else(|| raw.entity_id.to_string()),
            unit_of_measurement: known.unit_of_measurement,
            device_class: known.device_class,
            numeric_value,
            category,
            room,
            labels: known.labels,
            temperature_value: value_for(Category::Temperature),
            humidity_value: value_for(Category::Humidity),
            power_value: value_for(Category::Power),
            energy_value: value_for(Category::Energy),
            climate,
            exported_at: self.exported_at,
        }
    }
}
