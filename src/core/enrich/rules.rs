//! Categorization rule tables
//!
//! Categories are decided by three ordered tables consulted in turn:
//! device class, then domain, then entity-id keywords. The first table
//! with a match decides; within a table the first matching row wins.

use crate::domain::Category;

/// Recorder device classes mapped into the category taxonomy
pub const DEVICE_CLASS_RULES: &[(&str, Category)] = &[
    ("temperature", Category::Temperature),
    ("humidity", Category::Humidity),
    ("moisture", Category::Humidity),
    ("power", Category::Power),
    ("apparent_power", Category::Power),
    ("energy", Category::Energy),
    ("energy_storage", Category::Energy),
    ("aqi", Category::AirQuality),
    ("pm25", Category::AirQuality),
    ("pm10", Category::AirQuality),
    ("pm1", Category::AirQuality),
    ("carbon_dioxide", Category::AirQuality),
    ("carbon_monoxide", Category::AirQuality),
    ("volatile_organic_compounds", Category::AirQuality),
    ("volatile_organic_compounds_parts", Category::AirQuality),
    ("nitrogen_dioxide", Category::AirQuality),
    ("ozone", Category::AirQuality),
    ("motion", Category::Motion),
    ("occupancy", Category::Motion),
    ("presence", Category::Motion),
    ("door", Category::DoorWindow),
    ("window", Category::DoorWindow),
    ("garage_door", Category::DoorWindow),
    ("opening", Category::DoorWindow),
];

/// Domains that imply a category regardless of device class keywords
pub const DOMAIN_RULES: &[(&str, Category)] = &[
    ("climate", Category::Hvac),
    ("water_heater", Category::Hvac),
    ("fan", Category::Hvac),
    ("light", Category::Light),
];

/// Substrings of the entity id, checked in order
pub const KEYWORD_RULES: &[(&[&str], Category)] = &[
    (&["temperature", "temp"], Category::Temperature),
    (&["humidity"], Category::Humidity),
    (&["energy", "kwh"], Category::Energy),
    (&["power", "watt"], Category::Power),
    (
        &["co2", "pm25", "pm10", "voc", "air_quality", "aqi", "radon"],
        Category::AirQuality,
    ),
    (&["hvac", "thermostat"], Category::Hvac),
    (&["motion", "occupancy", "presence"], Category::Motion),
    (&["door", "window", "contact"], Category::DoorWindow),
    (&["light", "lamp"], Category::Light),
];

pub fn category_for_device_class(device_class: &str) -> Option<Category> {
    let device_class = device_class.trim().to_ascii_lowercase();
    DEVICE_CLASS_RULES
        .iter()
        .find(|(class, _)| *class == device_class)
        .map(|(_, category)| *category)
}

pub fn category_for_domain(domain: &str) -> Option<Category> {
    DOMAIN_RULES
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, category)| *category)
}

pub fn category_for_keywords(entity_id: &str) -> Option<Category> {
    let entity_id = entity_id.to_ascii_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| entity_id.contains(k)))
        .map(|(_, category)| *category)
}

/// Decide the category of a record
///
/// A device class outside the taxonomy does not decide anything; the
/// domain and keyword tables are consulted next.
pub fn categorize(entity_id: &str, domain: &str, device_class: Option<&str>) -> Category {
    device_class
        .and_then(category_for_device_class)
        .or_else(|| category_for_domain(domain))
        .or_else(|| category_for_keywords(entity_id))
        .unwrap_or(Category::Other)
}
