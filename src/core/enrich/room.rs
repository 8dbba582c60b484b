//! Room extraction from entity ids

use serde_json::{Map, Value};

/// Attribute keys that name the room explicitly, in priority order
pub const ROOM_ATTRIBUTES: &[&str] = &["area", "area_name", "room"];

/// Tokens that name a room on their own
pub const ROOM_KEYWORDS: &[&str] = &[
    "kitchen", "bedroom", "bathroom", "office", "garage", "basement", "attic", "hallway",
    "nursery", "den", "study", "patio", "porch", "pantry", "closet", "foyer", "laundry",
    "lounge", "loft", "cellar",
];

/// Tokens that combine with the following keyword into a two-token room
pub const ROOM_QUALIFIERS: &[&str] = &[
    "master", "guest", "living", "dining", "family", "laundry", "primary", "kids", "main",
    "upstairs", "downstairs",
];

/// Keywords that only name a room after a qualifier ("living room")
pub const QUALIFIED_ONLY_KEYWORDS: &[&str] = &["room"];

/// Explicit room from the attributes, if any is a non-empty string
pub fn room_from_attributes(attributes: &Map<String, Value>) -> Option<String> {
    ROOM_ATTRIBUTES.iter().find_map(|key| {
        attributes
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Scan the object id for a room keyword
///
/// ```
/// use strata::core::enrich::room::room_from_entity_id;
///
/// assert_eq!(
///     room_from_entity_id("sensor.airthings_master_bedroom_temperature").as_deref(),
///     Some("Master Bedroom")
/// );
/// assert_eq!(room_from_entity_id("sensor.awair_temperature"), None);
/// ```
pub fn room_from_entity_id(entity_id: &str) -> Option<String> {
    let object_id = entity_id
        .split_once('.')
        .map_or(entity_id, |(_, object)| object)
        .to_ascii_lowercase();
    let tokens: Vec<&str> = object_id
        .split(['_', '.'])
        .filter(|t| !t.is_empty())
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if ROOM_QUALIFIERS.contains(token) {
            if let Some(next) = tokens.get(i + 1) {
                let names_room =
                    ROOM_KEYWORDS.contains(next) || QUALIFIED_ONLY_KEYWORDS.contains(next);
                if names_room && next != token {
                    return Some(title_case(&[*token, *next]));
                }
            }
        }
        if ROOM_KEYWORDS.contains(token) {
            return Some(title_case(&[*token]));
        }
    }
    None
}

/// Room for a record: explicit attribute first, then the entity id
pub fn extract_room(entity_id: &str, attributes: &Map<String, Value>) -> Option<String> {
    room_from_attributes(attributes).or_else(|| room_from_entity_id(entity_id))
}

fn title_case(words: &[&str]) -> String {
    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
