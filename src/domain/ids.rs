//! Domain identifier types with validation
//!
//! Recorder entities are addressed as `domain.object_id`, for example
//! `sensor.kitchen_temperature`. [`EntityId`] guarantees that shape once at
//! the source boundary so downstream code can split it without re-checking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity identifier newtype wrapper
///
/// # Examples
///
/// ```
/// use strata::domain::ids::EntityId;
/// use std::str::FromStr;
///
/// let id = EntityId::from_str("sensor.kitchen_temperature").unwrap();
/// assert_eq!(id.domain(), "sensor");
/// assert_eq!(id.object_id(), "kitchen_temperature");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new EntityId, rejecting empty ids and ids without a domain prefix
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Entity ID cannot be empty".to_string());
        }
        match id.split_once('.') {
            Some((domain, object_id)) if !domain.is_empty() && !object_id.is_empty() => {
                Ok(Self(id))
            }
            _ => Err(format!(
                "Invalid entity ID format: {id}. Expected format: domain.object_id"
            )),
        }
    }

    /// Returns the entity ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the domain prefix (`sensor` in `sensor.kitchen_temperature`)
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map(|(d, _)| d).unwrap_or(&self.0)
    }

    /// Returns the part after the domain prefix
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map(|(_, o)| o).unwrap_or("")
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
