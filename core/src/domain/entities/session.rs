//! Application data attached to a session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::claims::{RESERVED_CLAIMS, SUBJECT_CLAIM};
use crate::errors::{SessionError, SessionResult};

/// Field marking a session issued to a trusted, non-expiring source
pub const TRUSTED_SOURCE_FIELD: &str = "source";

/// Application data carried by a session token
///
/// The subject identifier is typed; any other caller field is kept as an
/// arbitrary JSON value. Serialized as a flat map with the subject under
/// `uuid`, the same shape the token payload uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Authenticated principal, required when storage is configured
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Uuid>,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl SessionData {
    /// Creates empty session data
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates session data for an authenticated subject
    pub fn for_subject(subject: Uuid) -> Self {
        Self {
            subject: Some(subject),
            fields: Map::new(),
        }
    }

    pub(crate) fn from_parts(subject: Option<Uuid>, fields: Map<String, Value>) -> Self {
        Self { subject, fields }
    }

    pub(crate) fn into_parts(self) -> (Option<Uuid>, Map<String, Value>) {
        (self.subject, self.fields)
    }

    /// Adds an application field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an application field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Looks up an application field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All application fields, without the subject
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Whether the data marks a trusted source
    pub fn is_trusted_source(&self) -> bool {
        self.fields.contains_key(TRUSTED_SOURCE_FIELD)
    }

    /// Rejects application fields that collide with protocol claim names
    pub fn validate(&self) -> SessionResult<()> {
        match self.fields.keys().find(|key| RESERVED_CLAIMS.contains(&key.as_str())) {
            Some(key) => Err(SessionError::data_invalid(format!("field '{}' is reserved", key))),
            None => Ok(()),
        }
    }

    /// Flattens into a plain map, with the subject rendered under `uuid`
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = self.fields;
        if let Some(subject) = self.subject {
            map.insert(SUBJECT_CLAIM.to_string(), Value::String(subject.to_string()));
        }
        map
    }
}

impl TryFrom<Map<String, Value>> for SessionData {
    type Error = SessionError;

    /// Builds session data from a plain map, parsing `uuid` as the subject
    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let subject = match map.remove(SUBJECT_CLAIM) {
            None => None,
            Some(Value::String(raw)) => Some(
                Uuid::parse_str(&raw)
                    .map_err(|e| SessionError::data_invalid(format!("invalid subject identifier: {}", e)))?,
            ),
            Some(other) => {
                return Err(SessionError::data_invalid(format!(
                    "subject identifier must be a string, got {}",
                    other
                )))
            }
        };

        let data = Self::from_parts(subject, map);
        data.validate()?;
        Ok(data)
    }
}
