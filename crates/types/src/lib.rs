//! Small validated value types shared across the CDR crates.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input is not a valid `<host>_<uid>` source identifier
    #[error("invalid sourceId: {0}")]
    InvalidSourceId(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Stable identifier of a cached heading record.
///
/// A source id combines the openEHR host the record came from with the remote composition
/// uid, stripped of its `::<system>::<version>` suffix: `ethercis_0d3b0e2c-...`.
/// Host names must not contain `_`; everything after the first `_` is the uid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    host: String,
    uid: String,
}

impl SourceId {
    /// Builds a source id from a host name and a (possibly versioned) composition uid.
    pub fn new(host: &str, composition_uid: &str) -> Result<Self, TextError> {
        let uid = composition_uid.split("::").next().unwrap_or_default().trim();
        let host = host.trim();

        if host.is_empty() || host.contains('_') || uid.is_empty() {
            return Err(TextError::InvalidSourceId(format!("{host}_{composition_uid}")));
        }

        Ok(Self {
            host: host.to_owned(),
            uid: uid.to_owned(),
        })
    }

    /// Parses the `<host>_<uid>` text form.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        match input.split_once('_') {
            Some((host, uid)) if !host.is_empty() && !uid.is_empty() && !uid.contains("::") => {
                Ok(Self {
                    host: host.to_owned(),
                    uid: uid.to_owned(),
                })
            }
            _ => Err(TextError::InvalidSourceId(input.to_owned())),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.host, self.uid)
    }
}

impl FromStr for SourceId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for SourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceId::parse(&s).map_err(serde::de::Error::custom)
    }
}
