//! Validated topic identifiers.
//!
//! A [`Topic`] names a text corpus and maps deterministically to a file
//! name (`<topic>.txt`). Construction is the validation step: a `Topic`
//! value is always safe to join onto a storage base path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 128;

/// File extension appended to a topic to form its corpus file name.
pub const CORPUS_EXTENSION: &str = "txt";

/// Reasons a caller-supplied topic is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Topic is missing or only whitespace.
    #[error("topic must not be empty")]
    Empty,

    /// Topic exceeds [`MAX_TOPIC_LEN`].
    #[error("topic is {len} bytes, maximum is {MAX_TOPIC_LEN}")]
    TooLong { len: usize },

    /// Topic contains a path separator or a control character.
    #[error("topic contains invalid character {ch:?}")]
    InvalidCharacter { ch: char },

    /// Topic could escape the storage base directory.
    #[error("topic '{topic}' is not a plain name")]
    PathTraversal { topic: String },
}

/// Opaque, validated topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Validate `raw` and build a topic from it.
    ///
    /// Surrounding whitespace is trimmed first.
    ///
    /// # Errors
    ///
    /// Returns a [`TopicError`] describing the first problem found.
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TopicError::Empty);
        }
        if trimmed.len() > MAX_TOPIC_LEN {
            return Err(TopicError::TooLong { len: trimmed.len() });
        }
        if let Some(ch) = trimmed
            .chars()
            .find(|c| matches!(c, '/' | '\\') || c.is_control())
        {
            return Err(TopicError::InvalidCharacter { ch });
        }
        if trimmed.starts_with('.') || trimmed.contains("..") {
            return Err(TopicError::PathTraversal {
                topic: trimmed.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the corpus for this topic, e.g. `widgets.txt`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{CORPUS_EXTENSION}", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.0
    }
}
