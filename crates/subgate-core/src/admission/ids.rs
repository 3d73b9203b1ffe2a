use super::error::GateError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Opaque user identifier used as the key of every per-user map.
///
/// Comes from the chat platform and is treated as untrusted: the only
/// constraint is that it is non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(Arc<str>);

impl UserId {
    /// Validate and wrap a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidUserId`] if the identifier is empty or
    /// whitespace only.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, GateError> {
        let raw = raw.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GateError::InvalidUserId(raw.to_string()));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(Arc::from(id.to_string()))
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(Arc::from(id.to_string()))
    }
}

impl FromStr for UserId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for UserId {
    type Error = GateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel identifier, e.g. `@channel_name` or a numeric chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Validate and wrap a channel identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidChannelId`] if the identifier is empty.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, GateError> {
        let raw = raw.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GateError::InvalidChannelId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
