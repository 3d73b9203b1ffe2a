use super::ids::ChannelId;
use thiserror::Error;

/// Hard failures surfaced to the host.
///
/// Denials (cooldown, missing subscriptions) are not errors; they are
/// [`super::AdmitResult`] variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Empty or otherwise unusable user identifier
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),
    /// Empty channel identifier
    #[error("Invalid channel id: {0:?}")]
    InvalidChannelId(String),
    /// Collaborators or settings are misconfigured
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a single membership query against the chat platform.
///
/// Always recovered by the subscription checker: the affected channel is
/// reported as missing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformQueryError {
    /// The query did not finish within the configured timeout
    #[error("Membership query for {channel} timed out after {timeout_ms}ms")]
    Timeout {
        /// Channel being queried
        channel: ChannelId,
        /// Timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },
    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),
    /// The platform rejected the query
    #[error("Platform API error: {0}")]
    Api(String),
    /// The platform answered with something we cannot interpret
    #[error("Malformed platform response: {0}")]
    Malformed(String),
}
