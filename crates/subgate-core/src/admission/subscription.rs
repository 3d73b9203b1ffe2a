//! Channel-subscription checks.
//!
//! [`SubscriptionChecker`] is the contract the gate depends on.
//! [`MembershipChecker`] implements it on top of a per-channel
//! [`ChannelMembership`] lookup, applying the query timeout and the
//! fail-closed policy: a channel whose status cannot be determined is
//! reported as missing.

use super::error::{GateError, PlatformQueryError};
use super::ids::{ChannelId, UserId};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Membership status reported by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    /// Channel creator
    Owner,
    /// Channel administrator
    Administrator,
    /// Regular member
    Member,
    /// Member with restrictions
    Restricted,
    /// Not in the channel
    Left,
    /// Banned from the channel
    Banned,
}

impl MemberStatus {
    /// Only owners, administrators and plain members count as joined.
    #[must_use]
    pub const fn is_joined(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator | Self::Member)
    }
}

/// Ordered, de-duplicated set of channels every user must join.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct SubscriptionRequirement {
    channels: Arc<[ChannelId]>,
}

impl SubscriptionRequirement {
    /// Build a requirement from channels in priority order.
    ///
    /// Duplicates are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if no channel is given.
    pub fn new(channels: impl IntoIterator<Item = ChannelId>) -> Result<Self, GateError> {
        let mut ordered: Vec<ChannelId> = Vec::new();
        for channel in channels {
            if !ordered.contains(&channel) {
                ordered.push(channel);
            }
        }
        if ordered.is_empty() {
            return Err(GateError::Config(
                "at least one required channel must be configured".to_string(),
            ));
        }
        Ok(Self {
            channels: ordered.into(),
        })
    }

    /// Parse a comma, semicolon or whitespace separated channel list.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if the list contains no channel.
    ///
    /// # Examples
    ///
    /// ```
    /// use subgate_core::admission::SubscriptionRequirement;
    ///
    /// let req = SubscriptionRequirement::parse("@a, @b;@a").unwrap();
    /// let names: Vec<&str> = req.channels().iter().map(|c| c.as_str()).collect();
    /// assert_eq!(names, ["@a", "@b"]);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        let channels = raw
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(ChannelId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(channels)
    }

    /// Channels in configured order.
    #[must_use]
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Number of required channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false for a constructed requirement.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// A single membership lookup against the chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelMembership: Send + Sync {
    /// Status of `user_id` in `channel`.
    async fn member_status(
        &self,
        channel: &ChannelId,
        user_id: &UserId,
    ) -> Result<MemberStatus, PlatformQueryError>;
}

/// Determines which required channels a user has not joined.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionChecker: Send + Sync {
    /// Missing channels in requirement order; empty means fully subscribed.
    async fn missing_channels(&self, user_id: &UserId)
        -> Result<Vec<ChannelId>, PlatformQueryError>;

    /// The requirement this checker enforces.
    fn requirement(&self) -> &SubscriptionRequirement;
}

/// How a [`MembershipChecker`] issues its per-channel queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// One channel after another, in requirement order
    #[default]
    Sequential,
    /// All channels at once; results are still reported in requirement order
    Concurrent,
}

/// [`SubscriptionChecker`] backed by per-channel membership lookups.
pub struct MembershipChecker<M> {
    membership: M,
    requirement: SubscriptionRequirement,
    query_timeout: Duration,
    mode: QueryMode,
}

impl<M: ChannelMembership> MembershipChecker<M> {
    /// Create a checker.
    #[must_use]
    pub const fn new(
        membership: M,
        requirement: SubscriptionRequirement,
        query_timeout: Duration,
        mode: QueryMode,
    ) -> Self {
        Self {
            membership,
            requirement,
            query_timeout,
            mode,
        }
    }

    /// Whether the user has joined `channel`. Failures and timeouts count as not joined.
    async fn is_joined(&self, channel: &ChannelId, user_id: &UserId) -> bool {
        let query = self.membership.member_status(channel, user_id);
        let result = match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(PlatformQueryError::Timeout {
                channel: channel.clone(),
                timeout_ms: u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match result {
            Ok(status) => {
                if !status.is_joined() {
                    debug!("User {user_id} has status {status:?} in {channel}");
                }
                status.is_joined()
            }
            Err(e) => {
                warn!("Subscription check for user {user_id} in {channel} failed, treating as missing: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl<M: ChannelMembership> SubscriptionChecker for MembershipChecker<M> {
    async fn missing_channels(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ChannelId>, PlatformQueryError> {
        let channels = self.requirement.channels();
        let joined: Vec<bool> = match self.mode {
            QueryMode::Sequential => {
                let mut joined = Vec::with_capacity(channels.len());
                for channel in channels {
                    joined.push(self.is_joined(channel, user_id).await);
                }
                joined
            }
            QueryMode::Concurrent => {
                join_all(channels.iter().map(|c| self.is_joined(c, user_id))).await
            }
        };

        Ok(channels
            .iter()
            .zip(joined)
            .filter(|(_, joined)| !joined)
            .map(|(channel, _)| channel.clone())
            .collect())
    }

    fn requirement(&self) -> &SubscriptionRequirement {
        &self.requirement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn requirement(raw: &str) -> Result<SubscriptionRequirement, GateError> {
        SubscriptionRequirement::parse(raw)
    }

    fn user() -> UserId {
        UserId::from(7_u64)
    }

    #[test]
    fn test_requirement_rejects_empty() {
        assert!(matches!(
            SubscriptionRequirement::parse(" , ;"),
            Err(GateError::Config(_))
        ));
        assert!(SubscriptionRequirement::new(Vec::new()).is_err());
    }

    #[test]
    fn test_requirement_keeps_order_and_dedups() -> Result<(), GateError> {
        let req = requirement("@b @a,@b;@c")?;
        let names: Vec<&str> = req.channels().iter().map(ChannelId::as_str).collect();
        assert_eq!(names, ["@b", "@a", "@c"]);
        assert_eq!(req.len(), 3);
        Ok(())
    }

    #[test]
    fn test_joined_statuses() {
        assert!(MemberStatus::Owner.is_joined());
        assert!(MemberStatus::Administrator.is_joined());
        assert!(MemberStatus::Member.is_joined());
        assert!(!MemberStatus::Restricted.is_joined());
        assert!(!MemberStatus::Left.is_joined());
        assert!(!MemberStatus::Banned.is_joined());
    }

    #[tokio::test]
    async fn test_reports_unjoined_channels_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let mut membership = MockChannelMembership::new();
        membership
            .expect_member_status()
            .with(always(), always())
            .returning(|channel, _| {
                Ok(match channel.as_str() {
                    "@a" => MemberStatus::Member,
                    "@b" => MemberStatus::Left,
                    "@c" => MemberStatus::Administrator,
                    _ => MemberStatus::Banned,
                })
            });

        let checker = MembershipChecker::new(
            membership,
            requirement("@a,@b,@c,@d")?,
            Duration::from_secs(1),
            QueryMode::Sequential,
        );
        let missing = checker.missing_channels(&user()).await?;
        assert_eq!(missing, vec![ChannelId::new("@b")?, ChannelId::new("@d")?]);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_error_fails_closed() -> Result<(), Box<dyn std::error::Error>> {
        let mut membership = MockChannelMembership::new();
        membership.expect_member_status().returning(|channel, _| {
            if channel.as_str() == "@b" {
                Err(PlatformQueryError::Api("Bad Request: chat not found".to_string()))
            } else {
                Ok(MemberStatus::Member)
            }
        });

        let checker = MembershipChecker::new(
            membership,
            requirement("@a,@b")?,
            Duration::from_secs(1),
            QueryMode::Sequential,
        );
        assert_eq!(
            checker.missing_channels(&user()).await?,
            vec![ChannelId::new("@b")?]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_each_channel_queried_once() -> Result<(), Box<dyn std::error::Error>> {
        let mut membership = MockChannelMembership::new();
        membership
            .expect_member_status()
            .times(3)
            .returning(|_, _| Ok(MemberStatus::Member));

        let checker = MembershipChecker::new(
            membership,
            requirement("@a,@b,@c")?,
            Duration::from_secs(1),
            QueryMode::Concurrent,
        );
        assert!(checker.missing_channels(&user()).await?.is_empty());
        Ok(())
    }

    struct SlowMembership {
        slow_channel: &'static str,
    }

    #[async_trait]
    impl ChannelMembership for SlowMembership {
        async fn member_status(
            &self,
            channel: &ChannelId,
            _user_id: &UserId,
        ) -> Result<MemberStatus, PlatformQueryError> {
            if channel.as_str() == self.slow_channel {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(MemberStatus::Member)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_closed_in_both_modes() -> Result<(), Box<dyn std::error::Error>> {
        for mode in [QueryMode::Sequential, QueryMode::Concurrent] {
            let checker = MembershipChecker::new(
                SlowMembership { slow_channel: "@b" },
                requirement("@a,@b,@c")?,
                Duration::from_millis(200),
                mode,
            );
            assert_eq!(
                checker.missing_channels(&user()).await?,
                vec![ChannelId::new("@b")?],
                "mode {mode:?}"
            );
        }
        Ok(())
    }
}
