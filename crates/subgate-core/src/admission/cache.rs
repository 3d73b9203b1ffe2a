//! Short-lived cache of positive subscription results.
//!
//! Only a "fully subscribed" answer is remembered, and only for the
//! configured TTL. Missing channels and failed lookups always go back to
//! the platform, so an unsubscribe is noticed at most one TTL late and a
//! fail-closed answer is never pinned.

use super::error::PlatformQueryError;
use super::ids::{ChannelId, UserId};
use super::subscription::{SubscriptionChecker, SubscriptionRequirement};
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// [`SubscriptionChecker`] decorator caching fully-subscribed users.
pub struct CachedSubscriptionChecker<C> {
    inner: C,
    subscribed: Cache<UserId, ()>,
}

impl<C: SubscriptionChecker> CachedSubscriptionChecker<C> {
    /// Wrap `inner`, caching positive results for `ttl`.
    #[must_use]
    pub fn new(inner: C, ttl: Duration, max_capacity: u64) -> Self {
        let subscribed = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, subscribed }
    }

    /// Forget the cached result for `user_id`.
    pub async fn invalidate(&self, user_id: &UserId) {
        self.subscribed.invalidate(user_id).await;
    }

    /// Number of cached users.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.subscribed.entry_count()
    }
}

#[async_trait]
impl<C: SubscriptionChecker> SubscriptionChecker for CachedSubscriptionChecker<C> {
    async fn missing_channels(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ChannelId>, PlatformQueryError> {
        if self.subscribed.get(user_id).await.is_some() {
            debug!("Subscription cache hit for user {user_id}");
            return Ok(Vec::new());
        }

        let missing = self.inner.missing_channels(user_id).await?;
        if missing.is_empty() {
            self.subscribed.insert(user_id.clone(), ()).await;
        }
        Ok(missing)
    }

    fn requirement(&self) -> &SubscriptionRequirement {
        self.inner.requirement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::subscription::MockSubscriptionChecker;
    use crate::admission::GateError;

    fn requirement() -> Result<SubscriptionRequirement, GateError> {
        SubscriptionRequirement::parse("@a,@b")
    }

    #[tokio::test]
    async fn test_positive_result_is_cached() -> Result<(), Box<dyn std::error::Error>> {
        let mut inner = MockSubscriptionChecker::new();
        inner
            .expect_missing_channels()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let checker = CachedSubscriptionChecker::new(inner, Duration::from_secs(60), 100);
        let user = UserId::from(1_u64);

        assert!(checker.missing_channels(&user).await?.is_empty());
        assert!(checker.missing_channels(&user).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_result_is_not_cached() -> Result<(), Box<dyn std::error::Error>> {
        let missing = vec![ChannelId::new("@b")?];
        let mut inner = MockSubscriptionChecker::new();
        inner
            .expect_missing_channels()
            .times(2)
            .returning(move |_| Ok(missing.clone()));

        let checker = CachedSubscriptionChecker::new(inner, Duration::from_secs(60), 100);
        let user = UserId::from(1_u64);

        assert_eq!(checker.missing_channels(&user).await?.len(), 1);
        assert_eq!(checker.missing_channels(&user).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_propagate_and_are_not_cached() -> Result<(), Box<dyn std::error::Error>> {
        let mut inner = MockSubscriptionChecker::new();
        inner
            .expect_missing_channels()
            .times(2)
            .returning(|_| Err(PlatformQueryError::Network("connection reset".to_string())));

        let checker = CachedSubscriptionChecker::new(inner, Duration::from_secs(60), 100);
        let user = UserId::from(1_u64);

        assert!(checker.missing_channels(&user).await.is_err());
        assert!(checker.missing_channels(&user).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalidate_forces_requery() -> Result<(), Box<dyn std::error::Error>> {
        let mut inner = MockSubscriptionChecker::new();
        inner
            .expect_missing_channels()
            .times(2)
            .returning(|_| Ok(Vec::new()));
        inner.expect_requirement().return_const(requirement()?);

        let checker = CachedSubscriptionChecker::new(inner, Duration::from_secs(60), 100);
        let user = UserId::from(1_u64);

        checker.missing_channels(&user).await?;
        checker.invalidate(&user).await;
        checker.missing_channels(&user).await?;
        assert_eq!(checker.requirement().len(), 2);
        Ok(())
    }
}
