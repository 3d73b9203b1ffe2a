use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subgate_core::admission::{
    AdmitResult, BusyPolicy, ChannelId, ChannelMembership, MemberStatus, MembershipChecker,
    PlatformQueryError, QueryMode, RateLimiter, RequestGate, SubscriptionRequirement, UserId,
};

struct SlowMember;

#[async_trait]
impl ChannelMembership for SlowMember {
    async fn member_status(
        &self,
        _channel: &ChannelId,
        _user_id: &UserId,
    ) -> Result<MemberStatus, PlatformQueryError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(MemberStatus::Member)
    }
}

fn shared_gate() -> Result<Arc<RequestGate>, Box<dyn std::error::Error>> {
    let checker = MembershipChecker::new(
        SlowMember,
        SubscriptionRequirement::parse("@a,@b")?,
        Duration::from_secs(1),
        QueryMode::Concurrent,
    );
    Ok(Arc::new(RequestGate::new(
        Arc::new(RateLimiter::new(
            Duration::from_secs(5),
            Duration::from_secs(50),
        )),
        Arc::new(checker),
        BusyPolicy::Advisory,
    )))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_user_admits_exactly_one() -> Result<(), Box<dyn std::error::Error>> {
    const N: usize = 32;
    let gate = shared_gate()?;
    let user = UserId::new("42")?;
    let t0 = Instant::now();

    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let gate = gate.clone();
        let user = user.clone();
        let offset = Duration::from_millis(u64::try_from(i)? * 10);
        handles.push(tokio::spawn(async move {
            match gate.admit(&user, t0 + offset).await {
                AdmitResult::Allowed(_guard) => (1_usize, 0_usize),
                AdmitResult::DeniedRateLimit { .. } => (0, 1),
                other => panic!("unexpected outcome {other:?}"),
            }
        }));
    }

    let mut allowed = 0;
    let mut limited = 0;
    for handle in handles {
        let (a, l) = handle.await?;
        allowed += a;
        limited += l;
    }

    assert_eq!(allowed, 1);
    assert_eq!(limited, N - 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_users_do_not_block_each_other() -> Result<(), Box<dyn std::error::Error>> {
    const N: u64 = 64;
    let gate = shared_gate()?;
    let t0 = Instant::now();

    let mut handles = Vec::new();
    for id in 0..N {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            gate.admit(&UserId::from(id), t0).await.is_allowed()
        }));
    }

    for handle in handles {
        assert!(handle.await?);
    }
    assert_eq!(gate.stats().admitted, N);
    assert_eq!(gate.stats().busy_users, 0);
    Ok(())
}
