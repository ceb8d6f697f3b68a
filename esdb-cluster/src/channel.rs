use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use esdb_core::endpoint::Endpoint;
use esdb_core::error::{Error, Result};
use esdb_core::pattern::shared_cell::{BrokenHandle, SharedResourceCell};

use crate::config::settings::ClusterSettings;
use crate::gossip::GossipClientFactory;
use crate::leader_change::{LeaderChangeDetector, LeaderHint};
use crate::resolver::GossipResolver;
use crate::resolver::result::ResolverResult;

/// Why a channel has to be established again.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReconnectionRequired {
    Rediscover,
    NewLeader(Endpoint),
}

impl Display for ReconnectionRequired {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectionRequired::Rediscover => write!(f, "Rediscover"),
            ReconnectionRequired::NewLeader(leader) => write!(f, "NewLeader({})", leader),
        }
    }
}

/// The node calls currently go to.
#[derive(Clone)]
pub struct ChannelInfo {
    pub endpoint: Endpoint,
    pub generation: u64,
    pub resolved_at: Instant,
    broken: BrokenHandle<ReconnectionRequired, ChannelInfo>,
}

impl ChannelInfo {
    /// Marks this exact channel unusable. Reports against a channel that was already
    /// replaced, or whose replacement is still being established, are ignored.
    pub fn report_broken(&self, next: ReconnectionRequired) -> bool {
        self.broken.report_broken(next)
    }
}

impl Debug for ChannelInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelInfo")
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation)
            .field("resolved_at", &self.resolved_at)
            .finish_non_exhaustive()
    }
}

/// The connection handle a client owns: discovery, channel sharing and leader tracking
/// behind one value. Clones share everything.
#[derive(Debug, Clone)]
pub struct ClusterChannel {
    resolver: GossipResolver,
    cell: SharedResourceCell<ReconnectionRequired, ChannelInfo>,
    detector: LeaderChangeDetector,
}

impl ClusterChannel {
    pub fn connect(settings: ClusterSettings, factory: Arc<dyn GossipClientFactory>) -> Result<Self> {
        let reconnect_delay = settings.reconnect_delay;
        let resolver = GossipResolver::start(settings, factory)?;
        let cell = {
            let resolver = resolver.clone();
            SharedResourceCell::new(ReconnectionRequired::Rediscover, reconnect_delay, move |reason, broken| {
                Self::establish(resolver.clone(), reason, broken)
            })
        };
        let detector = LeaderChangeDetector::new(resolver.clone());
        Ok(Self { resolver, cell, detector })
    }

    async fn establish(
        resolver: GossipResolver,
        reason: ReconnectionRequired,
        broken: BrokenHandle<ReconnectionRequired, ChannelInfo>,
    ) -> Result<ChannelInfo> {
        let endpoint = match reason {
            ReconnectionRequired::Rediscover => resolver.resolve().await?.endpoint()?.clone(),
            ReconnectionRequired::NewLeader(leader) => leader,
        };
        info!("channel generation {} established to {}", broken.generation(), endpoint);
        Ok(ChannelInfo {
            endpoint,
            generation: broken.generation(),
            resolved_at: Instant::now(),
            broken,
        })
    }

    pub async fn current(&self) -> Result<ChannelInfo> {
        self.cell.current().await
    }

    pub async fn current_with(&self, cancel: &CancellationToken) -> Result<ChannelInfo> {
        self.cell.current_with(cancel).await
    }

    /// Reports whatever channel is current broken.
    pub fn reset(&self, next: ReconnectionRequired) -> bool {
        self.cell.reset(next)
    }

    /// Runs `f` against the current channel, redirecting the channel when the call fails
    /// because of a leadership change or an unavailable node.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, E>
        where
            F: FnOnce(ChannelInfo) -> Fut,
            Fut: Future<Output=Result<T, E>>,
            E: LeaderHint + From<Error>,
    {
        let channel = self.current().await?;
        self.detector.intercept(&channel, f(channel.clone())).await
    }

    pub fn on_resolver_result<F>(&self, handler: F) where F: Fn(&ResolverResult) + Send + Sync + 'static {
        self.resolver.on_resolver_result(handler)
    }

    pub fn resolver(&self) -> &GossipResolver {
        &self.resolver
    }

    pub fn detector(&self) -> &LeaderChangeDetector {
        &self.detector
    }

    pub fn dispose(&self) {
        self.cell.dispose();
        self.resolver.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use esdb_core::error::Error;

    use crate::channel::{ClusterChannel, ReconnectionRequired};
    use crate::config::settings::ClusterSettings;
    use crate::leader_change::{RpcStatus, StatusCode};
    use crate::member::{ClusterMember, VNodeState};
    use crate::test_kit::{Behavior, FakeCluster, node, test_settings};

    fn led_by(leader: u16) -> Vec<ClusterMember> {
        (1..=3).map(|i| {
            let state = if i == leader { VNodeState::Leader } else { VNodeState::Follower };
            ClusterMember::alive(state, node(i))
        }).collect()
    }

    #[tokio::test]
    async fn connect_to_leader() -> anyhow::Result<()> {
        let cluster = FakeCluster::new();
        cluster.answer_all(&[node(1), node(2), node(3)], led_by(2));
        let channel = ClusterChannel::connect(test_settings(vec![node(1), node(2), node(3)]), cluster.factory())?;
        let info = channel.current().await?;
        assert_eq!(info.endpoint, node(2));
        assert_eq!(info.generation, 1);
        assert_eq!(channel.current().await?.generation, 1);
        channel.dispose();
        Ok(())
    }

    #[tokio::test]
    async fn redirect_to_new_leader_on_not_leader() -> anyhow::Result<()> {
        let cluster = FakeCluster::new();
        cluster.answer_all(&[node(1), node(2), node(3)], led_by(1));
        let channel = ClusterChannel::connect(test_settings(vec![node(1), node(2), node(3)]), cluster.factory())?;
        assert_eq!(channel.current().await?.endpoint, node(1));

        let result: anyhow::Result<()> = channel.call(|_| async {
            Err(anyhow::Error::new(RpcStatus::not_leader(&node(2))))
        }).await;
        let error = result.err().ok_or(anyhow::anyhow!("call should fail"))?;
        assert_eq!(error.downcast_ref::<RpcStatus>(), Some(&RpcStatus::not_leader(&node(2))));

        let info = channel.current().await?;
        assert_eq!(info.endpoint, node(2));
        assert_eq!(info.generation, 2);
        channel.dispose();
        Ok(())
    }

    #[tokio::test]
    async fn rediscover_when_node_unavailable() -> anyhow::Result<()> {
        let cluster = FakeCluster::new();
        cluster.answer_all(&[node(1), node(2), node(3)], led_by(1));
        let channel = ClusterChannel::connect(test_settings(vec![node(1), node(2), node(3)]), cluster.factory())?;
        assert_eq!(channel.current().await?.endpoint, node(1));

        cluster.set(&node(1), Behavior::Fail("connection refused".to_string()));
        cluster.answer_all(&[node(2), node(3)], vec![
            ClusterMember::dead(VNodeState::Leader, node(1)),
            ClusterMember::alive(VNodeState::Follower, node(2)),
            ClusterMember::alive(VNodeState::Leader, node(3)),
        ]);
        let result: anyhow::Result<()> = channel.call(|_| async {
            Err(anyhow::Error::new(RpcStatus::new(StatusCode::Unavailable, "node shutting down")))
        }).await;
        assert!(result.is_err());
        assert_eq!(channel.current().await?.endpoint, node(3));
        channel.dispose();
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_not_leader_reports_coalesce() -> anyhow::Result<()> {
        let cluster = FakeCluster::new();
        cluster.answer_all(&[node(1), node(2), node(3)], led_by(1));
        let channel = ClusterChannel::connect(test_settings(vec![node(1), node(2), node(3)]), cluster.factory())?;
        let info = channel.current().await?;
        let status = RpcStatus::not_leader(&node(3));
        for _ in 0..8 {
            let reconnection = channel.detector().inspect(&info, &status);
            assert_eq!(reconnection, Some(ReconnectionRequired::NewLeader(node(3))));
        }
        let next = channel.current().await?;
        assert_eq!(next.endpoint, node(3));
        assert_eq!(next.generation, 2);
        assert!(!info.report_broken(ReconnectionRequired::Rediscover));
        channel.dispose();
        Ok(())
    }

    #[tokio::test]
    async fn surface_discovery_failure() -> anyhow::Result<()> {
        let cluster = FakeCluster::new();
        cluster.set(&node(1), Behavior::Hang);
        let channel = ClusterChannel::connect(test_settings(vec![node(1)]), cluster.factory())?;
        assert!(matches!(channel.current().await, Err(Error::DiscoveryTimeout)));
        channel.dispose();
        assert!(matches!(channel.current().await, Err(Error::ResourceDisposed)));
        Ok(())
    }

    #[tokio::test]
    async fn stop_gossip_once_channel_dropped() -> anyhow::Result<()> {
        let seeds = vec![node(1), node(2), node(3)];
        let cluster = FakeCluster::new();
        cluster.answer_all(&seeds, led_by(1));
        let settings = ClusterSettings {
            refresh_interval: Some(Duration::from_millis(20)),
            ..test_settings(seeds)
        };
        let channel = ClusterChannel::connect(settings, cluster.factory())?;
        assert_eq!(channel.current().await?.endpoint, node(1));
        drop(channel);
        tokio::time::sleep(Duration::from_millis(30)).await;
        cluster.clear_queries();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cluster.queries().is_empty());
        Ok(())
    }
}
