use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use esdb_core::endpoint::Endpoint;
use esdb_core::pattern::backoff::BackoffSettings;

use crate::config::settings::ClusterSettings;
use crate::gossip::{GossipClient, GossipClientFactory};
use crate::member::ClusterMember;
use crate::resolver::result::ResolverResult;

pub(crate) fn node(index: u16) -> Endpoint {
    Endpoint::new("127.0.0.1", 2110 + index)
}

pub(crate) fn test_settings(seeds: Vec<Endpoint>) -> ClusterSettings {
    ClusterSettings::builder()
        .seeds(seeds)
        .gossip_timeout(Duration::from_millis(50))
        .refresh_interval(None)
        .max_discover_attempts(3)
        .reconnect_delay(Duration::from_millis(20))
        .backoff(BackoffSettings {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
            multiplier: 2.0,
            jitter: 0.1,
        })
        .build()
}

pub(crate) async fn next_publish(
    results: &mut watch::Receiver<Option<ResolverResult>>,
    after: u64,
) -> anyhow::Result<ResolverResult> {
    let next = tokio::time::timeout(
        Duration::from_secs(5),
        results.wait_for(|r| r.as_ref().is_some_and(|r| r.sequence > after)),
    ).await??;
    (*next).clone().ok_or(anyhow!("nothing published"))
}

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Answer(Vec<ClusterMember>),
    Hang,
    Fail(String),
}

/// Scriptable gossip endpoints. Endpoints without a behavior refuse connections.
#[derive(Debug, Default)]
pub(crate) struct FakeCluster {
    behaviors: Mutex<HashMap<Endpoint, Behavior>>,
    queries: Mutex<Vec<Endpoint>>,
}

impl FakeCluster {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set(&self, endpoint: &Endpoint, behavior: Behavior) {
        self.behaviors.lock().insert(endpoint.clone(), behavior);
    }

    pub(crate) fn answer_all(&self, endpoints: &[Endpoint], members: Vec<ClusterMember>) {
        for endpoint in endpoints {
            self.set(endpoint, Behavior::Answer(members.clone()));
        }
    }

    pub(crate) fn queries(&self) -> Vec<Endpoint> {
        self.queries.lock().clone()
    }

    pub(crate) fn query_count(&self, endpoint: &Endpoint) -> usize {
        self.queries.lock().iter().filter(|e| *e == endpoint).count()
    }

    pub(crate) fn clear_queries(&self) {
        self.queries.lock().clear();
    }

    pub(crate) fn factory(self: &Arc<Self>) -> Arc<dyn GossipClientFactory> {
        let cluster = self.clone();
        Arc::new(move |endpoint: &Endpoint| -> anyhow::Result<Arc<dyn GossipClient>> {
            let client: Arc<dyn GossipClient> = Arc::new(FakeGossipClient { endpoint: endpoint.clone(), cluster: cluster.clone() });
            Ok(client)
        })
    }
}

#[derive(Debug)]
struct FakeGossipClient {
    endpoint: Endpoint,
    cluster: Arc<FakeCluster>,
}

#[async_trait]
impl GossipClient for FakeGossipClient {
    async fn cluster_topology(&self, _timeout: Duration) -> anyhow::Result<Vec<ClusterMember>> {
        self.cluster.queries.lock().push(self.endpoint.clone());
        let behavior = self.cluster.behaviors.lock().get(&self.endpoint).cloned();
        match behavior {
            Some(Behavior::Answer(members)) => Ok(members),
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Fail(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("connection refused")),
        }
    }
}
