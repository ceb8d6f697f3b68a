use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use esdb_core::endpoint::Endpoint;

use crate::member::ClusterMember;

pub mod outcome;

/// Asks one cluster node for its view of the cluster membership.
///
/// Implementations own whatever transport they need. Dropping the returned future
/// cancels the query; the resolver additionally races it against `timeout`.
#[async_trait]
pub trait GossipClient: Debug + Send + Sync {
    async fn cluster_topology(&self, timeout: Duration) -> anyhow::Result<Vec<ClusterMember>>;
}

pub trait GossipClientFactory: Send + Sync {
    fn create(&self, endpoint: &Endpoint) -> anyhow::Result<Arc<dyn GossipClient>>;
}

impl<F> GossipClientFactory for F where F: Fn(&Endpoint) -> anyhow::Result<Arc<dyn GossipClient>> + Send + Sync {
    fn create(&self, endpoint: &Endpoint) -> anyhow::Result<Arc<dyn GossipClient>> {
        self(endpoint)
    }
}
