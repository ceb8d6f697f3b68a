use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use clap::Parser;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use tracing::{info, warn};

use esdb_cluster::channel::{ChannelInfo, ClusterChannel};
use esdb_cluster::config::ClusterConfig;
use esdb_cluster::config::settings::ClusterSettings;
use esdb_cluster::gossip::GossipClient;
use esdb_cluster::leader_change::{RpcStatus, StatusCode};
use esdb_cluster::member::{ClusterMember, VNodeState};
use esdb_core::config::ConfigBuilder;
use esdb_core::endpoint::Endpoint;
use esdb_core::ext::init_logger_with_filter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = "3")]
    nodes: u16,
    #[arg(short, long, default_value = "4")]
    failovers: usize,
    #[arg(short, long, default_value = "5")]
    appends: usize,
    #[arg(long, default_value = "200")]
    interval_millis: u64,
}

/// In memory cluster, node 0 starts as leader.
#[derive(Debug)]
struct SimCluster {
    members: Mutex<Vec<ClusterMember>>,
    position: AtomicU64,
}

impl SimCluster {
    fn new(nodes: u16) -> Arc<Self> {
        let members = (0..nodes).map(|i| {
            let state = if i == 0 { VNodeState::Leader } else { VNodeState::Follower };
            ClusterMember::alive(state, Endpoint::new("127.0.0.1", 2113 + i))
        }).collect();
        Arc::new(Self { members: Mutex::new(members), position: AtomicU64::new(0) })
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.members.lock().iter().map(|m| m.endpoint.clone()).collect()
    }

    fn leader(&self) -> Option<Endpoint> {
        self.members.lock().iter()
            .find(|m| m.is_alive && m.state == VNodeState::Leader)
            .map(|m| m.endpoint.clone())
    }

    fn is_alive(&self, endpoint: &Endpoint) -> bool {
        self.members.lock().iter().any(|m| m.is_alive && &m.endpoint == endpoint)
    }

    /// Shuts the leader down, brings previously stopped nodes back as followers and
    /// promotes a random follower.
    fn fail_over(&self) -> Option<(Endpoint, Endpoint)> {
        let mut members = self.members.lock();
        let leader = members.iter().position(|m| m.is_alive && m.state == VNodeState::Leader)?;
        for member in members.iter_mut() {
            if !member.is_alive {
                member.is_alive = true;
                member.state = VNodeState::Follower;
            }
        }
        members[leader].is_alive = false;
        members[leader].state = VNodeState::Shutdown;
        let followers = members.iter()
            .enumerate()
            .filter(|(_, m)| m.is_alive)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let promoted = *followers.choose(&mut thread_rng())?;
        members[promoted].state = VNodeState::Leader;
        Some((members[leader].endpoint.clone(), members[promoted].endpoint.clone()))
    }

    fn append(&self, channel: &ChannelInfo) -> anyhow::Result<u64> {
        if !self.is_alive(&channel.endpoint) {
            return Err(anyhow::Error::new(RpcStatus::new(StatusCode::Unavailable, format!("{} is down", channel.endpoint))));
        }
        match self.leader() {
            Some(leader) if leader == channel.endpoint => Ok(self.position.fetch_add(1, Ordering::SeqCst) + 1),
            Some(leader) => Err(anyhow::Error::new(RpcStatus::not_leader(&leader))),
            None => Err(anyhow::Error::new(RpcStatus::new(StatusCode::Unavailable, "no leader elected"))),
        }
    }
}

#[derive(Debug)]
struct SimGossipClient {
    endpoint: Endpoint,
    cluster: Arc<SimCluster>,
}

#[async_trait]
impl GossipClient for SimGossipClient {
    async fn cluster_topology(&self, _timeout: Duration) -> anyhow::Result<Vec<ClusterMember>> {
        let latency = thread_rng().gen_range(1..20);
        tokio::time::sleep(Duration::from_millis(latency)).await;
        if !self.cluster.is_alive(&self.endpoint) {
            return Err(anyhow!("{} connection refused", self.endpoint));
        }
        Ok(self.cluster.members.lock().clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Args { nodes, failovers, appends, interval_millis } = Args::try_parse()?;
    init_logger_with_filter("info,esdb_cluster::resolver=debug");
    let cluster = SimCluster::new(nodes);
    let mut config = ClusterConfig::builder().build()?;
    config.seeds = cluster.endpoints();
    let settings = ClusterSettings::try_from(&config)?;
    let factory = {
        let cluster = cluster.clone();
        Arc::new(move |endpoint: &Endpoint| -> anyhow::Result<Arc<dyn GossipClient>> {
            let client: Arc<dyn GossipClient> = Arc::new(SimGossipClient { endpoint: endpoint.clone(), cluster: cluster.clone() });
            Ok(client)
        })
    };
    let channel = ClusterChannel::connect(settings, factory)?;
    channel.on_resolver_result(|result| info!("balancer received {}", result));
    let interval = Duration::from_millis(interval_millis);
    for round in 0..=failovers {
        for _ in 0..appends {
            let appended = channel.call(|info| {
                let cluster = cluster.clone();
                async move { cluster.append(&info).map(|position| (info, position)) }
            }).await;
            match appended {
                Ok((info, position)) => {
                    info!("round {} appended at {} via {} (generation {})", round, position, info.endpoint, info.generation);
                }
                Err(error) => {
                    warn!("round {} append failed: {:#}", round, error);
                }
            }
            tokio::time::sleep(interval).await;
        }
        if round < failovers {
            if let Some((old, new)) = cluster.fail_over() {
                info!("leader {} shut down, {} promoted", old, new);
            }
        }
    }
    channel.dispose();
    Ok(())
}
