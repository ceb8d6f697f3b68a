use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use itertools::Itertools;
use tracing::{debug, warn};

use esdb_core::endpoint::Endpoint;

use crate::gossip::{GossipClient, GossipClientFactory};
use crate::topology::ClusterTopology;

/// Gossip clients per endpoint worth querying: the seeds plus alive members of the
/// last successful round. Entries are created lazily through the factory and
/// dropped as soon as their node leaves the topology.
pub(crate) struct GossipClients {
    seeds: Vec<Endpoint>,
    factory: Arc<dyn GossipClientFactory>,
    clients: DashMap<Endpoint, Arc<dyn GossipClient>, RandomState>,
}

impl Debug for GossipClients {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipClients")
            .field("seeds", &self.seeds)
            .field("factory", &"..")
            .field("clients", &self.endpoints())
            .finish()
    }
}

impl GossipClients {
    pub(crate) fn new(seeds: Vec<Endpoint>, factory: Arc<dyn GossipClientFactory>) -> Self {
        let clients = Self {
            seeds,
            factory,
            clients: DashMap::default(),
        };
        clients.reseed();
        clients
    }

    pub(crate) fn get_or_create(&self, endpoint: &Endpoint) -> anyhow::Result<Arc<dyn GossipClient>> {
        if let Some(client) = self.clients.get(endpoint) {
            return Ok(client.value().clone());
        }
        match self.factory.create(endpoint) {
            Ok(client) => {
                debug!("create gossip client for {}", endpoint);
                let client = self.clients.entry(endpoint.clone()).or_insert(client);
                Ok(client.value().clone())
            }
            Err(error) => {
                warn!("create gossip client for {} failed: {:?}", endpoint, error);
                Err(error)
            }
        }
    }

    pub(crate) fn seeds(&self) -> &[Endpoint] {
        &self.seeds
    }

    pub(crate) fn snapshot(&self) -> Vec<(Endpoint, Arc<dyn GossipClient>)> {
        self.clients.iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub(crate) fn endpoints(&self) -> Vec<Endpoint> {
        self.clients.iter().map(|entry| entry.key().clone()).sorted().collect()
    }

    /// Drops every derived client and starts over from the configured seeds.
    pub(crate) fn reseed(&self) {
        self.clients.clear();
        for seed in &self.seeds {
            let _ = self.get_or_create(seed);
        }
    }

    /// Whether the known clients are exactly the seeds, in which case reseeding
    /// would not change anything.
    pub(crate) fn is_seeded(&self) -> bool {
        self.clients.len() == self.seeds.len() && self.seeds.iter().all(|s| self.clients.contains_key(s))
    }

    /// Aligns the clients with a fresh topology: alive members get a client, every
    /// other endpoint loses its client.
    pub(crate) fn update(&self, topology: &ClusterTopology) {
        let alive = topology.alive_endpoints();
        self.clients.retain(|endpoint, _| {
            let keep = alive.contains(endpoint);
            if !keep {
                debug!("dispose gossip client for {}", endpoint);
            }
            keep
        });
        for endpoint in &alive {
            let _ = self.get_or_create(endpoint);
        }
    }
}
