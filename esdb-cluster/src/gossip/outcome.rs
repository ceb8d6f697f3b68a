use std::fmt::{Display, Formatter};

use esdb_core::error::Error;

use crate::topology::ClusterTopology;

/// Result of querying gossip during one discovery attempt.
#[derive(Debug, Clone)]
pub enum DiscoveryOutcome {
    Success(ClusterTopology),
    DiscoveryTimeout,
    NoViableEndpoints,
    GossipTransportFailure(Error),
}

impl DiscoveryOutcome {
    /// Folds the failed outcomes of one attempt into the one reported for it: any node
    /// answering without alive members wins over timeouts, only timeouts make a timeout,
    /// anything else reports the last transport failure.
    pub fn aggregate(failures: Vec<DiscoveryOutcome>) -> DiscoveryOutcome {
        if failures.iter().any(|o| matches!(o, DiscoveryOutcome::NoViableEndpoints)) {
            return DiscoveryOutcome::NoViableEndpoints;
        }
        let transport = failures.into_iter().rev().find_map(|o| match o {
            DiscoveryOutcome::GossipTransportFailure(error) => Some(error),
            _ => None,
        });
        match transport {
            Some(error) => DiscoveryOutcome::GossipTransportFailure(error),
            None => DiscoveryOutcome::DiscoveryTimeout,
        }
    }

    pub fn into_result(self) -> Result<ClusterTopology, Error> {
        match self {
            DiscoveryOutcome::Success(topology) => Ok(topology),
            DiscoveryOutcome::DiscoveryTimeout => Err(Error::DiscoveryTimeout),
            DiscoveryOutcome::NoViableEndpoints => Err(Error::NoViableEndpoints),
            DiscoveryOutcome::GossipTransportFailure(error) => Err(error),
        }
    }
}

impl Display for DiscoveryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryOutcome::Success(topology) => write!(f, "Success({})", topology),
            DiscoveryOutcome::DiscoveryTimeout => write!(f, "DiscoveryTimeout"),
            DiscoveryOutcome::NoViableEndpoints => write!(f, "NoViableEndpoints"),
            DiscoveryOutcome::GossipTransportFailure(error) => write!(f, "GossipTransportFailure({})", error),
        }
    }
}
