use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use esdb_core::endpoint::Endpoint;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClusterMember {
    pub instance_id: Uuid,
    pub state: VNodeState,
    pub is_alive: bool,
    pub endpoint: Endpoint,
}

impl ClusterMember {
    pub fn new(instance_id: Uuid, state: VNodeState, is_alive: bool, endpoint: Endpoint) -> Self {
        Self {
            instance_id,
            state,
            is_alive,
            endpoint,
        }
    }

    pub fn alive(state: VNodeState, endpoint: Endpoint) -> Self {
        Self::new(Uuid::new_v4(), state, true, endpoint)
    }

    pub fn dead(state: VNodeState, endpoint: Endpoint) -> Self {
        Self::new(Uuid::new_v4(), state, false, endpoint)
    }
}

impl Display for ClusterMember {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let liveness = if self.is_alive { "alive" } else { "dead" };
        write!(f, "ClusterMember({},{},{},{})", self.endpoint, self.state, liveness, self.instance_id)
    }
}

/// Role of a database node as reported by gossip.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VNodeState {
    Initializing,
    DiscoverLeader,
    Unknown,
    PreReplica,
    CatchingUp,
    Clone,
    Follower,
    PreLeader,
    Leader,
    Manager,
    ShuttingDown,
    Shutdown,
    ReadOnlyLeaderless,
    PreReadOnlyReplica,
    ReadOnlyReplica,
    ResigningLeader,
}

impl Display for VNodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
