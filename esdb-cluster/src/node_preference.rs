use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::member::VNodeState;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodePreference {
    #[default]
    Leader,
    Follower,
    ReadOnlyReplica,
    Random,
}

const LEADER_ORDER: &[VNodeState] = &[
    VNodeState::Leader,
    VNodeState::Follower,
    VNodeState::ReadOnlyReplica,
    VNodeState::PreReadOnlyReplica,
    VNodeState::ReadOnlyLeaderless,
    VNodeState::DiscoverLeader,
];

const FOLLOWER_ORDER: &[VNodeState] = &[
    VNodeState::Follower,
    VNodeState::Leader,
    VNodeState::ReadOnlyReplica,
    VNodeState::PreReadOnlyReplica,
    VNodeState::ReadOnlyLeaderless,
];

const READ_ONLY_REPLICA_ORDER: &[VNodeState] = &[
    VNodeState::ReadOnlyReplica,
    VNodeState::PreReadOnlyReplica,
    VNodeState::ReadOnlyLeaderless,
    VNodeState::Leader,
    VNodeState::Follower,
];

impl NodePreference {
    /// Position of `state` in this preference, lower is better. States the preference
    /// does not list share the worst rank. `Random` ranks every state equally.
    pub fn rank(&self, state: VNodeState) -> usize {
        let order = match self {
            NodePreference::Leader => LEADER_ORDER,
            NodePreference::Follower => FOLLOWER_ORDER,
            NodePreference::ReadOnlyReplica => READ_ONLY_REPLICA_ORDER,
            NodePreference::Random => return 0,
        };
        order.iter().position(|s| *s == state).unwrap_or(order.len())
    }
}

impl Display for NodePreference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodePreference::Leader => write!(f, "leader"),
            NodePreference::Follower => write!(f, "follower"),
            NodePreference::ReadOnlyReplica => write!(f, "read-only-replica"),
            NodePreference::Random => write!(f, "random"),
        }
    }
}
