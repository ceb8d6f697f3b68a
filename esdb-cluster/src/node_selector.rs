use rand::seq::SliceRandom;
use rand::thread_rng;

use esdb_core::error::{Error, Result};

use crate::member::ClusterMember;
use crate::node_preference::NodePreference;
use crate::topology::ClusterTopology;

/// Picks the member a client should talk to.
///
/// Dead members are dropped, the rest are ordered by the rank the preference gives
/// their role and the best one wins. Members sharing the best rank are picked
/// uniformly at random, which for [`NodePreference::Random`] means every alive member.
#[derive(Debug, Copy, Clone, Default)]
pub struct NodeSelector {
    preference: NodePreference,
}

impl NodeSelector {
    pub fn new(preference: NodePreference) -> Self {
        Self { preference }
    }

    pub fn preference(&self) -> NodePreference {
        self.preference
    }

    pub fn select<'a>(&self, topology: &'a ClusterTopology) -> Result<&'a ClusterMember> {
        let mut candidates = topology.alive().collect::<Vec<_>>();
        candidates.shuffle(&mut thread_rng());
        candidates.sort_by_key(|m| self.preference.rank(m.state));
        candidates.first().copied().ok_or(Error::NoNodeAvailable)
    }
}
