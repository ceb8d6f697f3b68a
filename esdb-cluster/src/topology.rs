use std::fmt::{Display, Formatter};

use itertools::Itertools;

use esdb_core::endpoint::Endpoint;

use crate::member::ClusterMember;

/// Members seen by one discovery round. Never mutated once built.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ClusterTopology {
    members: Vec<ClusterMember>,
}

impl ClusterTopology {
    pub fn new(members: Vec<ClusterMember>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.members
    }

    pub fn alive(&self) -> impl Iterator<Item=&ClusterMember> {
        self.members.iter().filter(|m| m.is_alive)
    }

    pub fn has_alive_member(&self) -> bool {
        self.alive().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.members.iter().any(|m| &m.endpoint == endpoint)
    }

    pub fn alive_endpoints(&self) -> Vec<Endpoint> {
        self.alive().map(|m| m.endpoint.clone()).unique().collect()
    }
}

impl From<Vec<ClusterMember>> for ClusterTopology {
    fn from(value: Vec<ClusterMember>) -> Self {
        Self::new(value)
    }
}

impl Display for ClusterTopology {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let members = self.members.iter().map(|m| m.to_string()).join(", ");
        write!(f, "ClusterTopology({})", members)
    }
}
