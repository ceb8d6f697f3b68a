use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use esdb_core::endpoint::Endpoint;
use esdb_core::error::Error;

use crate::topology::ClusterTopology;

#[derive(Debug, Clone)]
pub enum ResolverStatus {
    Ok,
    Error(Error),
}

/// What the resolver hands to the balancer. An `Ok` result always carries at least
/// one address, failures are published as `Error` and never as an empty `Ok`.
#[derive(Debug, Clone)]
pub struct ResolverResult {
    pub sequence: u64,
    pub status: ResolverStatus,
    pub addresses: Vec<Endpoint>,
    pub topology: Option<Arc<ClusterTopology>>,
}

impl ResolverResult {
    pub(crate) fn ok(sequence: u64, addresses: Vec<Endpoint>, topology: Arc<ClusterTopology>) -> Self {
        debug_assert!(!addresses.is_empty());
        Self {
            sequence,
            status: ResolverStatus::Ok,
            addresses,
            topology: Some(topology),
        }
    }

    pub(crate) fn error(sequence: u64, error: Error) -> Self {
        Self {
            sequence,
            status: ResolverStatus::Error(error),
            addresses: vec![],
            topology: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ResolverStatus::Ok)
    }

    /// The address a connection should use, or the error the resolution ended with.
    pub fn endpoint(&self) -> Result<&Endpoint, Error> {
        match &self.status {
            ResolverStatus::Ok => self.addresses.first().ok_or(Error::NoNodeAvailable),
            ResolverStatus::Error(error) => Err(error.clone()),
        }
    }
}

impl Display for ResolverResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            ResolverStatus::Ok => {
                write!(f, "ResolverResult(#{}, Ok, [{}])", self.sequence, self.addresses.iter().join(", "))
            }
            ResolverStatus::Error(error) => {
                write!(f, "ResolverResult(#{}, Error, {})", self.sequence, error)
            }
        }
    }
}
