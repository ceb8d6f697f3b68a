use std::sync::Arc;

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("cluster discovery timed out, no gossip endpoint answered in time")]
    DiscoveryTimeout,
    #[error("gossip answered but reported no alive cluster members")]
    NoViableEndpoints,
    #[error("gossip transport failure: {0:#}")]
    GossipTransportFailure(Arc<anyhow::Error>),
    #[error("no alive cluster node available for the configured node preference")]
    NoNodeAvailable,
    #[error("resource is disposed, any further use of it is invalid")]
    ResourceDisposed,
    #[error("operation cancelled")]
    Cancelled,
    #[error("resource production failed: {0:#}")]
    ProductionFailed(Arc<anyhow::Error>),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("endpoint {0} is invalid, expected host:port")]
    InvalidEndpoint(String),
}

impl Error {
    pub fn transport(error: impl Into<anyhow::Error>) -> Self {
        Error::GossipTransportFailure(Arc::new(error.into()))
    }

    pub fn production(error: impl Into<anyhow::Error>) -> Self {
        Error::ProductionFailed(Arc::new(error.into()))
    }

    /// Discovery errors are retried by the resolver before they surface.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::DiscoveryTimeout | Error::NoViableEndpoints | Error::GossipTransportFailure(_)
        )
    }
}
