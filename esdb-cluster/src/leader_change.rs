use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, info, warn};

use esdb_core::endpoint::Endpoint;
use esdb_core::error::Error;

use crate::channel::{ChannelInfo, ReconnectionRequired};
use crate::resolver::GossipResolver;

pub const EXCEPTION_KEY: &str = "exception";
pub const NOT_LEADER: &str = "not-leader";
pub const LEADER_HOST_KEY: &str = "leader-endpoint-host";
pub const LEADER_PORT_KEY: &str = "leader-endpoint-port";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// Failure status of a remote call, with the trailing metadata the server attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
    pub metadata: HashMap<String, String>,
}

impl RpcStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// What a follower answers to a request only the leader may serve.
    pub fn not_leader(leader: &Endpoint) -> Self {
        Self::new(StatusCode::NotFound, format!("not leader, leader is {}", leader))
            .with_metadata(EXCEPTION_KEY, NOT_LEADER)
            .with_metadata(LEADER_HOST_KEY, leader.host.clone())
            .with_metadata(LEADER_PORT_KEY, leader.port.to_string())
    }

    pub fn is_not_leader(&self) -> bool {
        self.code == StatusCode::NotFound
            && self.metadata.get(EXCEPTION_KEY).is_some_and(|e| e == NOT_LEADER)
    }
}

impl Display for RpcStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcStatus {}

/// Best effort reading of a failed call: did the node point at another leader, or is the
/// node gone altogether.
pub trait LeaderHint {
    fn leader_endpoint(&self) -> Option<Endpoint> {
        None
    }

    fn requires_rediscovery(&self) -> bool {
        false
    }
}

impl LeaderHint for RpcStatus {
    fn leader_endpoint(&self) -> Option<Endpoint> {
        if !self.is_not_leader() {
            return None;
        }
        let host = self.metadata.get(LEADER_HOST_KEY).filter(|h| !h.is_empty())?;
        let port = self.metadata.get(LEADER_PORT_KEY)?.parse::<u16>().ok()?;
        Some(Endpoint::new(host.clone(), port))
    }

    fn requires_rediscovery(&self) -> bool {
        self.code == StatusCode::Unavailable
    }
}

impl LeaderHint for Error {
    fn requires_rediscovery(&self) -> bool {
        self.is_transient() || matches!(self, Error::NoNodeAvailable)
    }
}

impl LeaderHint for anyhow::Error {
    fn leader_endpoint(&self) -> Option<Endpoint> {
        self.downcast_ref::<RpcStatus>().and_then(|s| s.leader_endpoint())
    }

    fn requires_rediscovery(&self) -> bool {
        if let Some(status) = self.downcast_ref::<RpcStatus>() {
            return status.requires_rediscovery();
        }
        self.downcast_ref::<Error>().is_some_and(|e| e.requires_rediscovery())
    }
}

fn reconnection_for<E>(error: &E) -> Option<ReconnectionRequired> where E: LeaderHint {
    if let Some(leader) = error.leader_endpoint() {
        return Some(ReconnectionRequired::NewLeader(leader));
    }
    if error.requires_rediscovery() {
        return Some(ReconnectionRequired::Rediscover);
    }
    None
}

/// Watches call failures for leadership changes and points the channel elsewhere.
#[derive(Debug, Clone)]
pub struct LeaderChangeDetector {
    resolver: GossipResolver,
}

impl LeaderChangeDetector {
    pub fn new(resolver: GossipResolver) -> Self {
        Self { resolver }
    }

    /// Runs `call` and inspects its failure. The call's own result is returned untouched.
    pub async fn intercept<T, E, Fut>(&self, channel: &ChannelInfo, call: Fut) -> Result<T, E>
        where
            Fut: Future<Output=Result<T, E>>,
            E: LeaderHint,
    {
        let result = call.await;
        if let Err(error) = &result {
            self.inspect(channel, error);
        }
        result
    }

    /// Reports the channel's slot broken when `error` calls for it and returns what was asked.
    pub fn inspect<E>(&self, channel: &ChannelInfo, error: &E) -> Option<ReconnectionRequired> where E: LeaderHint {
        let reconnection = match catch_unwind(AssertUnwindSafe(|| reconnection_for(error))) {
            Ok(reconnection) => reconnection?,
            Err(_) => {
                warn!("leader hint extraction panicked on a call to {}, failure passed through", channel.endpoint);
                return None;
            }
        };
        match &reconnection {
            ReconnectionRequired::NewLeader(leader) => {
                info!("{} is no longer the leader, reconnect to {}", channel.endpoint, leader);
                channel.report_broken(reconnection.clone());
                self.resolver.trigger(Some(leader.clone()));
            }
            ReconnectionRequired::Rediscover => {
                debug!("{} unavailable, rediscover", channel.endpoint);
                channel.report_broken(reconnection.clone());
            }
        }
        Some(reconnection)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use esdb_core::endpoint::Endpoint;
    use esdb_core::error::Error;

    use crate::leader_change::{LEADER_PORT_KEY, LeaderHint, RpcStatus, StatusCode};

    #[test]
    fn extract_leader_from_not_leader_status() {
        let leader = Endpoint::new("node3.cluster", 2113);
        let status = RpcStatus::not_leader(&leader);
        assert_eq!(status.leader_endpoint(), Some(leader.clone()));
        assert!(!status.requires_rediscovery());
        let wrapped = anyhow::Error::new(status);
        assert_eq!(wrapped.leader_endpoint(), Some(leader));
    }

    #[test]
    fn ignore_malformed_leader_metadata() {
        let leader = Endpoint::new("node3.cluster", 2113);
        let bad_port = RpcStatus::not_leader(&leader).with_metadata(LEADER_PORT_KEY, "21x3");
        assert_eq!(bad_port.leader_endpoint(), None);
        let mut no_exception = RpcStatus::not_leader(&leader);
        no_exception.metadata.remove("exception");
        assert_eq!(no_exception.leader_endpoint(), None);
        let wrong_code = RpcStatus { code: StatusCode::Internal, ..RpcStatus::not_leader(&leader) };
        assert_eq!(wrong_code.leader_endpoint(), None);
    }

    #[test]
    fn unavailable_requires_rediscovery() {
        assert!(RpcStatus::new(StatusCode::Unavailable, "node down").requires_rediscovery());
        assert!(!RpcStatus::new(StatusCode::InvalidArgument, "bad stream").requires_rediscovery());
        assert!(Error::NoNodeAvailable.requires_rediscovery());
        assert!(!Error::ResourceDisposed.requires_rediscovery());
        assert!(anyhow::Error::new(Error::DiscoveryTimeout).requires_rediscovery());
        assert!(!anyhow!("stream deleted").requires_rediscovery());
    }
}
