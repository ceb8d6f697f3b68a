use std::time::Duration;

use typed_builder::TypedBuilder;

use esdb_core::endpoint::Endpoint;
use esdb_core::error::{Error, Result};
use esdb_core::pattern::backoff::BackoffSettings;

use crate::config::ClusterConfig;
use crate::node_preference::NodePreference;

/// Validated runtime settings of the discovery subsystem.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ClusterSettings {
    pub seeds: Vec<Endpoint>,
    #[builder(default)]
    pub node_preference: NodePreference,
    #[builder(default = Duration::from_secs(5))]
    pub gossip_timeout: Duration,
    /// `None` disables the periodic refresh, rounds then only run on demand.
    #[builder(default = Some(Duration::from_secs(30)))]
    pub refresh_interval: Option<Duration>,
    #[builder(default = 10)]
    pub max_discover_attempts: usize,
    /// Delay before a failed connection resolution is attempted again.
    #[builder(default = Duration::from_millis(500))]
    pub reconnect_delay: Duration,
    #[builder(default)]
    pub backoff: BackoffSettings,
}

impl ClusterSettings {
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(Error::InvalidSettings("at least one seed endpoint is required".to_string()));
        }
        if self.gossip_timeout.is_zero() {
            return Err(Error::InvalidSettings("gossip timeout must be > 0".to_string()));
        }
        if matches!(self.refresh_interval, Some(interval) if interval.is_zero()) {
            return Err(Error::InvalidSettings("refresh interval must be > 0 or disabled".to_string()));
        }
        if self.max_discover_attempts == 0 {
            return Err(Error::InvalidSettings("max discover attempts must be >= 1".to_string()));
        }
        self.backoff.validate()
    }
}

impl TryFrom<&ClusterConfig> for ClusterSettings {
    type Error = Error;

    fn try_from(value: &ClusterConfig) -> Result<Self> {
        let refresh_interval = if value.refresh_enabled {
            Some(value.refresh_interval.to_std_duration())
        } else {
            None
        };
        let settings = ClusterSettings {
            seeds: value.seeds.clone(),
            node_preference: value.node_preference,
            gossip_timeout: value.gossip_timeout.to_std_duration(),
            refresh_interval,
            max_discover_attempts: value.max_discover_attempts,
            reconnect_delay: value.reconnect_delay.to_std_duration(),
            backoff: BackoffSettings::from(&value.backoff),
        };
        settings.validate()?;
        Ok(settings)
    }
}
