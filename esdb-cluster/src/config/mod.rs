use config::builder::DefaultState;
use config::{File, FileFormat, Source};
use serde::{Deserialize, Serialize};

use esdb_core::config::duration::ConfigDuration;
use esdb_core::config::{Config, ConfigBuilder};
use esdb_core::endpoint::Endpoint;
use esdb_core::pattern::backoff::BackoffConfig;

use crate::node_preference::NodePreference;
use crate::config::settings::ClusterSettings;
use crate::CLUSTER_CONFIG;

pub mod settings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterConfig {
    pub seeds: Vec<Endpoint>,
    pub node_preference: NodePreference,
    pub gossip_timeout: ConfigDuration,
    pub refresh_enabled: bool,
    pub refresh_interval: ConfigDuration,
    pub max_discover_attempts: usize,
    pub reconnect_delay: ConfigDuration,
    pub backoff: BackoffConfig,
}

impl Config for ClusterConfig {
    fn validate(&self) -> anyhow::Result<()> {
        ClusterSettings::try_from(self)?;
        Ok(())
    }
}

impl ClusterConfig {
    /// Starts from the embedded `cluster.toml`, sources added later override it.
    pub fn builder() -> ClusterConfigBuilder {
        let builder = config::ConfigBuilder::<DefaultState>::default()
            .add_source(File::from_str(CLUSTER_CONFIG, FileFormat::Toml));
        ClusterConfigBuilder { builder }
    }
}

#[derive(Debug)]
pub struct ClusterConfigBuilder {
    builder: config::ConfigBuilder<DefaultState>,
}

impl ConfigBuilder for ClusterConfigBuilder {
    type C = ClusterConfig;

    fn add_source<T>(self, source: T) -> anyhow::Result<Self> where T: Source + Send + Sync + 'static {
        Ok(Self { builder: self.builder.add_source(source) })
    }

    fn build(self) -> anyhow::Result<Self::C> {
        let cluster_config = self.builder.build()?.try_deserialize::<Self::C>()?;
        cluster_config.validate()?;
        Ok(cluster_config)
    }
}
