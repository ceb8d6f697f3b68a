use std::fmt::Debug;

use config::Source;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod duration;

/// A configuration section deserialized from layered `config` sources.
pub trait Config: Debug + Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Checks cross field constraints that serde cannot express.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait ConfigBuilder: Sized {
    type C: Config;

    fn add_source<T>(self, source: T) -> anyhow::Result<Self>
        where
            T: Source + Send + Sync + 'static;

    fn build(self) -> anyhow::Result<Self::C>;
}
