use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Human friendly duration used in configuration files, e.g. `{ seconds = 5 }` or
/// `{ minutes = 1, milliseconds = 500 }`. Missing units count as zero.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milliseconds: Option<u64>,
}

impl ConfigDuration {
    pub fn to_std_duration(&self) -> Duration {
        let hours = self.hours.unwrap_or(0);
        let minutes = self.minutes.unwrap_or(0);
        let seconds = self.seconds.unwrap_or(0);
        let milliseconds = self.milliseconds.unwrap_or(0);
        Duration::from_secs(hours * 60 * 60 + minutes * 60 + seconds) + Duration::from_millis(milliseconds)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self { milliseconds: Some(millis), ..Default::default() }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self { seconds: Some(secs), ..Default::default() }
    }

    pub fn is_zero(&self) -> bool {
        self.to_std_duration().is_zero()
    }
}

impl From<ConfigDuration> for Duration {
    fn from(value: ConfigDuration) -> Self {
        value.to_std_duration()
    }
}

impl From<Duration> for ConfigDuration {
    fn from(value: Duration) -> Self {
        let millis = value.as_millis() as u64;
        if millis % 1000 == 0 {
            Self::from_secs(millis / 1000)
        } else {
            Self::from_millis(millis)
        }
    }
}

impl Display for ConfigDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_std_duration())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::duration::ConfigDuration;

    #[derive(Debug, serde::Deserialize)]
    struct Timeouts {
        gossip: ConfigDuration,
        refresh: ConfigDuration,
    }

    #[test]
    fn deserialize_mixed_units() -> anyhow::Result<()> {
        let timeouts: Timeouts = toml::from_str(r#"
            gossip = { seconds = 5 }
            refresh = { minutes = 1, milliseconds = 500 }
        "#)?;
        assert_eq!(Duration::from(timeouts.gossip), Duration::from_secs(5));
        assert_eq!(timeouts.refresh.to_std_duration(), Duration::from_millis(60_500));
        Ok(())
    }

    #[test]
    fn convert_from_std_duration() {
        assert_eq!(ConfigDuration::from(Duration::from_secs(3)), ConfigDuration::from_secs(3));
        assert_eq!(ConfigDuration::from(Duration::from_millis(1500)), ConfigDuration::from_millis(1500));
        assert!(ConfigDuration::default().is_zero());
    }
}
