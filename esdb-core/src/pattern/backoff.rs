use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::duration::ConfigDuration;
use crate::error::{Error, Result};
use crate::ext::duration_ext::JitterExt;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BackoffSettings {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl BackoffSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial > Duration::ZERO) {
            return Err(Error::InvalidSettings("backoff initial must be > 0".to_string()));
        }
        if !(self.max >= self.initial) {
            return Err(Error::InvalidSettings(format!(
                "backoff max {:?} must be >= initial {:?}",
                self.max,
                self.initial,
            )));
        }
        if !(self.multiplier > 1.0) {
            return Err(Error::InvalidSettings("backoff multiplier must be > 1.0".to_string()));
        }
        if !(self.jitter >= 0.0 && self.jitter < 1.0) {
            return Err(Error::InvalidSettings("backoff jitter must be in [0.0, 1.0)".to_string()));
        }
        Ok(())
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            multiplier: 1.6,
            jitter: 0.2,
        }
    }
}

/// Serialized form of [`BackoffSettings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial: ConfigDuration,
    pub max: ConfigDuration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl From<&BackoffConfig> for BackoffSettings {
    fn from(value: &BackoffConfig) -> Self {
        Self {
            initial: value.initial.to_std_duration(),
            max: value.max.to_std_duration(),
            multiplier: value.multiplier,
            jitter: value.jitter,
        }
    }
}

/// Jittered exponential backoff for a single retry loop.
///
/// The nominal delay starts at `initial` and is multiplied by `multiplier` on every
/// call, capped at `max`. Jitter is applied to the returned value only, so it never
/// compounds: every value lies in `nominal * [1 - jitter, 1 + jitter]`.
#[derive(Debug)]
pub struct BackoffPolicy {
    settings: BackoffSettings,
    nominal: Option<Duration>,
    rng: StdRng,
}

impl BackoffPolicy {
    pub fn new(settings: BackoffSettings) -> Self {
        Self {
            settings,
            nominal: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn next_backoff(&mut self) -> Duration {
        let BackoffSettings { initial, max, multiplier, jitter } = self.settings;
        let nominal = match self.nominal {
            None => initial,
            Some(previous) => previous.mul_f64(multiplier).at_most(max),
        };
        self.nominal = Some(nominal);
        let spread = self.rng.gen_range(-1.0..=1.0);
        nominal.jittered(jitter, spread)
    }

    /// Starts over from `initial`, used once the loop succeeded.
    pub fn reset(&mut self) {
        self.nominal = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::ext::duration_ext::DurationExt;
    use crate::pattern::backoff::{BackoffPolicy, BackoffSettings};

    fn settings() -> BackoffSettings {
        BackoffSettings {
            initial: 1.seconds(),
            max: 60.seconds(),
            multiplier: 1.6,
            jitter: 0.2,
        }
    }

    #[test]
    fn first_backoff_is_initial_with_jitter() {
        for _ in 0..1000 {
            let mut backoff = BackoffPolicy::new(settings());
            let first = backoff.next_backoff();
            assert!(first >= 800.millis() && first <= 1200.millis(), "{:?}", first);
        }
    }

    #[test]
    fn backoff_never_exceeds_jittered_max() {
        let max = 60.seconds().mul_f64(1.2);
        let mut backoff = BackoffPolicy::new(settings());
        for _ in 0..200 {
            let next = backoff.next_backoff();
            assert!(next <= max, "{:?}", next);
            assert!(next > Duration::ZERO);
        }
    }

    #[test]
    fn nominal_grows_exponentially_until_capped() {
        let mut backoff = BackoffPolicy::new(BackoffSettings { jitter: 0.0, ..settings() });
        let delays = (0..12).map(|_| backoff.next_backoff()).collect::<Vec<_>>();
        assert_eq!(delays[0], 1.seconds());
        assert!(delays[1] > 1590.millis() && delays[1] < 1610.millis());
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(*delays.last().unwrap(), 60.seconds());
    }

    #[test]
    fn reset_starts_from_initial() {
        let mut backoff = BackoffPolicy::new(BackoffSettings { jitter: 0.0, ..settings() });
        for _ in 0..5 {
            backoff.next_backoff();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff(), 1.seconds());
    }

    #[test]
    fn reject_invalid_settings() {
        assert!(settings().validate().is_ok());
        assert!(BackoffSettings { initial: Duration::ZERO, ..settings() }.validate().is_err());
        assert!(BackoffSettings { max: 500.millis(), ..settings() }.validate().is_err());
        assert!(BackoffSettings { multiplier: 1.0, ..settings() }.validate().is_err());
        assert!(BackoffSettings { jitter: 1.0, ..settings() }.validate().is_err());
    }
}
