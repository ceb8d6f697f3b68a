use std::time::Duration;

pub trait DurationExt {
    fn millis(self) -> Duration;

    fn seconds(self) -> Duration;
}

impl DurationExt for u64 {
    fn millis(self) -> Duration {
        Duration::from_millis(self)
    }

    fn seconds(self) -> Duration {
        Duration::from_secs(self)
    }
}

pub trait JitterExt {
    /// Scales the duration by `1 + spread * jitter`, `spread` is expected to be in `[-1.0, 1.0]`.
    fn jittered(self, jitter: f64, spread: f64) -> Duration;

    fn at_most(self, max: Duration) -> Duration;
}

impl JitterExt for Duration {
    fn jittered(self, jitter: f64, spread: f64) -> Duration {
        let factor = 1.0 + jitter * spread.clamp(-1.0, 1.0);
        let jittered = self.mul_f64(factor.max(0.0));
        if jittered.is_zero() {
            Duration::from_nanos(1)
        } else {
            jittered
        }
    }

    fn at_most(self, max: Duration) -> Duration {
        if self > max {
            max
        } else {
            self
        }
    }
}
