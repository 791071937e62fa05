use std::time::{Duration, Instant};

use crate::error::{Result, ScrubError};

/// A token-bucket rate limiter.
///
/// Built from a spec string `"<interval>[:<burst>]"`, where `<interval>` is
/// either seconds as a float or `<a>/<b>` (seconds per unit, i.e. a rate of
/// `b/a` units per second) and `<burst>` defaults to 1.0.
///
/// The bucket never sleeps: [`TokenBucket::charge`] reports how long the
/// caller must wait before the charged cost is covered, and debits the
/// tokens regardless. Overdrawing pushes the balance negative, so repeated
/// overdraws accumulate into proportionally longer delays.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    rate: f64,
    burst: f64,
    ts_sync: Instant,
}

impl TokenBucket {
    /// Parses a rate-limit spec. `metric` only labels the error.
    pub fn from_spec(metric: &str, spec: &str) -> Result<TokenBucket> {
        let err = || ScrubError::InvalidRateSpec {
            metric: metric.to_string(),
            spec: spec.to_string(),
        };

        let (interval_part, burst_part) = match spec.rsplit_once(':') {
            Some((i, b)) => (i, Some(b)),
            None => (spec, None),
        };

        let burst = match burst_part {
            Some(b) => b.trim().parse::<f64>().map_err(|_| err())?,
            None => 1.0,
        };

        let interval = match interval_part.split_once('/') {
            Some((a, b)) => {
                let a = a.trim().parse::<f64>().map_err(|_| err())?;
                let b = b.trim().parse::<f64>().map_err(|_| err())?;
                if b == 0.0 {
                    return Err(err());
                }
                a / b
            }
            None => interval_part.trim().parse::<f64>().map_err(|_| err())?,
        };

        if !interval.is_finite() || !burst.is_finite() || interval < 0.0 || burst < 0.0 {
            return Err(err());
        }

        Ok(TokenBucket {
            tokens: burst,
            rate: 1.0 / interval,
            burst,
            ts_sync: Instant::now(),
        })
    }

    /// Charges `cost` units against the bucket and returns the delay the
    /// caller must observe before that cost is covered (zero when the
    /// balance suffices). The tokens are debited either way.
    pub fn charge(&mut self, cost: f64) -> Duration {
        self.charge_at(cost, Instant::now())
    }

    fn charge_at(&mut self, cost: f64, now: Instant) -> Duration {
        // interval 0 parses to an infinite rate: nothing ever waits.
        if self.rate.is_infinite() {
            return Duration::ZERO;
        }

        let elapsed = now.saturating_duration_since(self.ts_sync).as_secs_f64();
        self.ts_sync = now;
        self.tokens = self.burst.min(self.tokens + elapsed * self.rate);

        if self.tokens >= cost {
            self.tokens -= cost;
            Duration::ZERO
        } else {
            let delay = (cost - self.tokens) / self.rate;
            self.tokens -= cost;
            Duration::from_secs_f64(delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn bucket(spec: &str) -> TokenBucket {
        TokenBucket::from_spec("test", spec).unwrap()
    }

    #[test]
    fn test_spec_grammar() {
        let b = bucket("0.1");
        assert_eq!(b.rate, 10.0);
        assert_eq!(b.burst, 1.0);

        // 1/5 = one second per five units = 5 units/s
        let b = bucket("1/5");
        assert_eq!(b.rate, 5.0);

        let b = bucket("2:8");
        assert_eq!(b.rate, 0.5);
        assert_eq!(b.burst, 8.0);
        assert_eq!(b.tokens, 8.0);

        let b = bucket("1/5:3");
        assert_eq!(b.rate, 5.0);
        assert_eq!(b.burst, 3.0);
    }

    #[test]
    fn test_malformed_specs() {
        for spec in ["", "abc", "-1", "1:-2", "1:2:3", "1/0", "inf", "nan:1", "1/a"] {
            assert!(
                matches!(
                    TokenBucket::from_spec("scan", spec),
                    Err(ScrubError::InvalidRateSpec { .. })
                ),
                "spec {spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_burst_spends_without_delay() {
        let mut b = bucket("1:4");
        let now = Instant::now();
        for _ in 0..4 {
            assert_eq!(b.charge_at(1.0, now), Duration::ZERO);
        }
        assert!(b.charge_at(1.0, now) > Duration::ZERO);
    }

    #[test]
    fn test_overdraw_accumulates() {
        let mut b = bucket("1:1");
        let now = Instant::now();

        // burst 1, rate 1/s; cost 2 leaves the balance at -1
        let d = b.charge_at(2.0, now);
        assert!((d.as_secs_f64() - 1.0).abs() < 1e-9);

        // immediately charging again digs deeper: (1 - (-1)) / 1 = 2s
        let d = b.charge_at(1.0, now);
        assert!((d.as_secs_f64() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let mut b = bucket("1:2");
        let t0 = Instant::now();
        assert_eq!(b.charge_at(2.0, t0), Duration::ZERO);

        // A long idle period refills to burst, not beyond.
        let t1 = t0 + Duration::from_secs(100);
        assert_eq!(b.charge_at(2.0, t1), Duration::ZERO);
        assert!(b.charge_at(1.0, t1) > Duration::ZERO);
    }

    #[test]
    fn test_zero_interval_never_delays() {
        let mut b = bucket("0");
        let now = Instant::now();
        for _ in 0..100 {
            assert_eq!(b.charge_at(1000.0, now), Duration::ZERO);
        }
    }

    proptest! {
        /// A consumer that honors the returned delays can never take more
        /// than `burst + rate * elapsed` units out of the bucket.
        #[test]
        fn admitted_cost_is_bounded(
            interval in 0.01f64..2.0,
            burst in 0.1f64..8.0,
            steps in prop::collection::vec((0.0f64..1.0, 0.01f64..4.0), 1..64),
        ) {
            let spec = format!("{interval}:{burst}");
            let mut bucket = TokenBucket::from_spec("prop", &spec).unwrap();
            let rate = 1.0 / interval;

            let t0 = Instant::now();
            let mut now = t0;
            let mut delivered = 0.0;

            for (idle, cost) in steps {
                now += Duration::from_secs_f64(idle);
                let delay = bucket.charge_at(cost, now);
                prop_assert!(delay >= Duration::ZERO);
                // Sleep out the reported delay before the next charge.
                now += delay;
                delivered += cost;

                // tolerance covers Duration's nanosecond rounding
                let elapsed = (now - t0).as_secs_f64();
                prop_assert!(delivered <= burst + rate * elapsed + 1e-3);
            }
        }
    }
}
