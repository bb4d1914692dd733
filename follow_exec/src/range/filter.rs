//! Spike rejecting range filter

use comms_if::eqpt::range::RangeReading;

use super::RangeParams;

/// Spike rejection filter for raw range samples.
///
/// A sample within `spike_threshold_cm` of the last accepted value is accepted. Otherwise the last
/// accepted value is held, until `timeout_s` has passed since it was accepted, after which the new
/// sample is force-accepted. Outputs are rounded to 0.1 cm.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    spike_threshold_cm: f64,
    timeout_s: f64,

    last_accepted_cm: f64,
    last_accepted_s: f64,
}

impl RangeFilter {
    /// Create a new filter, which starts out holding the sensor's maximum distance.
    pub fn new(params: &RangeParams, now_s: f64) -> Self {
        Self {
            spike_threshold_cm: params.spike_threshold_cm,
            timeout_s: params.timeout_s,
            last_accepted_cm: params.max_distance_cm,
            last_accepted_s: now_s,
        }
    }

    /// Feed a raw sample taken at `now_s` and return the filtered reading.
    pub fn update(&mut self, raw_cm: f64, now_s: f64) -> RangeReading {
        let within = (raw_cm - self.last_accepted_cm).abs() <= self.spike_threshold_cm;
        let expired = now_s - self.last_accepted_s > self.timeout_s;

        if within || expired {
            self.last_accepted_cm = raw_cm;
            self.last_accepted_s = now_s;
        }

        self.last()
    }

    /// The last accepted value.
    pub fn last(&self) -> RangeReading {
        RangeReading::new(round_tenth(self.last_accepted_cm))
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod test {
    use super::*;

    fn filter() -> RangeFilter {
        // Threshold 20 cm, timeout 0.3 s, starts at 200 cm
        RangeFilter::new(&RangeParams::default(), 0.0)
    }

    #[test]
    fn test_same_reading_twice() {
        let mut f = filter();
        f.update(87.34, 1.0);
        assert_eq!(f.update(87.34, 1.1).distance_cm, 87.3);
        assert_eq!(f.update(87.34, 1.2).distance_cm, 87.3);
    }

    #[test]
    fn test_initial_hold() {
        let mut f = filter();
        // Far from the initial 200 cm and inside the timeout, so held
        assert_eq!(f.update(50.0, 0.1).distance_cm, 200.0);
        // Timeout since construction has passed, so accepted
        assert_eq!(f.update(50.0, 0.5).distance_cm, 50.0);
    }

    #[test]
    fn test_spike_rejection() {
        let mut f = filter();
        assert_eq!(f.update(50.0, 1.0).distance_cm, 50.0);
        assert_eq!(f.update(55.0, 1.1).distance_cm, 55.0);

        // Two consecutive spikes are held at the last accepted value
        assert_eq!(f.update(120.0, 1.2).distance_cm, 55.0);
        assert_eq!(f.update(121.0, 1.3).distance_cm, 55.0);

        // Once the timeout since the last accept (1.1 s) elapses the spike is accepted
        assert_eq!(f.update(120.0, 1.45).distance_cm, 120.0);
        assert_eq!(f.last().distance_cm, 120.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut f = filter();
        f.update(50.0, 1.0);
        assert_eq!(f.update(70.0, 1.05).distance_cm, 70.0);
        assert_eq!(f.update(90.5, 1.1).distance_cm, 70.0);
    }
}
