use crate::{
    defaults::MAX_OBSERVATION_BUFFER_SIZE,
    observation::{Observation, WeightedObservation},
};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// A bounded, time ordered, collection of [`Observation`]s.
///
/// The buffer holds at most [`MAX_OBSERVATION_BUFFER_SIZE`] observations,
/// adding a new observation to a full buffer evicts the oldest one.
///
/// # Weighted percentile
///
/// The buffer answers percentile queries where every observation is
/// weighted by its age: every `half_life` the weight of an observation is
/// halved. Recent observations dominate the result without the history
/// being discarded outright, and a single outlier cannot move the median
/// far.
///
/// ```
/// # use netquality_core::observation::ObservationBuffer;
/// # use std::time::{Duration, Instant};
/// let now = Instant::now();
/// let mut buffer = ObservationBuffer::new(Duration::from_secs(60));
///
/// buffer.add_observation(100, now);
/// buffer.add_observation(200, now);
/// buffer.add_observation(300, now);
///
/// assert_eq!(buffer.percentile(Some(now), 50, now), Some(200));
/// ```
#[derive(Debug, Clone)]
pub struct ObservationBuffer {
    observations: VecDeque<Observation>,

    /// factor applied to the weight of an observation for every second
    /// of its age. Always in `(0, 1]`.
    decay_per_second: f64,
}

impl ObservationBuffer {
    /// create an empty buffer whose observations lose half their weight
    /// every `half_life`.
    ///
    /// `decay_per_second = exp(ln(0.5) / half_life)`
    pub fn new(half_life: Duration) -> Self {
        debug_assert!(!half_life.is_zero(), "half life must be positive");
        let half_life_secs = half_life.as_secs_f64().max(0.001);
        let decay_per_second = f64::exp(0.5_f64.ln() / half_life_secs);

        Self {
            observations: VecDeque::with_capacity(MAX_OBSERVATION_BUFFER_SIZE),
            decay_per_second,
        }
    }

    /// the weight multiplier applied for every second of age
    #[inline]
    pub fn decay_per_second(&self) -> f64 {
        self.decay_per_second
    }

    /// Append a new observation, evicting the oldest one if the buffer is
    /// already full.
    pub fn add_observation(&mut self, value: u32, timestamp: Instant) {
        debug_assert!(self.observations.len() <= MAX_OBSERVATION_BUFFER_SIZE);

        if self.observations.len() == MAX_OBSERVATION_BUFFER_SIZE {
            self.observations.pop_front();
        }
        self.observations
            .push_back(Observation::new(value, timestamp));
    }

    /// remove all the observations
    pub fn clear(&mut self) {
        self.observations.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// iterate the observations from the oldest to the most recent
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    /// Weight of `observation` at time `now`.
    ///
    /// The age is truncated to whole seconds, an observation younger than
    /// one second has the full weight of `1.0`. The weight never drops
    /// below [`f64::MIN_POSITIVE`] so that very old observations still
    /// count when nothing else is available.
    pub fn weight(&self, observation: &Observation, now: Instant) -> f64 {
        let age = now.saturating_duration_since(observation.timestamp());
        let weight = self.decay_per_second.powf(age.as_secs() as f64);

        weight.clamp(f64::MIN_POSITIVE, 1.0)
    }

    /// Returns the weighted `percentile` of the observations taken at or
    /// after `begin`.
    ///
    /// * `begin`: `None` to consider the whole buffer;
    /// * `percentile`: in `0..=100`, larger values are clamped to `100`;
    /// * `now`: the time at which the weights are evaluated.
    ///
    /// Returns `None` if no observation was taken at or after `begin`.
    pub fn percentile(&self, begin: Option<Instant>, percentile: u8, now: Instant) -> Option<u32> {
        debug_assert!(percentile <= 100, "invalid percentile {percentile}");
        let percentile = percentile.min(100);

        let (weighted, total_weight) = self.weighted_observations(begin, now);
        let last = weighted.last()?;

        debug_assert!(total_weight > 0.0);
        debug_assert!(weighted.len() <= self.observations.len());

        let desired_weight = f64::from(percentile) / 100.0 * total_weight;

        let mut cumulative_weight = 0.0;
        for observation in weighted.iter() {
            cumulative_weight += observation.weight;

            if cumulative_weight >= desired_weight {
                return Some(observation.value);
            }
        }

        // floating point errors may leave the desired weight slightly above
        // the total weight when `percentile` is (close to) 100. The answer
        // is then the largest value.
        Some(last.value)
    }

    /// Collect the observations taken at or after `begin` with their weight,
    /// sorted by value in ascending order. Also returns the sum of the
    /// weights.
    fn weighted_observations(
        &self,
        begin: Option<Instant>,
        now: Instant,
    ) -> (Vec<WeightedObservation>, f64) {
        let mut total_weight = 0.0;

        let mut weighted: Vec<WeightedObservation> = self
            .observations
            .iter()
            .filter(|observation| begin.is_none_or(|begin| observation.timestamp() >= begin))
            .map(|observation| {
                let weight = self.weight(observation, now);
                total_weight += weight;
                WeightedObservation {
                    value: observation.value(),
                    weight,
                }
            })
            .collect();

        weighted.sort_by_key(|observation| observation.value);

        (weighted, total_weight)
    }
}
