mod buffer;

pub use self::buffer::ObservationBuffer;
use std::time::Instant;

/// One timestamped sample feeding the estimator.
///
/// The value is a milliseconds RTT or a kbps throughput depending on the
/// [`ObservationBuffer`] it is added to. An [`Observation`] is never
/// modified once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    value: u32,
    timestamp: Instant,
}

impl Observation {
    #[inline]
    pub const fn new(value: u32, timestamp: Instant) -> Self {
        Self { value, timestamp }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// when the observation was taken
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

/// An [`Observation`] value with its decayed weight.
///
/// Only lives for the duration of a percentile computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WeightedObservation {
    pub(crate) value: u32,
    pub(crate) weight: f64,
}
