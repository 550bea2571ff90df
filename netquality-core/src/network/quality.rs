use std::{
    fmt,
    time::{Duration, Instant},
};

/// A point in time estimate of the quality of a network.
///
/// Either part may be unknown. Internally the unknown values are
/// represented with the sentinels [`NetworkQuality::INVALID_RTT`] and
/// [`NetworkQuality::INVALID_THROUGHPUT`], the accessors expose them as
/// `None` so they are never mistaken for a zero measurement.
///
/// # Default
///
/// The [`Default`] network quality is entirely unknown.
///
/// ```
/// # use netquality_core::network::NetworkQuality;
/// # use std::time::Duration;
/// let quality = NetworkQuality::default();
/// assert_eq!(quality.rtt(), None);
/// assert_eq!(quality.downstream_kbps(), None);
///
/// let quality = NetworkQuality::new(Some(Duration::from_millis(50)), Some(500));
/// assert_eq!(quality.rtt(), Some(Duration::from_millis(50)));
/// assert_eq!(quality.downstream_kbps(), Some(500));
/// assert_eq!(quality.to_string(), "rtt=50ms, downstream=500kbps");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkQuality {
    rtt: Duration,
    downstream_kbps: u32,
}

impl NetworkQuality {
    /// the RTT of a network whose RTT is not known
    pub const INVALID_RTT: Duration = Duration::MAX;

    /// the throughput of a network whose throughput is not known
    ///
    /// A measured throughput is always at least `1` kbps.
    pub const INVALID_THROUGHPUT: u32 = 0;

    /// The network quality with nothing known.
    pub const UNKNOWN: Self = Self {
        rtt: Self::INVALID_RTT,
        downstream_kbps: Self::INVALID_THROUGHPUT,
    };

    pub fn new(rtt: Option<Duration>, downstream_kbps: Option<u32>) -> Self {
        Self {
            rtt: rtt.unwrap_or(Self::INVALID_RTT),
            downstream_kbps: downstream_kbps.unwrap_or(Self::INVALID_THROUGHPUT),
        }
    }

    #[inline]
    pub fn rtt(&self) -> Option<Duration> {
        (self.rtt != Self::INVALID_RTT).then_some(self.rtt)
    }

    #[inline]
    pub fn downstream_kbps(&self) -> Option<u32> {
        (self.downstream_kbps != Self::INVALID_THROUGHPUT).then_some(self.downstream_kbps)
    }

    /// `true` if both the RTT and the throughput are known
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.rtt().is_some() && self.downstream_kbps().is_some()
    }

    /// Returns the quality with the RTT replaced.
    #[must_use = "function does not modify the current value"]
    pub fn with_rtt(self, rtt: Duration) -> Self {
        Self { rtt, ..self }
    }

    /// Returns the quality with the downstream throughput replaced.
    #[must_use = "function does not modify the current value"]
    pub fn with_downstream_kbps(self, downstream_kbps: u32) -> Self {
        Self {
            downstream_kbps,
            ..self
        }
    }
}

impl Default for NetworkQuality {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rtt() {
            Some(rtt) => write!(f, "rtt={rtt:?}")?,
            None => write!(f, "rtt=?")?,
        }
        match self.downstream_kbps() {
            Some(kbps) => write!(f, ", downstream={kbps}kbps"),
            None => write!(f, ", downstream=?"),
        }
    }
}

/// A [`NetworkQuality`] remembered for a network with the time it was
/// last updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedNetworkQuality {
    last_update_time: Instant,
    quality: NetworkQuality,
}

impl CachedNetworkQuality {
    pub fn new(last_update_time: Instant, quality: NetworkQuality) -> Self {
        Self {
            last_update_time,
            quality,
        }
    }

    #[inline]
    pub fn last_update_time(&self) -> Instant {
        self.last_update_time
    }

    #[inline]
    pub fn quality(&self) -> &NetworkQuality {
        &self.quality
    }

    /// `true` if `self` was updated strictly before `other`
    #[inline]
    pub fn older_than(&self, other: &Self) -> bool {
        self.last_update_time < other.last_update_time
    }
}
