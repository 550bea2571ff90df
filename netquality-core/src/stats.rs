//! Observability types of the estimator.
//!
//! The estimator does not emit metrics itself. It hands
//! [`NetworkQualityReport`]s and accuracy samples to an optional
//! [`QualityObserver`] at well defined points.

use crate::network::{ConnectionType, NetworkId, NetworkQuality};
use std::time::Duration;

/// The RTT percentiles reported when leaving a network.
pub const REPORTED_RTT_PERCENTILES: [u8; 5] = [0, 10, 50, 90, 100];

/// Snapshot of a network at the time the host left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkQualityReport {
    /// The network being left.
    pub network_id: NetworkId,
    /// Best RTT and best throughput seen on the network.
    pub peak: NetworkQuality,
    /// RTT at each of the [`REPORTED_RTT_PERCENTILES`], `None` if there
    /// was no RTT observation.
    pub rtt_percentiles: Option<[Duration; REPORTED_RTT_PERCENTILES.len()]>,
}

impl NetworkQualityReport {
    /// the RTT at the given reported percentile
    pub fn rtt_percentile(&self, percentile: u8) -> Option<Duration> {
        let index = REPORTED_RTT_PERCENTILES
            .iter()
            .position(|p| *p == percentile)?;
        self.rtt_percentiles.map(|rtts| rtts[index])
    }
}

/// Sink for the estimator's observability data.
///
/// All methods default to doing nothing.
pub trait QualityObserver: Send {
    /// called once per network change, before the estimates of the network
    /// being left are cached and cleared.
    fn network_changed(&mut self, report: &NetworkQualityReport) {
        let _ = report;
    }

    /// called for every RTT observation made while a median RTT estimate
    /// was known.
    fn rtt_accuracy(&mut self, connection_type: ConnectionType, estimated: Duration, observed: Duration) {
        let _ = (connection_type, estimated, observed);
    }
}
