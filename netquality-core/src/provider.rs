//! Collaborators injected into the estimator.

use crate::network::{ConnectionType, NetworkId};
use std::time::Duration;

/// Resolves the network the host is currently connected to.
///
/// The identity lookup (SSID, cellular operator, ...) is platform specific
/// and out of the scope of this crate.
pub trait NetworkIdResolver: Send {
    /// the connection type the host is currently using
    fn current_connection_type(&self) -> ConnectionType;

    /// The identity of the network of the given connection type.
    ///
    /// Returns an empty string if the identity is not known.
    fn identity(&self, connection_type: ConnectionType) -> String;
}

/// A [`NetworkIdResolver`] that always resolves the same network.
///
/// ```
/// # use netquality_core::{provider::{FixedNetwork, NetworkIdResolver}, network::{ConnectionType, NetworkId}};
/// let resolver = FixedNetwork::new(NetworkId::new(ConnectionType::Wifi, "home"));
///
/// assert_eq!(resolver.current_connection_type(), ConnectionType::Wifi);
/// assert_eq!(resolver.identity(ConnectionType::Wifi), "home");
/// assert_eq!(resolver.identity(ConnectionType::Cellular4G), "");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FixedNetwork(NetworkId);

impl FixedNetwork {
    pub fn new(network_id: NetworkId) -> Self {
        Self(network_id)
    }
}

impl NetworkIdResolver for FixedNetwork {
    fn current_connection_type(&self) -> ConnectionType {
        self.0.connection_type()
    }

    fn identity(&self, connection_type: ConnectionType) -> String {
        if connection_type == self.0.connection_type() {
            self.0.identity().to_owned()
        } else {
            String::new()
        }
    }
}

/// A source of network quality estimates external to the estimator
/// (e.g. a platform API).
///
/// The provider is registered with
/// [`NetworkQualityEstimator::set_external_estimate_provider`]. When it has
/// a new estimate it must get
/// [`NetworkQualityEstimator::on_updated_estimate_available`] called on the
/// estimator's owner; the estimator then pulls the values.
///
/// [`NetworkQualityEstimator::set_external_estimate_provider`]: crate::NetworkQualityEstimator::set_external_estimate_provider
/// [`NetworkQualityEstimator::on_updated_estimate_available`]: crate::NetworkQualityEstimator::on_updated_estimate_available
pub trait ExternalEstimateProvider: Send {
    /// the latest RTT estimate, if any
    fn rtt(&self) -> Option<Duration>;

    /// the latest downstream throughput estimate in kbps, if any
    fn downstream_throughput_kbps(&self) -> Option<u32>;

    /// How long ago the provider's estimate was refreshed, if known.
    ///
    /// An estimate older than the estimator's half life is not used.
    fn time_since_last_update(&self) -> Option<Duration> {
        None
    }

    /// ask the provider to refresh its estimate
    fn update(&mut self) {}
}
