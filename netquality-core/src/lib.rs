//! Estimation of the quality of the network a host is connected to.
//!
//! The [`NetworkQualityEstimator`] passively derives the round trip time
//! (RTT) and the downstream throughput of the current network from the
//! timing of the requests the host performs, and remembers the estimates
//! of the last networks it was connected to.
//!
//! The crate performs no I/O and no platform specific network lookup:
//! time comes from a [`time::Clock`], the current network from a
//! [`provider::NetworkIdResolver`].

pub mod config;
pub mod defaults;
mod estimator;
pub mod network;
pub mod observation;
pub mod provider;
pub mod request;
pub mod stats;
pub mod time;

pub use self::{
    config::EstimatorConfig,
    estimator::{NetworkQualityEstimator, throughput_kbps},
    network::{ConnectionType, NetworkId, NetworkQuality},
    request::{Request, RequestInfo},
};
