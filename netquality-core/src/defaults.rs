use std::time::Duration;

/// Default half life of an observation
///
/// Every half life, the weight of all observations reduces by half.
/// Lowering the half life reduces the weight of older values faster.
///
/// ```
/// # use netquality_core::defaults::*;
/// # use std::time::Duration;
/// assert_eq!(DEFAULT_HALF_LIFE, Duration::from_secs(60));
/// ```
pub const DEFAULT_HALF_LIFE: Duration = Duration::from_secs(60);

/// Maximum number of observations held by an [`ObservationBuffer`].
///
/// Once full, the oldest observation is evicted for every new one.
///
/// [`ObservationBuffer`]: crate::observation::ObservationBuffer
pub const MAX_OBSERVATION_BUFFER_SIZE: usize = 300;

/// Maximum number of networks remembered by the [`NetworkQualityCache`].
///
/// The oldest entry is found with a linear scan, keep this value small.
///
/// [`NetworkQualityCache`]: crate::network::NetworkQualityCache
pub const MAX_NETWORK_QUALITY_CACHE_SIZE: usize = 10;

/// Transfers smaller than this are too noisy to produce a throughput
/// observation.
pub const MIN_TRANSFER_SIZE_IN_BYTES: u64 = 10_000;

/// Transfers shorter than this are too noisy to produce a throughput
/// observation.
pub const MIN_REQUEST_DURATION: Duration = Duration::from_millis(1);

/// Smallest default RTT (in milliseconds) accepted from the variation
/// parameters.
pub const MIN_RTT_VARIATION_PARAMETER_MSEC: u32 = 1;

/// Smallest default throughput (in kbps) accepted from the variation
/// parameters.
pub const MIN_THROUGHPUT_VARIATION_PARAMETER_KBPS: u32 = 1;

/// Upper bound of a throughput observation, in kbps.
///
/// Computed throughputs above this value (roughly 2000 Gbps) are clamped.
pub const MAX_THROUGHPUT_KBPS: u32 = i32::MAX as u32;

/// Number of times the current network is re-resolved when the connection
/// type keeps changing while its identity is being looked up.
pub const MAX_NETWORK_ID_RESOLUTION_ATTEMPTS: usize = 3;
