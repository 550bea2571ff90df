//! Configuration of the [`NetworkQualityEstimator`].
//!
//! The configuration is usually derived from a flat map of variation
//! parameters (field trial parameters). The recognised keys are:
//!
//! | key | value |
//! |-----|-------|
//! | `HalfLifeSeconds` | half life of the observations, in seconds (`>= 1`) |
//! | `<Type>.DefaultMedianRTTMsec` | default RTT of the connection type, in milliseconds |
//! | `<Type>.DefaultMedianKbps` | default downstream throughput of the connection type, in kbps |
//!
//! where `<Type>` is one of the [`ConnectionType`] names (`Unknown`,
//! `Ethernet`, `WiFi`, `2G`, `3G`, `4G`, `None`, `Bluetooth`). Any other
//! key is ignored.
//!
//! [`NetworkQualityEstimator`]: crate::NetworkQualityEstimator

use crate::{
    defaults::{
        DEFAULT_HALF_LIFE, MAX_NETWORK_QUALITY_CACHE_SIZE, MIN_RTT_VARIATION_PARAMETER_MSEC,
        MIN_THROUGHPUT_VARIATION_PARAMETER_KBPS,
    },
    network::{ConnectionType, NetworkQuality},
};
use logos::{Lexer, Logos};
use std::{collections::HashMap, num::ParseIntError, time::Duration};
use thiserror::Error;
use tracing::{trace, warn};

pub const HALF_LIFE_SECONDS_PARAM: &str = "HalfLifeSeconds";
pub const DEFAULT_RTT_MSEC_SUFFIX: &str = ".DefaultMedianRTTMsec";
pub const DEFAULT_KBPS_SUFFIX: &str = ".DefaultMedianKbps";

/// Error found in the variation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The value is not an integer.
    #[error("Invalid value `{value}' for `{key}': {source}")]
    InvalidValue {
        key: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
    /// The value is an integer smaller than the accepted minimum.
    #[error("Value {value} for `{key}' is below the minimum ({minimum})")]
    BelowMinimum {
        key: String,
        value: i32,
        minimum: u32,
    },
}

/// The default [`NetworkQuality`] of every [`ConnectionType`].
///
/// The defaults seed the estimator when it starts on, or switches to, a
/// network with no cached quality. An unknown default (the [`Default`])
/// seeds nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultEstimates {
    unknown: NetworkQuality,
    ethernet: NetworkQuality,
    wifi: NetworkQuality,
    cellular_2g: NetworkQuality,
    cellular_3g: NetworkQuality,
    cellular_4g: NetworkQuality,
    none: NetworkQuality,
    bluetooth: NetworkQuality,
}

impl DefaultEstimates {
    pub fn get(&self, connection_type: ConnectionType) -> &NetworkQuality {
        match connection_type {
            ConnectionType::Unknown => &self.unknown,
            ConnectionType::Ethernet => &self.ethernet,
            ConnectionType::Wifi => &self.wifi,
            ConnectionType::Cellular2G => &self.cellular_2g,
            ConnectionType::Cellular3G => &self.cellular_3g,
            ConnectionType::Cellular4G => &self.cellular_4g,
            ConnectionType::None => &self.none,
            ConnectionType::Bluetooth => &self.bluetooth,
        }
    }

    pub fn get_mut(&mut self, connection_type: ConnectionType) -> &mut NetworkQuality {
        match connection_type {
            ConnectionType::Unknown => &mut self.unknown,
            ConnectionType::Ethernet => &mut self.ethernet,
            ConnectionType::Wifi => &mut self.wifi,
            ConnectionType::Cellular2G => &mut self.cellular_2g,
            ConnectionType::Cellular3G => &mut self.cellular_3g,
            ConnectionType::Cellular4G => &mut self.cellular_4g,
            ConnectionType::None => &mut self.none,
            ConnectionType::Bluetooth => &mut self.bluetooth,
        }
    }
}

/// Configuration of the [`NetworkQualityEstimator`].
///
/// # Default
///
/// | Setting | Default |
/// |---------|---------|
/// | half life | [`DEFAULT_HALF_LIFE`] (60s) |
/// | default estimates | none |
/// | cache capacity | [`MAX_NETWORK_QUALITY_CACHE_SIZE`] |
/// | localhost requests | ignored |
/// | small responses | ignored |
///
/// # Example
///
/// ```
/// # use netquality_core::{config::EstimatorConfig, network::ConnectionType};
/// # use std::{collections::HashMap, time::Duration};
/// let params = HashMap::from([
///     ("HalfLifeSeconds".to_owned(), "30".to_owned()),
///     ("WiFi.DefaultMedianRTTMsec".to_owned(), "40".to_owned()),
///     ("WiFi.DefaultMedianKbps".to_owned(), "3000".to_owned()),
/// ]);
/// let config = EstimatorConfig::from_variation_params(&params);
///
/// assert_eq!(config.half_life(), Duration::from_secs(30));
/// let wifi = config.default_estimates().get(ConnectionType::Wifi);
/// assert_eq!(wifi.rtt(), Some(Duration::from_millis(40)));
/// assert_eq!(wifi.downstream_kbps(), Some(3000));
/// ```
///
/// [`NetworkQualityEstimator`]: crate::NetworkQualityEstimator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatorConfig {
    half_life: Duration,
    default_estimates: DefaultEstimates,
    cache_capacity: usize,
    allow_localhost_requests: bool,
    allow_small_responses: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            half_life: DEFAULT_HALF_LIFE,
            default_estimates: DefaultEstimates::default(),
            cache_capacity: MAX_NETWORK_QUALITY_CACHE_SIZE,
            allow_localhost_requests: false,
            allow_small_responses: false,
        }
    }
}

impl EstimatorConfig {
    /// Build the configuration from the variation parameters.
    ///
    /// Invalid values are logged and ignored, the corresponding setting
    /// keeps its default.
    pub fn from_variation_params(params: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        config.apply_variation_params(params, |error| {
            warn!(%error, "Ignoring variation parameter");
        });
        config
    }

    /// Build the configuration from the variation parameters, failing on
    /// the first invalid value.
    pub fn try_from_variation_params(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut first_error = None;
        config.apply_variation_params(params, |error| {
            first_error.get_or_insert(error);
        });

        match first_error {
            Some(error) => Err(error),
            None => Ok(config),
        }
    }

    fn apply_variation_params(
        &mut self,
        params: &HashMap<String, String>,
        mut on_error: impl FnMut(ConfigError),
    ) {
        // sorted so the reported errors do not depend on the hashing
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();

        for key in keys {
            let value = &params[key];
            let Some(param) = VariationParam::parse(key) else {
                trace!(key, "Unrecognised variation parameter");
                continue;
            };

            match param {
                VariationParam::HalfLifeSeconds => {
                    match parse_at_least(key, value, 1) {
                        Ok(secs) => self.half_life = Duration::from_secs(u64::from(secs)),
                        Err(error) => on_error(error),
                    }
                }
                VariationParam::DefaultRttMsec(connection_type) => {
                    match parse_at_least(key, value, MIN_RTT_VARIATION_PARAMETER_MSEC) {
                        Ok(msec) => {
                            let slot = self.default_estimates.get_mut(connection_type);
                            *slot = slot.with_rtt(Duration::from_millis(u64::from(msec)));
                        }
                        Err(error) => on_error(error),
                    }
                }
                VariationParam::DefaultKbps(connection_type) => {
                    match parse_at_least(key, value, MIN_THROUGHPUT_VARIATION_PARAMETER_KBPS) {
                        Ok(kbps) => {
                            let slot = self.default_estimates.get_mut(connection_type);
                            *slot = slot.with_downstream_kbps(kbps);
                        }
                        Err(error) => on_error(error),
                    }
                }
            }
        }
    }

    /// Set the half life of the observations.
    ///
    /// A zero half life is replaced by one second.
    pub fn with_half_life(mut self, half_life: Duration) -> Self {
        self.half_life = half_life.max(Duration::from_secs(1));
        self
    }

    /// Set the default estimate of a connection type.
    pub fn with_default_estimate(
        mut self,
        connection_type: ConnectionType,
        quality: NetworkQuality,
    ) -> Self {
        *self.default_estimates.get_mut(connection_type) = quality;
        self
    }

    /// Set how many networks are remembered.
    ///
    /// Clamped to `1..=MAX_NETWORK_QUALITY_CACHE_SIZE`.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.clamp(1, MAX_NETWORK_QUALITY_CACHE_SIZE);
        self
    }

    /// Accept observations from requests to the local machine.
    ///
    /// Only meant for tests, local requests do not tell anything about the
    /// network.
    pub fn allow_localhost_requests(mut self, allow: bool) -> Self {
        self.allow_localhost_requests = allow;
        self
    }

    /// Accept throughput observations from tiny or very short transfers.
    ///
    /// Only meant for tests.
    pub fn allow_small_responses(mut self, allow: bool) -> Self {
        self.allow_small_responses = allow;
        self
    }

    #[inline]
    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    #[inline]
    pub fn default_estimates(&self) -> &DefaultEstimates {
        &self.default_estimates
    }

    #[inline]
    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    #[inline]
    pub fn localhost_requests_allowed(&self) -> bool {
        self.allow_localhost_requests
    }

    #[inline]
    pub fn small_responses_allowed(&self) -> bool {
        self.allow_small_responses
    }
}

fn parse_at_least(key: &str, value: &str, minimum: u32) -> Result<u32, ConfigError> {
    let parsed: i32 = value.parse().map_err(|source| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
        source,
    })?;

    match u32::try_from(parsed) {
        Ok(parsed) if parsed >= minimum => Ok(parsed),
        _ => Err(ConfigError::BelowMinimum {
            key: key.to_owned(),
            value: parsed,
            minimum,
        }),
    }
}

/// A recognised variation parameter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariationParam {
    HalfLifeSeconds,
    DefaultRttMsec(ConnectionType),
    DefaultKbps(ConnectionType),
}

#[derive(Logos, Debug, PartialEq)]
enum KeyToken {
    #[token("HalfLifeSeconds")]
    HalfLifeSeconds,

    #[token("Unknown", |_| ConnectionType::Unknown)]
    #[token("Ethernet", |_| ConnectionType::Ethernet)]
    #[token("WiFi", |_| ConnectionType::Wifi)]
    #[token("2G", |_| ConnectionType::Cellular2G)]
    #[token("3G", |_| ConnectionType::Cellular3G)]
    #[token("4G", |_| ConnectionType::Cellular4G)]
    #[token("None", |_| ConnectionType::None)]
    #[token("Bluetooth", |_| ConnectionType::Bluetooth)]
    ConnectionType(ConnectionType),

    #[token(".DefaultMedianRTTMsec")]
    DefaultRttMsec,
    #[token(".DefaultMedianKbps")]
    DefaultKbps,
}

impl VariationParam {
    fn parse(key: &str) -> Option<Self> {
        let mut lex = Lexer::<'_, KeyToken>::new(key);

        let param = match lex.next()?.ok()? {
            KeyToken::HalfLifeSeconds => Self::HalfLifeSeconds,
            KeyToken::ConnectionType(connection_type) => match lex.next()?.ok()? {
                KeyToken::DefaultRttMsec => Self::DefaultRttMsec(connection_type),
                KeyToken::DefaultKbps => Self::DefaultKbps(connection_type),
                KeyToken::HalfLifeSeconds | KeyToken::ConnectionType(_) => return None,
            },
            KeyToken::DefaultRttMsec | KeyToken::DefaultKbps => return None,
        };

        // the whole key must be consumed
        lex.next().is_none().then_some(param)
    }
}
