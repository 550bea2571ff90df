use crate::{
    config::{DefaultEstimates, EstimatorConfig},
    defaults::{
        MAX_NETWORK_ID_RESOLUTION_ATTEMPTS, MAX_THROUGHPUT_KBPS, MIN_REQUEST_DURATION,
        MIN_TRANSFER_SIZE_IN_BYTES,
    },
    network::{CachedNetworkQuality, ConnectionType, NetworkId, NetworkQuality, NetworkQualityCache},
    observation::ObservationBuffer,
    provider::{ExternalEstimateProvider, NetworkIdResolver},
    request::{Request, is_http_or_https, is_localhost},
    stats::{NetworkQualityReport, QualityObserver, REPORTED_RTT_PERCENTILES},
    time::{Clock, SystemClock},
};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Estimates the quality of the current network from the requests the
/// host performs.
///
/// The estimator does not perform any request itself. The host reports
/// the timing of its own requests:
///
/// * [`notify_headers_received`] produces an RTT observation, the time
///   between sending the request and receiving the response headers;
/// * [`notify_request_completed`] produces a downstream throughput
///   observation from the bytes received and the transfer duration.
///
/// Queries ([`rtt_estimate`], [`downlink_throughput_kbps_estimate`], ...)
/// answer from the weighted median of the observations, where older
/// observations weigh less (see [`ObservationBuffer`]).
///
/// # Network changes
///
/// On [`on_connection_type_changed`] the estimates of the network being
/// left are cached (if the network has an identity), the observations are
/// cleared, and the estimator is seeded with the cached estimate of the
/// new network, or else with the configured default of its connection
/// type.
///
/// # Concurrency
///
/// The estimator has a single owner and no internal synchronisation. A
/// host that needs to report requests from several threads must funnel
/// the calls to the owner (see the `netquality` crate's
/// `EstimatorContext`) or wrap the estimator in a mutex.
///
/// # Example
///
/// ```
/// use netquality_core::{
///     config::EstimatorConfig,
///     network::{ConnectionType, NetworkId},
///     provider::FixedNetwork,
///     request::RequestInfo,
///     time::{Clock as _, ManualClock},
///     NetworkQualityEstimator,
/// };
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let resolver = FixedNetwork::new(NetworkId::new(ConnectionType::Wifi, "home"));
/// let mut estimator =
///     NetworkQualityEstimator::with_clock(EstimatorConfig::default(), resolver, clock.clone());
///
/// assert_eq!(estimator.rtt_estimate(), None);
///
/// let t0 = clock.now();
/// clock.advance(Duration::from_millis(120));
/// let request = RequestInfo::builder("https://example.com/", t0)
///     .send_start_time(t0)
///     .headers_received_time(clock.now())
///     .response_time(clock.now())
///     .build();
/// estimator.notify_headers_received(&request);
///
/// assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(120)));
/// ```
///
/// [`notify_headers_received`]: Self::notify_headers_received
/// [`notify_request_completed`]: Self::notify_request_completed
/// [`rtt_estimate`]: Self::rtt_estimate
/// [`downlink_throughput_kbps_estimate`]: Self::downlink_throughput_kbps_estimate
/// [`on_connection_type_changed`]: Self::on_connection_type_changed
pub struct NetworkQualityEstimator<C = SystemClock> {
    clock: C,

    resolver: Box<dyn NetworkIdResolver>,
    external_estimate_provider: Option<Box<dyn ExternalEstimateProvider>>,
    observer: Option<Box<dyn QualityObserver>>,

    allow_localhost_requests: bool,
    allow_small_responses: bool,
    default_estimates: DefaultEstimates,

    current_network_id: NetworkId,

    /// external estimates older than this are ignored
    half_life: Duration,

    /// RTT observations, in milliseconds
    rtt_observations: ObservationBuffer,
    /// downstream throughput observations, in kbps
    throughput_observations: ObservationBuffer,

    /// the best RTT and throughput seen since the last network change
    peak_quality: NetworkQuality,

    /// requests created before this time belong to a previous network
    last_network_change: Instant,

    cache: NetworkQualityCache,

    /// median quality as of the last main frame request
    estimated_median_quality: NetworkQuality,
}

/// Reason a request does not produce any observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ignored {
    InvalidUrl,
    NotHttp,
    Localhost,
    NoResponse,
    Cached,
    PreviousNetwork,
}

impl NetworkQualityEstimator<SystemClock> {
    /// create an estimator using the system's monotonic clock
    pub fn new<R>(config: EstimatorConfig, resolver: R) -> Self
    where
        R: NetworkIdResolver + 'static,
    {
        Self::with_clock(config, resolver, SystemClock)
    }
}

impl<C> NetworkQualityEstimator<C>
where
    C: Clock,
{
    /// Create an estimator driven by the given `clock`.
    ///
    /// The current network is resolved immediately and the observations
    /// are seeded with the default estimate of its connection type.
    pub fn with_clock<R>(config: EstimatorConfig, resolver: R, clock: C) -> Self
    where
        R: NetworkIdResolver + 'static,
    {
        let now = clock.now();
        let half_life = config.half_life();

        let mut estimator = Self {
            clock,
            resolver: Box::new(resolver),
            external_estimate_provider: None,
            observer: None,
            allow_localhost_requests: config.localhost_requests_allowed(),
            allow_small_responses: config.small_responses_allowed(),
            default_estimates: *config.default_estimates(),
            current_network_id: NetworkId::anonymous(ConnectionType::Unknown),
            half_life,
            rtt_observations: ObservationBuffer::new(half_life),
            throughput_observations: ObservationBuffer::new(half_life),
            peak_quality: NetworkQuality::UNKNOWN,
            last_network_change: now,
            cache: NetworkQualityCache::with_capacity(config.cache_capacity()),
            estimated_median_quality: NetworkQuality::UNKNOWN,
        };

        estimator.current_network_id = estimator.resolve_current_network_id();
        estimator.add_default_estimates(now);

        debug!(network = %estimator.current_network_id, ?half_life, "Network quality estimator started");

        estimator
    }

    /// Register the provider of external estimates.
    ///
    /// Returns the previously registered provider.
    pub fn set_external_estimate_provider(
        &mut self,
        provider: Box<dyn ExternalEstimateProvider>,
    ) -> Option<Box<dyn ExternalEstimateProvider>> {
        self.external_estimate_provider.replace(provider)
    }

    /// Unregister the provider of external estimates.
    pub fn take_external_estimate_provider(&mut self) -> Option<Box<dyn ExternalEstimateProvider>> {
        self.external_estimate_provider.take()
    }

    /// Register the observability sink.
    ///
    /// Returns the previously registered observer.
    pub fn set_observer(
        &mut self,
        observer: Box<dyn QualityObserver>,
    ) -> Option<Box<dyn QualityObserver>> {
        self.observer.replace(observer)
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn QualityObserver>> {
        self.observer.take()
    }

    #[inline]
    pub fn current_network_id(&self) -> &NetworkId {
        &self.current_network_id
    }

    /// best RTT and throughput observed since the last network change
    #[inline]
    pub fn peak_quality(&self) -> &NetworkQuality {
        &self.peak_quality
    }

    /// median quality as of the last main frame request of this network
    #[inline]
    pub fn estimated_median_quality(&self) -> &NetworkQuality {
        &self.estimated_median_quality
    }

    #[inline]
    pub fn last_network_change(&self) -> Instant {
        self.last_network_change
    }

    #[inline]
    pub fn cache(&self) -> &NetworkQualityCache {
        &self.cache
    }

    #[inline]
    pub fn rtt_observations(&self) -> &ObservationBuffer {
        &self.rtt_observations
    }

    #[inline]
    pub fn throughput_observations(&self) -> &ObservationBuffer {
        &self.throughput_observations
    }

    /// `true` if the request can produce observations of the current
    /// network.
    ///
    /// The request must be an HTTP(S) request to a remote host, with a
    /// response that came from the network (not from the cache), and it
    /// must have been created after the last network change.
    pub fn request_provides_useful_observations<R>(&self, request: &R) -> bool
    where
        R: Request + ?Sized,
    {
        self.check_request(request).is_ok()
    }

    fn check_request<R>(&self, request: &R) -> Result<(), Ignored>
    where
        R: Request + ?Sized,
    {
        let Some(url) = request.url() else {
            return Err(Ignored::InvalidUrl);
        };
        if !self.allow_localhost_requests && is_localhost(url) {
            return Err(Ignored::Localhost);
        }
        if !is_http_or_https(url) {
            return Err(Ignored::NotHttp);
        }
        if !request.response_headers_present() || request.response_time().is_none() {
            return Err(Ignored::NoResponse);
        }
        if request.was_served_from_cache() {
            return Err(Ignored::Cached);
        }
        if request.creation_time() < self.last_network_change {
            return Err(Ignored::PreviousNetwork);
        }
        Ok(())
    }

    /// Report that the response headers of `request` were received.
    ///
    /// Adds an RTT observation: the time between the start of the sending
    /// of the request and the reception of the headers.
    pub fn notify_headers_received<R>(&mut self, request: &R)
    where
        R: Request + ?Sized,
    {
        if let Err(reason) = self.check_request(request) {
            trace!(?reason, method = request.method(), "Request ignored for RTT");
            return;
        }
        let now = self.clock.now();

        if request.is_main_frame() {
            self.estimated_median_quality = NetworkQuality::new(
                self.rtt_percentile(None, 50, now),
                self.throughput_percentile(None, 50, now),
            );
        }

        let (Some(send_start), Some(headers_received)) =
            (request.send_start_time(), request.headers_received_time())
        else {
            // the request did not go over the network
            return;
        };

        debug_assert!(headers_received >= send_start);
        let observed_rtt = headers_received.saturating_duration_since(send_start);

        if self.peak_quality.rtt().is_none_or(|peak| observed_rtt < peak) {
            self.peak_quality = self.peak_quality.with_rtt(observed_rtt);
        }

        self.rtt_observations
            .add_observation(duration_to_millis(observed_rtt), now);
        trace!(rtt = ?observed_rtt, network = %self.current_network_id, "RTT observation");

        if let (Some(estimated), Some(observer)) =
            (self.estimated_median_quality.rtt(), self.observer.as_mut())
        {
            observer.rtt_accuracy(
                self.current_network_id.connection_type(),
                estimated,
                observed_rtt,
            );
        }
    }

    /// Report that `request` completed.
    ///
    /// Adds a downstream throughput observation, unless the transfer was
    /// too small or too short to be meaningful.
    pub fn notify_request_completed<R>(&mut self, request: &R)
    where
        R: Request + ?Sized,
    {
        if let Err(reason) = self.check_request(request) {
            trace!(?reason, method = request.method(), "Request ignored for throughput");
            return;
        }
        let now = self.clock.now();

        let Some(send_start) = request.send_start_time() else {
            return;
        };

        let elapsed = now.saturating_duration_since(send_start);
        let bytes = request.total_bytes_received();

        if !self.allow_small_responses
            && (bytes < MIN_TRANSFER_SIZE_IN_BYTES || elapsed < MIN_REQUEST_DURATION)
        {
            trace!(bytes, ?elapsed, "Transfer too small for a throughput observation");
            return;
        }

        let Some(kbps) = throughput_kbps(bytes, elapsed) else {
            return;
        };

        if self.peak_quality.downstream_kbps().is_none_or(|peak| kbps > peak) {
            self.peak_quality = self.peak_quality.with_downstream_kbps(kbps);
        }

        self.throughput_observations.add_observation(kbps, now);
        trace!(kbps, bytes, ?elapsed, network = %self.current_network_id, "Throughput observation");
    }

    /// The estimated RTT of the current network.
    ///
    /// Returns `None` if there is no RTT observation.
    pub fn rtt_estimate(&self) -> Option<Duration> {
        if self.rtt_observations.is_empty() {
            return None;
        }
        self.rtt_percentile(None, 50, self.clock.now())
    }

    /// The estimated downstream throughput of the current network, in kbps.
    ///
    /// Returns `None` if there is no throughput observation.
    pub fn downlink_throughput_kbps_estimate(&self) -> Option<u32> {
        if self.throughput_observations.is_empty() {
            return None;
        }
        self.throughput_percentile(None, 50, self.clock.now())
    }

    /// The median RTT of the observations taken at or after `begin`.
    pub fn recent_median_rtt(&self, begin: Instant) -> Option<Duration> {
        self.rtt_percentile(Some(begin), 50, self.clock.now())
    }

    /// The median downstream throughput, in kbps, of the observations
    /// taken at or after `begin`.
    pub fn recent_median_downlink_throughput_kbps(&self, begin: Instant) -> Option<u32> {
        self.throughput_percentile(Some(begin), 50, self.clock.now())
    }

    /// the current [`NetworkQuality`] estimate
    pub fn network_quality(&self) -> NetworkQuality {
        NetworkQuality::new(self.rtt_estimate(), self.downlink_throughput_kbps_estimate())
    }

    /// RTT observations are sorted from the shortest to the longest: a
    /// higher percentile is a longer RTT.
    fn rtt_percentile(&self, begin: Option<Instant>, percentile: u8, now: Instant) -> Option<Duration> {
        self.rtt_observations
            .percentile(begin, percentile, now)
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// Throughput observations are sorted from the slowest to the fastest.
    /// The percentile is inverted so that, like for the RTT, a higher
    /// percentile is a worse network.
    fn throughput_percentile(&self, begin: Option<Instant>, percentile: u8, now: Instant) -> Option<u32> {
        let percentile = percentile.min(100);
        self.throughput_observations
            .percentile(begin, 100 - percentile, now)
    }

    /// Report that the host switched to a network of the given type.
    ///
    /// The estimates of the network being left are cached, the
    /// observations are cleared and the estimator is seeded for the new
    /// network.
    pub fn on_connection_type_changed(&mut self, connection_type: ConnectionType) {
        let now = self.clock.now();

        let report = self.report(now);
        debug!(
            from = %report.network_id,
            to = %connection_type,
            peak = %report.peak,
            "Connection type changed"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer.network_changed(&report);
        }

        self.cache_network_quality_estimate(now);

        self.last_network_change = now;
        self.peak_quality = NetworkQuality::UNKNOWN;
        self.rtt_observations.clear();
        self.throughput_observations.clear();

        self.current_network_id = NetworkId::new(
            connection_type,
            self.resolver.identity(connection_type),
        );

        if !self.read_cached_network_quality_estimate(now) {
            self.add_default_estimates(now);
        }
        self.estimated_median_quality = NetworkQuality::UNKNOWN;

        if let Some(provider) = self.external_estimate_provider.as_mut() {
            provider.update();
        }
    }

    /// Report that the external estimate provider has a new estimate.
    ///
    /// The provider's RTT and throughput, when known, are added as
    /// observations of the current network. An estimate last refreshed
    /// more than one half life ago is ignored.
    pub fn on_updated_estimate_available(&mut self) {
        let Some(provider) = self.external_estimate_provider.as_ref() else {
            debug!("Updated estimate available without a registered provider");
            return;
        };
        if let Some(age) = provider
            .time_since_last_update()
            .filter(|age| *age > self.half_life)
        {
            debug!(?age, half_life = ?self.half_life, "External estimate too old");
            return;
        }

        let now = self.clock.now();
        let rtt = provider.rtt();
        let kbps = provider
            .downstream_throughput_kbps()
            .filter(|kbps| *kbps != NetworkQuality::INVALID_THROUGHPUT);

        if let Some(rtt) = rtt {
            self.rtt_observations
                .add_observation(duration_to_millis(rtt), now);
        }
        if let Some(kbps) = kbps {
            self.throughput_observations
                .add_observation(kbps.min(MAX_THROUGHPUT_KBPS), now);
        }
        debug!(?rtt, ?kbps, "External estimate");
    }

    fn report(&self, now: Instant) -> NetworkQualityReport {
        let rtt_percentiles = if self.rtt_observations.is_empty() {
            None
        } else {
            let mut rtts = [Duration::ZERO; REPORTED_RTT_PERCENTILES.len()];
            for (rtt, percentile) in rtts.iter_mut().zip(REPORTED_RTT_PERCENTILES) {
                *rtt = self.rtt_percentile(None, percentile, now).unwrap_or_default();
            }
            Some(rtts)
        };

        NetworkQualityReport {
            network_id: self.current_network_id.clone(),
            peak: self.peak_quality,
            rtt_percentiles,
        }
    }

    /// Write the estimate of the current network in the cache.
    ///
    /// Nothing is cached if the network has no identity or if either the
    /// RTT or the throughput is unknown.
    fn cache_network_quality_estimate(&mut self, now: Instant) {
        if !self.current_network_id.has_identity() {
            return;
        }

        let quality = self.network_quality();
        if !quality.is_valid() {
            trace!(network = %self.current_network_id, "Not enough observations to cache");
            return;
        }

        let evicted = self.cache.insert(
            self.current_network_id.clone(),
            CachedNetworkQuality::new(now, quality),
        );
        if let Some((evicted, _)) = evicted {
            debug!(network = %evicted, "Evicted from the network quality cache");
        }
        debug!(network = %self.current_network_id, %quality, "Cached network quality");
    }

    /// Seed the observations with the cached estimate of the current
    /// network.
    ///
    /// Returns `false` if the network has no identity or no cached
    /// estimate.
    fn read_cached_network_quality_estimate(&mut self, now: Instant) -> bool {
        if !self.current_network_id.has_identity() {
            return false;
        }
        let Some(cached) = self.cache.get(&self.current_network_id) else {
            return false;
        };
        let quality = *cached.quality();

        let (Some(rtt), Some(kbps)) = (quality.rtt(), quality.downstream_kbps()) else {
            debug_assert!(false, "invalid network quality in the cache");
            return false;
        };

        self.throughput_observations.add_observation(kbps, now);
        self.rtt_observations
            .add_observation(duration_to_millis(rtt), now);
        debug!(network = %self.current_network_id, %quality, "Restored cached network quality");
        true
    }

    /// Seed the observations with the default estimate of the connection
    /// type of the current network, if configured.
    fn add_default_estimates(&mut self, now: Instant) {
        let defaults = *self
            .default_estimates
            .get(self.current_network_id.connection_type());

        if let Some(rtt) = defaults.rtt() {
            self.rtt_observations
                .add_observation(duration_to_millis(rtt), now);
        }
        if let Some(kbps) = defaults.downstream_kbps() {
            self.throughput_observations.add_observation(kbps, now);
        }
        if defaults.rtt().is_some() || defaults.downstream_kbps().is_some() {
            debug!(network = %self.current_network_id, %defaults, "Seeded default estimates");
        }
    }

    /// Resolve the network the host is currently connected to.
    ///
    /// The connection type may change while the identity is looked up, in
    /// which case the resolution is retried a few times. If it does not
    /// settle the network is used without identity.
    fn resolve_current_network_id(&self) -> NetworkId {
        let mut connection_type = self.resolver.current_connection_type();

        for _ in 0..MAX_NETWORK_ID_RESOLUTION_ATTEMPTS {
            let identity = self.resolver.identity(connection_type);
            let settled = self.resolver.current_connection_type();

            if settled == connection_type {
                return NetworkId::new(connection_type, identity);
            }
            trace!(%connection_type, %settled, "Connection type changed during resolution");
            connection_type = settled;
        }

        NetworkId::anonymous(connection_type)
    }
}

/// RTTs are observed with a millisecond precision
fn duration_to_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Downstream throughput, in kbps, of a transfer of `bytes` lasting
/// `elapsed`.
///
/// The throughput is rounded up, so any transfer of at least one byte is
/// at least `1` kbps and is never confused with an unknown throughput.
/// Throughputs larger than [`MAX_THROUGHPUT_KBPS`] are clamped.
///
/// Returns `None` if nothing was transferred.
pub fn throughput_kbps(bytes: u64, elapsed: Duration) -> Option<u32> {
    if bytes == 0 {
        return None;
    }

    let kbps = bytes as f64 * 8.0 / 1000.0 / elapsed.as_secs_f64();
    debug_assert!(kbps >= 0.0);

    if kbps >= f64::from(MAX_THROUGHPUT_KBPS) {
        return Some(MAX_THROUGHPUT_KBPS);
    }
    Some((kbps.ceil() as u32).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        defaults::MAX_NETWORK_QUALITY_CACHE_SIZE,
        provider::FixedNetwork,
        request::RequestInfo,
        time::ManualClock,
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    const URL: &str = "https://example.com/resource";

    /// resolver whose network can be changed by the test
    #[derive(Clone, Default)]
    struct SwitchableNetwork(Arc<Mutex<NetworkId>>);

    impl SwitchableNetwork {
        fn new(network_id: NetworkId) -> Self {
            Self(Arc::new(Mutex::new(network_id)))
        }

        fn set(&self, network_id: NetworkId) {
            *self.0.lock().unwrap() = network_id;
        }
    }

    impl NetworkIdResolver for SwitchableNetwork {
        fn current_connection_type(&self) -> ConnectionType {
            self.0.lock().unwrap().connection_type()
        }

        fn identity(&self, connection_type: ConnectionType) -> String {
            let current = self.0.lock().unwrap();
            if current.connection_type() == connection_type {
                current.identity().to_owned()
            } else {
                String::new()
            }
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        reports: Arc<Mutex<Vec<NetworkQualityReport>>>,
        accuracy: Arc<Mutex<Vec<(Duration, Duration)>>>,
    }

    impl QualityObserver for Recorder {
        fn network_changed(&mut self, report: &NetworkQualityReport) {
            self.reports.lock().unwrap().push(report.clone());
        }

        fn rtt_accuracy(&mut self, _: ConnectionType, estimated: Duration, observed: Duration) {
            self.accuracy.lock().unwrap().push((estimated, observed));
        }
    }

    struct StaticProvider {
        rtt: Option<Duration>,
        kbps: Option<u32>,
        age: Option<Duration>,
        updates: Arc<Mutex<usize>>,
    }

    impl ExternalEstimateProvider for StaticProvider {
        fn rtt(&self) -> Option<Duration> {
            self.rtt
        }

        fn downstream_throughput_kbps(&self) -> Option<u32> {
            self.kbps
        }

        fn time_since_last_update(&self) -> Option<Duration> {
            self.age
        }

        fn update(&mut self) {
            *self.updates.lock().unwrap() += 1;
        }
    }

    fn wifi(ssid: &str) -> NetworkId {
        NetworkId::new(ConnectionType::Wifi, ssid)
    }

    fn estimator_on(
        network_id: NetworkId,
        config: EstimatorConfig,
    ) -> (NetworkQualityEstimator<ManualClock>, ManualClock, SwitchableNetwork) {
        let clock = ManualClock::new();
        let resolver = SwitchableNetwork::new(network_id);
        let estimator = NetworkQualityEstimator::with_clock(config, resolver.clone(), clock.clone());
        (estimator, clock, resolver)
    }

    /// a request sent now whose headers arrive after `rtt`
    fn request_with_rtt(clock: &ManualClock, rtt: Duration) -> RequestInfo {
        let sent = clock.now();
        clock.advance(rtt);
        RequestInfo::builder(URL, sent)
            .send_start_time(sent)
            .headers_received_time(clock.now())
            .response_time(clock.now())
            .build()
    }

    /// a request sent now that receives `bytes` in `duration`
    fn request_with_transfer(clock: &ManualClock, bytes: u64, duration: Duration) -> RequestInfo {
        let sent = clock.now();
        clock.advance(duration);
        RequestInfo::builder(URL, sent)
            .send_start_time(sent)
            .headers_received_time(sent)
            .response_time(sent)
            .total_bytes_received(bytes)
            .build()
    }

    fn observe_rtt(estimator: &mut NetworkQualityEstimator<ManualClock>, clock: &ManualClock, ms: u64) {
        let request = request_with_rtt(clock, Duration::from_millis(ms));
        estimator.notify_headers_received(&request);
    }

    fn observe_kbps(estimator: &mut NetworkQualityEstimator<ManualClock>, clock: &ManualClock, kbps: u64) {
        // kbps * 1000 / 8 bytes in one second
        let request = request_with_transfer(clock, kbps * 125, Duration::from_secs(1));
        estimator.notify_request_completed(&request);
    }

    #[test]
    fn single_rtt_observation() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        observe_rtt(&mut estimator, &clock, 100);

        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(100)));
        assert_eq!(estimator.peak_quality().rtt(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn no_estimate_without_observations() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        assert_eq!(estimator.rtt_estimate(), None);
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), None);
        assert!(!estimator.network_quality().is_valid());

        observe_rtt(&mut estimator, &clock, 30);
        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(30)));
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), None);
    }

    #[test]
    fn throughput_observation() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        observe_kbps(&mut estimator, &clock, 800);

        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(800));
        assert_eq!(estimator.peak_quality().downstream_kbps(), Some(800));
    }

    #[test]
    fn peak_quality_keeps_the_best() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        for ms in [80, 20, 50] {
            observe_rtt(&mut estimator, &clock, ms);
        }
        for kbps in [100, 900, 300] {
            observe_kbps(&mut estimator, &clock, kbps);
        }

        assert_eq!(estimator.peak_quality().rtt(), Some(Duration::from_millis(20)));
        assert_eq!(estimator.peak_quality().downstream_kbps(), Some(900));
    }

    #[test]
    fn cached_responses_are_ignored() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        let sent = clock.now();
        clock.advance(Duration::from_millis(200));
        let request = RequestInfo::builder(URL, sent)
            .send_start_time(sent)
            .headers_received_time(clock.now())
            .response_time(clock.now())
            .total_bytes_received(1_000_000)
            .served_from_cache(true)
            .build();

        estimator.notify_headers_received(&request);
        estimator.notify_request_completed(&request);

        assert_eq!(estimator.rtt_estimate(), None);
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), None);
    }

    #[test]
    fn request_filter() {
        let (estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());
        let t0 = clock.now();
        let useful = |url: &str| {
            let request = RequestInfo::builder(url, t0).response_time(t0).build();
            estimator.request_provides_useful_observations(&request)
        };

        assert!(useful("https://example.com/"));
        assert!(useful("http://example.com/"));
        assert!(!useful("ftp://example.com/"));
        assert!(!useful("not a url"));
        assert!(!useful("http://localhost:8080/"));
        assert!(!useful("http://127.0.0.1/"));

        let no_response = RequestInfo::builder(URL, t0).build();
        assert!(!estimator.request_provides_useful_observations(&no_response));
    }

    #[test]
    fn localhost_allowed_for_tests() {
        let config = EstimatorConfig::default().allow_localhost_requests(true);
        let (estimator, clock, _) = estimator_on(wifi("a"), config);
        let t0 = clock.now();

        let request = RequestInfo::builder("http://localhost/", t0)
            .response_time(t0)
            .build();
        assert!(estimator.request_provides_useful_observations(&request));
    }

    #[test]
    fn requests_from_the_previous_network_are_ignored() {
        let (mut estimator, clock, resolver) = estimator_on(wifi("a"), EstimatorConfig::default());

        // created before the change, completed after
        let sent = clock.now();
        clock.advance(Duration::from_millis(10));
        resolver.set(NetworkId::anonymous(ConnectionType::Ethernet));
        estimator.on_connection_type_changed(ConnectionType::Ethernet);
        clock.advance(Duration::from_millis(10));

        let request = RequestInfo::builder(URL, sent)
            .send_start_time(sent)
            .headers_received_time(clock.now())
            .response_time(clock.now())
            .build();
        estimator.notify_headers_received(&request);

        assert_eq!(estimator.rtt_estimate(), None);
    }

    #[test]
    fn missing_timing_is_ignored() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());
        let t0 = clock.now();
        clock.advance(Duration::from_secs(1));

        let request = RequestInfo::builder(URL, t0)
            .response_time(t0)
            .total_bytes_received(1_000_000)
            .build();
        estimator.notify_headers_received(&request);
        estimator.notify_request_completed(&request);

        assert!(estimator.rtt_observations().is_empty());
        assert!(estimator.throughput_observations().is_empty());
    }

    #[test]
    fn small_transfers_are_ignored() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        let request =
            request_with_transfer(&clock, MIN_TRANSFER_SIZE_IN_BYTES - 1, Duration::from_secs(1));
        estimator.notify_request_completed(&request);
        let request = request_with_transfer(&clock, 1_000_000, Duration::from_micros(500));
        estimator.notify_request_completed(&request);

        assert_eq!(estimator.downlink_throughput_kbps_estimate(), None);

        let request =
            request_with_transfer(&clock, MIN_TRANSFER_SIZE_IN_BYTES, Duration::from_secs(1));
        estimator.notify_request_completed(&request);

        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(80));
    }

    #[test]
    fn small_transfers_allowed_for_tests() {
        let config = EstimatorConfig::default().allow_small_responses(true);
        let (mut estimator, clock, _) = estimator_on(wifi("a"), config);

        let request = request_with_transfer(&clock, 1, Duration::from_secs(1));
        estimator.notify_request_completed(&request);

        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(1));
    }

    #[test]
    fn throughput_computation() {
        // 8 kbit in 1s
        assert_eq!(throughput_kbps(1_000, Duration::from_secs(1)), Some(8));
        // rounded up
        assert_eq!(throughput_kbps(1_001, Duration::from_secs(1)), Some(9));
        // slow but not nothing
        assert_eq!(throughput_kbps(1, Duration::from_secs(100)), Some(1));
        assert_eq!(throughput_kbps(0, Duration::from_secs(1)), None);
        // overflow is clamped
        assert_eq!(
            throughput_kbps(u64::MAX, Duration::from_millis(1)),
            Some(MAX_THROUGHPUT_KBPS)
        );
        assert_eq!(
            throughput_kbps(1_000, Duration::ZERO),
            Some(MAX_THROUGHPUT_KBPS)
        );
    }

    #[test]
    fn throughput_percentile_is_inverted() {
        let config = EstimatorConfig::default().allow_small_responses(true);
        let (mut estimator, clock, _) = estimator_on(wifi("a"), config);
        // short transfers so that all the observations have the same weight
        for kbps in [100, 200, 300, 400] {
            let request = request_with_transfer(&clock, kbps * 10 / 8, Duration::from_millis(10));
            estimator.notify_request_completed(&request);
        }
        let now = clock.now();

        // a low percentile is a good network: high throughput
        assert_eq!(estimator.throughput_percentile(None, 10, now), Some(400));
        assert_eq!(estimator.throughput_percentile(None, 100, now), Some(100));
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(200));
    }

    #[test]
    fn recent_median() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        observe_rtt(&mut estimator, &clock, 500);
        observe_kbps(&mut estimator, &clock, 100);
        clock.advance(Duration::from_secs(5));
        let begin = clock.now();
        observe_rtt(&mut estimator, &clock, 50);
        observe_kbps(&mut estimator, &clock, 2_000);

        assert_eq!(estimator.recent_median_rtt(begin), Some(Duration::from_millis(50)));
        assert_eq!(estimator.recent_median_downlink_throughput_kbps(begin), Some(2_000));

        clock.advance(Duration::from_secs(5));
        assert_eq!(estimator.recent_median_rtt(clock.now()), None);
        assert_eq!(estimator.recent_median_downlink_throughput_kbps(clock.now()), None);
    }

    /// two slow RTTs, then a fast one 5 seconds later
    fn old_slow_then_recent_fast(config: EstimatorConfig) -> Option<Duration> {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), config);

        observe_rtt(&mut estimator, &clock, 1_000);
        observe_rtt(&mut estimator, &clock, 1_000);
        clock.advance(Duration::from_secs(5));
        observe_rtt(&mut estimator, &clock, 10);

        estimator.rtt_estimate()
    }

    #[test]
    fn configured_half_life_drives_the_decay() {
        let params = HashMap::from([("HalfLifeSeconds".to_owned(), "1".to_owned())]);
        let short = EstimatorConfig::from_variation_params(&params);

        // the old observations weigh 1/32 and less: the recent one wins
        assert_eq!(
            old_slow_then_recent_fast(short),
            Some(Duration::from_millis(10))
        );
        // barely decayed after 5s: still outnumbered
        assert_eq!(
            old_slow_then_recent_fast(EstimatorConfig::default()),
            Some(Duration::from_millis(1_000))
        );
    }

    #[test]
    fn stale_external_estimates_are_ignored() {
        let params = HashMap::from([("HalfLifeSeconds".to_owned(), "10".to_owned())]);
        let config = EstimatorConfig::from_variation_params(&params);
        let (mut estimator, _, _) = estimator_on(wifi("a"), config);

        let provider = |age| StaticProvider {
            rtt: Some(Duration::from_millis(42)),
            kbps: Some(900),
            age,
            updates: Arc::default(),
        };

        estimator.set_external_estimate_provider(Box::new(provider(Some(Duration::from_secs(11)))));
        estimator.on_updated_estimate_available();
        assert!(estimator.rtt_observations().is_empty());
        assert!(estimator.throughput_observations().is_empty());

        // exactly one half life old is still fresh
        estimator.set_external_estimate_provider(Box::new(provider(Some(Duration::from_secs(10)))));
        estimator.on_updated_estimate_available();
        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(42)));
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(900));
        assert_eq!(estimator.rtt_observations().len(), 1);
    }

    #[test]
    fn default_estimates_seed_the_start() {
        let params = HashMap::from([
            ("WiFi.DefaultMedianRTTMsec".to_owned(), "75".to_owned()),
            ("WiFi.DefaultMedianKbps".to_owned(), "1500".to_owned()),
        ]);
        let config = EstimatorConfig::from_variation_params(&params);
        let (estimator, _, _) = estimator_on(wifi("a"), config);

        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(75)));
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(1_500));
    }

    #[test]
    fn partial_default_estimate() {
        let config = EstimatorConfig::default().with_default_estimate(
            ConnectionType::Cellular3G,
            NetworkQuality::new(Some(Duration::from_millis(400)), None),
        );
        let (mut estimator, _, resolver) = estimator_on(wifi("a"), config);
        assert_eq!(estimator.rtt_estimate(), None);

        resolver.set(NetworkId::new(ConnectionType::Cellular3G, "operator"));
        estimator.on_connection_type_changed(ConnectionType::Cellular3G);

        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(400)));
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), None);
    }

    #[test]
    fn network_change_caches_and_restores() {
        let (mut estimator, clock, resolver) = estimator_on(wifi("ssid-A"), EstimatorConfig::default());

        observe_rtt(&mut estimator, &clock, 50);
        observe_kbps(&mut estimator, &clock, 500);

        resolver.set(NetworkId::new(ConnectionType::Cellular4G, "operator"));
        estimator.on_connection_type_changed(ConnectionType::Cellular4G);

        let cached = estimator.cache().get(&wifi("ssid-A")).unwrap();
        assert_eq!(cached.quality().rtt(), Some(Duration::from_millis(50)));
        assert_eq!(cached.quality().downstream_kbps(), Some(500));
        assert_eq!(estimator.rtt_estimate(), None);
        assert_eq!(*estimator.peak_quality(), NetworkQuality::UNKNOWN);

        resolver.set(wifi("ssid-A"));
        estimator.on_connection_type_changed(ConnectionType::Wifi);

        assert_eq!(estimator.current_network_id(), &wifi("ssid-A"));
        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(50)));
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), Some(500));
    }

    #[test]
    fn cached_estimate_takes_precedence_over_defaults() {
        let config = EstimatorConfig::default().with_default_estimate(
            ConnectionType::Wifi,
            NetworkQuality::new(Some(Duration::from_millis(999)), Some(1)),
        );
        let (mut estimator, clock, resolver) = estimator_on(wifi("ssid-A"), config);

        observe_rtt(&mut estimator, &clock, 10);
        observe_rtt(&mut estimator, &clock, 10);
        observe_kbps(&mut estimator, &clock, 5_000);
        observe_kbps(&mut estimator, &clock, 5_000);

        resolver.set(NetworkId::anonymous(ConnectionType::Ethernet));
        estimator.on_connection_type_changed(ConnectionType::Ethernet);
        resolver.set(wifi("ssid-A"));
        estimator.on_connection_type_changed(ConnectionType::Wifi);

        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(10)));
        assert_eq!(estimator.rtt_observations().len(), 1);

        // an unknown WiFi gets the defaults
        resolver.set(wifi("ssid-B"));
        estimator.on_connection_type_changed(ConnectionType::Wifi);
        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(999)));
    }

    #[test]
    fn networks_without_identity_are_not_cached() {
        let (mut estimator, clock, resolver) =
            estimator_on(NetworkId::anonymous(ConnectionType::Ethernet), EstimatorConfig::default());

        observe_rtt(&mut estimator, &clock, 50);
        observe_kbps(&mut estimator, &clock, 500);

        resolver.set(wifi("a"));
        estimator.on_connection_type_changed(ConnectionType::Wifi);

        assert!(estimator.cache().is_empty());
    }

    #[test]
    fn incomplete_estimates_are_not_cached() {
        let (mut estimator, clock, resolver) = estimator_on(wifi("a"), EstimatorConfig::default());

        observe_rtt(&mut estimator, &clock, 50);

        resolver.set(NetworkId::anonymous(ConnectionType::Ethernet));
        estimator.on_connection_type_changed(ConnectionType::Ethernet);

        assert!(estimator.cache().is_empty());
    }

    #[test]
    fn cache_evicts_the_oldest_network() {
        let (mut estimator, clock, resolver) = estimator_on(wifi("net-0"), EstimatorConfig::default());

        for i in 0..=MAX_NETWORK_QUALITY_CACHE_SIZE {
            observe_rtt(&mut estimator, &clock, 50);
            observe_kbps(&mut estimator, &clock, 500);
            clock.advance(Duration::from_secs(1));

            let next = wifi(&format!("net-{}", i + 1));
            resolver.set(next);
            estimator.on_connection_type_changed(ConnectionType::Wifi);
        }

        assert_eq!(estimator.cache().len(), MAX_NETWORK_QUALITY_CACHE_SIZE);
        assert!(estimator.cache().get(&wifi("net-0")).is_none());
        assert!(estimator.cache().get(&wifi("net-1")).is_some());
        assert!(
            estimator
                .cache()
                .get(&wifi(&format!("net-{MAX_NETWORK_QUALITY_CACHE_SIZE}")))
                .is_some()
        );
    }

    #[test]
    fn network_change_reports_to_the_observer() {
        let (mut estimator, clock, resolver) = estimator_on(wifi("a"), EstimatorConfig::default());
        let recorder = Recorder::default();
        assert!(estimator.set_observer(Box::new(recorder.clone())).is_none());

        for ms in [10, 20, 30, 40, 50] {
            observe_rtt(&mut estimator, &clock, ms);
        }
        observe_kbps(&mut estimator, &clock, 700);

        resolver.set(NetworkId::anonymous(ConnectionType::None));
        estimator.on_connection_type_changed(ConnectionType::None);
        estimator.on_connection_type_changed(ConnectionType::None);

        let reports = recorder.reports.lock().unwrap();
        assert_eq!(reports.len(), 2);

        let report = &reports[0];
        assert_eq!(report.network_id, wifi("a"));
        assert_eq!(report.peak.rtt(), Some(Duration::from_millis(10)));
        assert_eq!(report.peak.downstream_kbps(), Some(700));
        assert_eq!(report.rtt_percentile(0), Some(Duration::from_millis(10)));
        assert_eq!(report.rtt_percentile(100), Some(Duration::from_millis(50)));

        assert_eq!(reports[1].rtt_percentiles, None);
        assert_eq!(reports[1].peak, NetworkQuality::UNKNOWN);
    }

    #[test]
    fn main_frame_refreshes_the_median_estimate() {
        let (mut estimator, clock, _) = estimator_on(wifi("a"), EstimatorConfig::default());
        let recorder = Recorder::default();
        estimator.set_observer(Box::new(recorder.clone()));

        observe_rtt(&mut estimator, &clock, 100);
        assert_eq!(*estimator.estimated_median_quality(), NetworkQuality::UNKNOWN);

        let sent = clock.now();
        clock.advance(Duration::from_millis(300));
        let main_frame = RequestInfo::builder(URL, sent)
            .main_frame(true)
            .send_start_time(sent)
            .headers_received_time(clock.now())
            .response_time(clock.now())
            .build();
        estimator.notify_headers_received(&main_frame);

        // the median is taken before the main frame's own observation
        assert_eq!(
            estimator.estimated_median_quality().rtt(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            *recorder.accuracy.lock().unwrap(),
            vec![(Duration::from_millis(100), Duration::from_millis(300))]
        );

        estimator.on_connection_type_changed(ConnectionType::Wifi);
        assert_eq!(*estimator.estimated_median_quality(), NetworkQuality::UNKNOWN);
    }

    #[test]
    fn external_estimates() {
        let (mut estimator, _, _) = estimator_on(wifi("a"), EstimatorConfig::default());

        // no provider: nothing happens
        estimator.on_updated_estimate_available();
        assert_eq!(estimator.rtt_estimate(), None);

        let updates = Arc::new(Mutex::new(0));
        let provider = StaticProvider {
            rtt: Some(Duration::from_millis(42)),
            kbps: Some(0),
            age: None,
            updates: Arc::clone(&updates),
        };
        assert!(estimator.set_external_estimate_provider(Box::new(provider)).is_none());

        estimator.on_updated_estimate_available();
        assert_eq!(estimator.rtt_estimate(), Some(Duration::from_millis(42)));
        // 0 kbps is not a throughput
        assert_eq!(estimator.downlink_throughput_kbps_estimate(), None);

        estimator.on_connection_type_changed(ConnectionType::Wifi);
        assert_eq!(*updates.lock().unwrap(), 1);

        assert!(estimator.take_external_estimate_provider().is_some());
        estimator.on_updated_estimate_available();
        assert_eq!(estimator.rtt_estimate(), None);
    }

    #[test]
    fn network_resolution_settles() {
        /// changes its connection type the first time it is asked
        struct Flaky(Mutex<usize>);

        impl NetworkIdResolver for Flaky {
            fn current_connection_type(&self) -> ConnectionType {
                let mut calls = self.0.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    ConnectionType::Cellular3G
                } else {
                    ConnectionType::Wifi
                }
            }

            fn identity(&self, connection_type: ConnectionType) -> String {
                connection_type.to_string()
            }
        }

        let estimator = NetworkQualityEstimator::with_clock(
            EstimatorConfig::default(),
            Flaky(Mutex::new(0)),
            ManualClock::new(),
        );

        assert_eq!(
            estimator.current_network_id(),
            &NetworkId::new(ConnectionType::Wifi, "WiFi")
        );
    }

    #[test]
    fn system_clock_estimator() {
        let estimator = NetworkQualityEstimator::new(
            EstimatorConfig::default(),
            FixedNetwork::new(NetworkId::anonymous(ConnectionType::Ethernet)),
        );

        assert_eq!(
            estimator.current_network_id().connection_type(),
            ConnectionType::Ethernet
        );
        assert_eq!(estimator.rtt_estimate(), None);
    }
}
