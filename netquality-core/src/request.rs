//! The view the estimator has of a network request.
//!
//! The estimator does not perform requests. The host's HTTP stack reports
//! them through [`NetworkQualityEstimator::notify_headers_received`] and
//! [`NetworkQualityEstimator::notify_request_completed`] using anything
//! implementing [`Request`].
//!
//! [`NetworkQualityEstimator::notify_headers_received`]: crate::NetworkQualityEstimator::notify_headers_received
//! [`NetworkQualityEstimator::notify_request_completed`]: crate::NetworkQualityEstimator::notify_request_completed

use std::time::Instant;
use url::{Host, Url};

/// Timing and metadata of a network request.
///
/// All the times are taken from the same monotonic clock as the estimator's
/// [`Clock`](crate::time::Clock).
pub trait Request {
    /// the URL of the request, `None` if it could not be parsed
    fn url(&self) -> Option<&Url>;

    fn method(&self) -> &str;

    /// `true` for a top level navigation
    fn is_main_frame(&self) -> bool;

    fn response_headers_present(&self) -> bool;

    /// when the response was produced, `None` if unknown
    fn response_time(&self) -> Option<Instant>;

    fn was_served_from_cache(&self) -> bool;

    /// when the request object was created
    fn creation_time(&self) -> Instant;

    /// when the request started to be sent, `None` if the request did not
    /// go over the network
    fn send_start_time(&self) -> Option<Instant>;

    /// when the response headers were received
    fn headers_received_time(&self) -> Option<Instant>;

    /// total bytes received for the response so far
    fn total_bytes_received(&self) -> u64;
}

/// A plain [`Request`] value.
///
/// ```
/// # use netquality_core::request::{Request, RequestInfo};
/// # use std::time::{Duration, Instant};
/// let t0 = Instant::now();
/// let request = RequestInfo::builder("https://example.com/index.html", t0)
///     .send_start_time(t0)
///     .headers_received_time(t0 + Duration::from_millis(80))
///     .response_time(t0 + Duration::from_millis(80))
///     .total_bytes_received(25_000)
///     .build();
///
/// assert!(request.url().is_some());
/// assert_eq!(request.method(), "GET");
/// ```
#[derive(Debug, Clone)]
pub struct RequestInfo {
    url: Option<Url>,
    method: String,
    main_frame: bool,
    response_headers_present: bool,
    response_time: Option<Instant>,
    served_from_cache: bool,
    creation_time: Instant,
    send_start_time: Option<Instant>,
    headers_received_time: Option<Instant>,
    total_bytes_received: u64,
}

pub struct RequestInfoBuilder {
    info: RequestInfo,
}

impl RequestInfo {
    /// start building a `GET` request created at `creation_time`
    ///
    /// An unparsable `url` makes the request invalid, it is not an error.
    pub fn builder(url: &str, creation_time: Instant) -> RequestInfoBuilder {
        RequestInfoBuilder {
            info: Self {
                url: Url::parse(url).ok(),
                method: "GET".to_owned(),
                main_frame: false,
                response_headers_present: false,
                response_time: None,
                served_from_cache: false,
                creation_time,
                send_start_time: None,
                headers_received_time: None,
                total_bytes_received: 0,
            },
        }
    }
}

impl RequestInfoBuilder {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.info.method = method.into();
        self
    }

    pub fn main_frame(mut self, main_frame: bool) -> Self {
        self.info.main_frame = main_frame;
        self
    }

    /// set the response time, this also marks the response headers as
    /// present.
    pub fn response_time(mut self, response_time: Instant) -> Self {
        self.info.response_time = Some(response_time);
        self.info.response_headers_present = true;
        self
    }

    pub fn served_from_cache(mut self, served_from_cache: bool) -> Self {
        self.info.served_from_cache = served_from_cache;
        self
    }

    pub fn send_start_time(mut self, send_start_time: Instant) -> Self {
        self.info.send_start_time = Some(send_start_time);
        self
    }

    pub fn headers_received_time(mut self, headers_received_time: Instant) -> Self {
        self.info.headers_received_time = Some(headers_received_time);
        self
    }

    pub fn total_bytes_received(mut self, total_bytes_received: u64) -> Self {
        self.info.total_bytes_received = total_bytes_received;
        self
    }

    pub fn build(self) -> RequestInfo {
        self.info
    }
}

impl Request for RequestInfo {
    fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn is_main_frame(&self) -> bool {
        self.main_frame
    }

    fn response_headers_present(&self) -> bool {
        self.response_headers_present
    }

    fn response_time(&self) -> Option<Instant> {
        self.response_time
    }

    fn was_served_from_cache(&self) -> bool {
        self.served_from_cache
    }

    fn creation_time(&self) -> Instant {
        self.creation_time
    }

    fn send_start_time(&self) -> Option<Instant> {
        self.send_start_time
    }

    fn headers_received_time(&self) -> Option<Instant> {
        self.headers_received_time
    }

    fn total_bytes_received(&self) -> u64 {
        self.total_bytes_received
    }
}

/// `true` if the scheme of `url` is `http` or `https`
pub fn is_http_or_https(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// `true` if the host of `url` designates the local machine.
///
/// Loopback addresses, `localhost`, `localhost6`, their `.localdomain`
/// variants and any `*.localhost` domain are local.
///
/// ```
/// # use netquality_core::request::is_localhost;
/// # use url::Url;
/// assert!(is_localhost(&Url::parse("http://127.0.0.2:8080/").unwrap()));
/// assert!(is_localhost(&Url::parse("http://[::1]/").unwrap()));
/// assert!(is_localhost(&Url::parse("http://api.localhost/").unwrap()));
/// assert!(!is_localhost(&Url::parse("http://example.com/").unwrap()));
/// ```
pub fn is_localhost(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            matches!(
                domain.as_str(),
                "localhost" | "localhost.localdomain" | "localhost6" | "localhost6.localdomain6"
            ) || domain.ends_with(".localhost")
        }
        None => false,
    }
}
