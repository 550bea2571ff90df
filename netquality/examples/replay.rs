//! Replay synthetic traffic through an [`EstimatorContext`] and print the
//! estimates as the host moves between networks.
//!
//! ```text
//! RUST_LOG=netquality_core=debug cargo run --example replay -- --requests 200 --switch-every 50
//! ```

use clap::Parser;
use netquality::{
    ConnectionType, ConnectionTypeNotifier, EstimatorConfig, EstimatorContext, EstimatorHandle,
    NetworkId, NetworkQualityEstimator, RequestInfo,
};
use netquality_core::{
    provider::NetworkIdResolver,
    time::{Clock as _, ManualClock},
};
use rand::{Rng as _, SeedableRng as _, rngs::StdRng};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Command {
    /// number of requests to replay
    #[arg(long, default_value = "100")]
    requests: usize,

    /// move to the next network every N requests
    #[arg(long, default_value = "25")]
    switch_every: usize,

    /// half life of the observations, in seconds
    #[arg(long, default_value = "60")]
    half_life: u64,

    /// seed of the traffic generator
    #[arg(long, default_value = "42")]
    seed: u64,
}

/// a network the replay moves to, with its typical RTT and throughput
struct Profile {
    network_id: NetworkId,
    rtt_ms: u64,
    kbps: u64,
}

fn profiles() -> Vec<Profile> {
    vec![
        Profile {
            network_id: NetworkId::new(ConnectionType::Wifi, "home"),
            rtt_ms: 30,
            kbps: 20_000,
        },
        Profile {
            network_id: NetworkId::new(ConnectionType::Cellular4G, "operator"),
            rtt_ms: 80,
            kbps: 5_000,
        },
        Profile {
            network_id: NetworkId::new(ConnectionType::Cellular3G, "operator"),
            rtt_ms: 300,
            kbps: 700,
        },
    ]
}

#[derive(Clone)]
struct Network(Arc<Mutex<NetworkId>>);

impl NetworkIdResolver for Network {
    fn current_connection_type(&self) -> ConnectionType {
        self.0.lock().map(|id| id.connection_type()).unwrap_or_default()
    }

    fn identity(&self, _: ConnectionType) -> String {
        self.0
            .lock()
            .map(|id| id.identity().to_owned())
            .unwrap_or_default()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cmd = Command::parse();
    let mut rng = StdRng::seed_from_u64(cmd.seed);
    let profiles = profiles();

    let params = HashMap::from([
        ("HalfLifeSeconds".to_owned(), cmd.half_life.to_string()),
        ("3G.DefaultMedianRTTMsec".to_owned(), "400".to_owned()),
        ("3G.DefaultMedianKbps".to_owned(), "500".to_owned()),
    ]);
    let config = EstimatorConfig::try_from_variation_params(&params)?;

    let clock = ManualClock::new();
    let network = Network(Arc::new(Mutex::new(profiles[0].network_id.clone())));
    let estimator = NetworkQualityEstimator::with_clock(config, network.clone(), clock.clone());

    let context = EstimatorContext::new(estimator)?;
    let handle = context.handle();
    let notifier = ConnectionTypeNotifier::new();
    let _subscription = handle.watch(&notifier);

    let mut current = 0;
    for i in 0..cmd.requests {
        if i > 0 && cmd.switch_every > 0 && i % cmd.switch_every == 0 {
            report(&handle, &profiles[current])?;

            current = (current + 1) % profiles.len();
            if let Ok(mut id) = network.0.lock() {
                *id = profiles[current].network_id.clone();
            }
            notifier.notify_connection_type_changed(profiles[current].network_id.connection_type());
        }

        replay_request(&handle, &clock, &mut rng, &profiles[current])?;
        clock.advance(Duration::from_millis(rng.gen_range(100..2_000)));
    }
    report(&handle, &profiles[current])?;

    context.shutdown()
}

/// one request with a jittered RTT and throughput around the profile's
fn replay_request(
    handle: &EstimatorHandle,
    clock: &ManualClock,
    rng: &mut StdRng,
    profile: &Profile,
) -> anyhow::Result<()> {
    let rtt = Duration::from_millis(profile.rtt_ms * rng.gen_range(80..150) / 100);
    let transfer = Duration::from_millis(rng.gen_range(200..1_500));
    let kbps = profile.kbps * rng.gen_range(50..120) / 100;
    let bytes = kbps * 125 * transfer.as_millis() as u64 / 1_000;

    let sent = clock.now();
    clock.advance(rtt);
    let headers = clock.now();

    let request = RequestInfo::builder("https://example.com/replay", sent)
        .main_frame(rng.gen_bool(0.1))
        .send_start_time(sent)
        .headers_received_time(headers)
        .response_time(headers)
        .total_bytes_received(bytes)
        .build();

    handle.notify_headers_received(request.clone())?;
    clock.advance(transfer);
    handle.notify_request_completed(request)?;

    // let the estimator read the clock before it moves again
    handle.current_network_id()?;
    Ok(())
}

fn report(handle: &EstimatorHandle, profile: &Profile) -> anyhow::Result<()> {
    let quality = handle.network_quality()?;
    let peak = handle.peak_quality()?;

    info!(
        network = %handle.current_network_id()?,
        expected_rtt_ms = profile.rtt_ms,
        expected_kbps = profile.kbps,
        %quality,
        %peak,
        "Network estimate"
    );
    println!(
        "{network}: {quality} (peak {peak}), typical rtt={rtt}ms, downstream={kbps}kbps",
        network = profile.network_id,
        rtt = profile.rtt_ms,
        kbps = profile.kbps,
    );

    Ok(())
}
