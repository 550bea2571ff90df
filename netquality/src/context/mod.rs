pub(crate) mod command;

use self::command::{Command, CommandReceiver, CommandSender, command_channel};
use crate::notifier::{ConnectionTypeNotifier, Subscription};
use anyhow::{Context as _, Result, anyhow, bail};
use netquality_core::{
    ConnectionType, NetworkId, NetworkQuality, NetworkQualityEstimator, RequestInfo,
    provider::ExternalEstimateProvider, stats::QualityObserver, time::Clock,
};
use std::{
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
        mpsc::{SyncSender, TrySendError, sync_channel},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Runs a [`NetworkQualityEstimator`] on a dedicated thread.
///
/// The estimator is owned by the thread. Every interaction goes through an
/// [`EstimatorHandle`] which can be cloned and shared between the threads
/// of the host: notifications, connection changes, provider updates and
/// queries are all processed in the order they arrive.
///
/// The thread stops when [`shutdown`] is called, or once the context and
/// every handle are dropped.
///
/// [`shutdown`]: Self::shutdown
pub struct EstimatorContext {
    handle: EstimatorHandle,

    thread: JoinHandle<()>,
}

/// Cloneable access to the estimator of an [`EstimatorContext`].
#[derive(Clone)]
pub struct EstimatorHandle {
    commands: CommandSender,

    /// notifications dropped because the queue was full
    dropped: Arc<AtomicU64>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Failed to notify the estimator: disconnected.")]
    Disconnected,
    /// the estimator thread is not keeping up with the notifications
    #[error("Failed to notify the estimator: queue is full.")]
    Full,
}

struct Actor<C> {
    estimator: NetworkQualityEstimator<C>,

    commands: CommandReceiver,
}

impl EstimatorContext {
    /// Move `estimator` to a new thread.
    pub fn new<C>(estimator: NetworkQualityEstimator<C>) -> Result<Self>
    where
        C: Clock + 'static,
    {
        let (commands, receiver) = command_channel();
        let actor = Actor {
            estimator,
            commands: receiver,
        };

        let thread = thread::Builder::new()
            .name("netquality-estimator".to_owned())
            .spawn(move || actor_run(actor))
            .context("Failed to spawn the estimator thread")?;

        Ok(Self {
            handle: EstimatorHandle {
                commands,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            thread,
        })
    }

    pub fn handle(&self) -> EstimatorHandle {
        self.handle.clone()
    }

    /// Stop the estimator thread and wait for it to finish.
    ///
    /// Commands sent before the shutdown are processed first. Handles
    /// still alive afterwards fail with [`NotifyError::Disconnected`].
    pub fn shutdown(self) -> Result<()> {
        if self.handle.commands.send(Command::Shutdown).is_err() {
            // the thread is already gone, `join` tells us why
            debug!("Estimator thread stopped before shutdown");
        }

        match self.thread.join() {
            Ok(()) => Ok(()),
            Err(join_error) => {
                bail!("Estimator thread failed to clean shutdown: {join_error:?}")
            }
        }
    }
}

impl EstimatorHandle {
    /// Report that the response headers of `request` were received.
    ///
    /// The notification is dropped if the estimator thread is not keeping
    /// up (see [`dropped_notifications`](Self::dropped_notifications)).
    pub fn notify_headers_received(&self, request: RequestInfo) -> Result<(), NotifyError> {
        self.notify(Command::HeadersReceived(request))
    }

    /// Report that `request` completed.
    ///
    /// The notification is dropped if the estimator thread is not keeping
    /// up.
    pub fn notify_request_completed(&self, request: RequestInfo) -> Result<(), NotifyError> {
        self.notify(Command::RequestCompleted(request))
    }

    /// Report a connection type change. Never dropped.
    pub fn on_connection_type_changed(
        &self,
        connection_type: ConnectionType,
    ) -> Result<(), NotifyError> {
        self.control(Command::ConnectionTypeChanged(connection_type))
    }

    /// Signal that the external estimate provider has a new estimate.
    ///
    /// This is how a provider living on another thread reaches the
    /// estimator.
    pub fn on_updated_estimate_available(&self) -> Result<(), NotifyError> {
        self.control(Command::UpdatedEstimateAvailable)
    }

    pub fn set_external_estimate_provider(
        &self,
        provider: Box<dyn ExternalEstimateProvider>,
    ) -> Result<(), NotifyError> {
        self.control(Command::SetExternalEstimateProvider(provider))
    }

    /// Unregister the external estimate provider and get it back.
    pub fn take_external_estimate_provider(
        &self,
    ) -> Result<Option<Box<dyn ExternalEstimateProvider>>> {
        self.query("external estimate provider", Command::TakeExternalEstimateProvider)
    }

    /// Register the observability sink. It is called on the estimator
    /// thread.
    pub fn set_observer(&self, observer: Box<dyn QualityObserver>) -> Result<(), NotifyError> {
        self.control(Command::SetObserver(observer))
    }

    /// Forward the connection type changes of `notifier` to the estimator
    /// for as long as the returned [`Subscription`] lives.
    ///
    /// Changes are sent from the notifying thread, which blocks while the
    /// command queue is full.
    pub fn watch(&self, notifier: &ConnectionTypeNotifier) -> Subscription {
        let handle = self.clone();
        notifier.subscribe(move |connection_type| {
            if let Err(error) = handle.on_connection_type_changed(connection_type) {
                warn!(%error, %connection_type, "Connection type change not delivered");
            }
        })
    }

    pub fn rtt_estimate(&self) -> Result<Option<Duration>> {
        self.query("RTT estimate", Command::RttEstimate)
    }

    pub fn downlink_throughput_kbps_estimate(&self) -> Result<Option<u32>> {
        self.query("throughput estimate", Command::DownlinkThroughputKbpsEstimate)
    }

    pub fn recent_median_rtt(&self, begin: Instant) -> Result<Option<Duration>> {
        self.query("recent median RTT", |reply| {
            Command::RecentMedianRtt(begin, reply)
        })
    }

    pub fn recent_median_downlink_throughput_kbps(&self, begin: Instant) -> Result<Option<u32>> {
        self.query("recent median throughput", |reply| {
            Command::RecentMedianDownlinkThroughputKbps(begin, reply)
        })
    }

    pub fn network_quality(&self) -> Result<NetworkQuality> {
        self.query("network quality", Command::NetworkQuality)
    }

    pub fn peak_quality(&self) -> Result<NetworkQuality> {
        self.query("peak quality", Command::PeakQuality)
    }

    pub fn current_network_id(&self) -> Result<NetworkId> {
        self.query("current network", Command::CurrentNetworkId)
    }

    /// number of request notifications dropped because the estimator
    /// thread was not keeping up
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn notify(&self, command: Command) -> Result<(), NotifyError> {
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(NotifyError::Disconnected),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(NotifyError::Full)
            }
        }
    }

    fn control(&self, command: Command) -> Result<(), NotifyError> {
        self.commands
            .send(command)
            .map_err(|_| NotifyError::Disconnected)
    }

    fn query<T>(&self, what: &str, command: impl FnOnce(SyncSender<T>) -> Command) -> Result<T> {
        let (reply, answer) = sync_channel(1);

        self.commands
            .send(command(reply))
            .map_err(|_| anyhow!("Failed to query the {what}: estimator stopped"))?;

        answer
            .recv()
            .with_context(|| format!("Estimator stopped before answering the {what} query"))
    }
}

impl<C> Actor<C>
where
    C: Clock,
{
    fn inbound(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::HeadersReceived(request) => {
                self.estimator.notify_headers_received(&request);
            }
            Command::RequestCompleted(request) => {
                self.estimator.notify_request_completed(&request);
            }
            Command::ConnectionTypeChanged(connection_type) => {
                self.estimator.on_connection_type_changed(connection_type);
            }
            Command::UpdatedEstimateAvailable => {
                self.estimator.on_updated_estimate_available();
            }
            Command::SetExternalEstimateProvider(provider) => {
                if self
                    .estimator
                    .set_external_estimate_provider(provider)
                    .is_some()
                {
                    debug!("External estimate provider replaced");
                }
            }
            Command::TakeExternalEstimateProvider(reply) => {
                respond(reply, self.estimator.take_external_estimate_provider());
            }
            Command::SetObserver(observer) => {
                self.estimator.set_observer(observer);
            }
            Command::RttEstimate(reply) => respond(reply, self.estimator.rtt_estimate()),
            Command::DownlinkThroughputKbpsEstimate(reply) => {
                respond(reply, self.estimator.downlink_throughput_kbps_estimate());
            }
            Command::RecentMedianRtt(begin, reply) => {
                respond(reply, self.estimator.recent_median_rtt(begin));
            }
            Command::RecentMedianDownlinkThroughputKbps(begin, reply) => {
                respond(
                    reply,
                    self.estimator.recent_median_downlink_throughput_kbps(begin),
                );
            }
            Command::NetworkQuality(reply) => respond(reply, self.estimator.network_quality()),
            Command::PeakQuality(reply) => respond(reply, *self.estimator.peak_quality()),
            Command::CurrentNetworkId(reply) => {
                respond(reply, self.estimator.current_network_id().clone());
            }
            Command::Shutdown => return ControlFlow::Break(()),
        }

        ControlFlow::Continue(())
    }
}

fn respond<T>(reply: SyncSender<T>, value: T) {
    if reply.send(value).is_err() {
        // the requester stopped waiting for the answer
        trace!("Query abandoned");
    }
}

fn actor_run<C>(mut actor: Actor<C>)
where
    C: Clock,
{
    debug!(network = %actor.estimator.current_network_id(), "Estimator thread started");

    // `recv` fails once the context and every handle are dropped
    while let Ok(command) = actor.commands.recv() {
        if actor.inbound(command).is_break() {
            break;
        }
    }

    debug!("Estimator thread stopped");
}
