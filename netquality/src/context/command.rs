use netquality_core::{
    ConnectionType, NetworkId, NetworkQuality, RequestInfo,
    provider::ExternalEstimateProvider, stats::QualityObserver,
};
use std::{
    sync::mpsc::{Receiver, RecvError, SendError, SyncSender, TrySendError, sync_channel},
    time::{Duration, Instant},
};

/// maximum number of commands waiting for the estimator thread
const COMMAND_QUEUE_SIZE: usize = 4_096;

pub(crate) enum Command {
    HeadersReceived(RequestInfo),
    RequestCompleted(RequestInfo),
    ConnectionTypeChanged(ConnectionType),
    UpdatedEstimateAvailable,

    SetExternalEstimateProvider(Box<dyn ExternalEstimateProvider>),
    TakeExternalEstimateProvider(SyncSender<Option<Box<dyn ExternalEstimateProvider>>>),
    SetObserver(Box<dyn QualityObserver>),

    RttEstimate(SyncSender<Option<Duration>>),
    DownlinkThroughputKbpsEstimate(SyncSender<Option<u32>>),
    RecentMedianRtt(Instant, SyncSender<Option<Duration>>),
    RecentMedianDownlinkThroughputKbps(Instant, SyncSender<Option<u32>>),
    NetworkQuality(SyncSender<NetworkQuality>),
    PeakQuality(SyncSender<NetworkQuality>),
    CurrentNetworkId(SyncSender<NetworkId>),

    Shutdown,
}

pub(crate) struct CommandSender(SyncSender<Command>);

pub(crate) struct CommandReceiver(Receiver<Command>);

pub(crate) fn command_channel() -> (CommandSender, CommandReceiver) {
    let (sender, receiver) = sync_channel(COMMAND_QUEUE_SIZE);

    (CommandSender(sender), CommandReceiver(receiver))
}

impl CommandSender {
    /// send without waiting, fails if the queue is full
    pub(crate) fn try_send(&self, command: Command) -> Result<(), TrySendError<Command>> {
        self.0.try_send(command)
    }

    /// send, waiting for room in the queue if needed
    pub(crate) fn send(&self, command: Command) -> Result<(), SendError<Command>> {
        self.0.send(command)
    }
}

impl Clone for CommandSender {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl CommandReceiver {
    pub(crate) fn recv(&self) -> Result<Command, RecvError> {
        self.0.recv()
    }
}
