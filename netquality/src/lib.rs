/*!
# Network Quality Estimator

Host integration of [`netquality_core`]: the estimator runs on its own
thread ([`EstimatorContext`]) and the rest of the host talks to it through
[`EstimatorHandle`]s. Connection type changes are pushed by a
[`ConnectionTypeNotifier`].

```
use netquality::{ConnectionTypeNotifier, EstimatorContext};
use netquality_core::{
    ConnectionType, EstimatorConfig, NetworkId, NetworkQualityEstimator, provider::FixedNetwork,
};

# fn main() -> anyhow::Result<()> {
let estimator = NetworkQualityEstimator::new(
    EstimatorConfig::default(),
    FixedNetwork::new(NetworkId::new(ConnectionType::Wifi, "home")),
);
let context = EstimatorContext::new(estimator)?;
let handle = context.handle();

let notifier = ConnectionTypeNotifier::new();
let _subscription = handle.watch(&notifier);

notifier.notify_connection_type_changed(ConnectionType::Ethernet);
assert_eq!(handle.current_network_id()?.connection_type(), ConnectionType::Ethernet);

context.shutdown()
# }
```
*/

mod context;
mod notifier;

// convenient re-export of `netquality_core` core objects
pub use netquality_core::{
    ConnectionType, EstimatorConfig, NetworkId, NetworkQuality, NetworkQualityEstimator, Request,
    RequestInfo,
};

pub use self::{
    context::{EstimatorContext, EstimatorHandle, NotifyError},
    notifier::{ConnectionTypeNotifier, Subscription},
};
