use crate::network::ConnectionType;
use std::fmt;

/// Identifies a distinguishable network.
///
/// Two [`NetworkId`]s are the same network if both the connection type and
/// the identity are equal. The identity is the WiFi SSID, the cellular
/// operator, or empty when it could not be resolved. A network with an
/// empty identity is never cached.
///
/// ```
/// # use netquality_core::network::{ConnectionType, NetworkId};
/// let home = NetworkId::new(ConnectionType::Wifi, "home");
/// assert_eq!(home, NetworkId::new(ConnectionType::Wifi, "home"));
/// assert_ne!(home, NetworkId::new(ConnectionType::Ethernet, "home"));
/// assert_eq!(home.to_string(), "WiFi(home)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NetworkId {
    connection_type: ConnectionType,
    identity: String,
}

impl NetworkId {
    pub fn new(connection_type: ConnectionType, identity: impl Into<String>) -> Self {
        Self {
            connection_type,
            identity: identity.into(),
        }
    }

    /// a network of the given type whose identity is not known
    pub fn anonymous(connection_type: ConnectionType) -> Self {
        Self::new(connection_type, String::new())
    }

    #[inline]
    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// `true` if the identity of the network was resolved
    #[inline]
    pub fn has_identity(&self) -> bool {
        !self.identity.is_empty()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_identity() {
            write!(f, "{}({})", self.connection_type, self.identity)
        } else {
            self.connection_type.fmt(f)
        }
    }
}
