use std::{fmt, str::FromStr};
use thiserror::Error;

/// The kind of connection the host is currently using.
///
/// The set of connection types is closed: adding a variant forces every
/// `match` on it, including the default estimates table, to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionType {
    #[default]
    Unknown,
    Ethernet,
    Wifi,
    Cellular2G,
    Cellular3G,
    Cellular4G,
    None,
    Bluetooth,
}

/// Error returned when parsing a [`ConnectionType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown connection type `{0}'")]
pub struct ConnectionTypeParseError(String);

impl ConnectionType {
    /// every connection type, in declaration order
    pub const ALL: [Self; 8] = [
        Self::Unknown,
        Self::Ethernet,
        Self::Wifi,
        Self::Cellular2G,
        Self::Cellular3G,
        Self::Cellular4G,
        Self::None,
        Self::Bluetooth,
    ];

    /// The name of the connection type as used in the variation
    /// parameters (e.g. `"WiFi"` in `"WiFi.DefaultMedianRTTMsec"`).
    ///
    /// ```
    /// # use netquality_core::network::ConnectionType;
    /// assert_eq!(ConnectionType::Wifi.name(), "WiFi");
    /// assert_eq!(ConnectionType::Cellular4G.name(), "4G");
    /// ```
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Ethernet => "Ethernet",
            Self::Wifi => "WiFi",
            Self::Cellular2G => "2G",
            Self::Cellular3G => "3G",
            Self::Cellular4G => "4G",
            Self::None => "None",
            Self::Bluetooth => "Bluetooth",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnectionType {
    type Err = ConnectionTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|connection_type| connection_type.name() == s)
            .ok_or_else(|| ConnectionTypeParseError(s.to_owned()))
    }
}
