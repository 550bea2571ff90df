mod cache;
mod connection_type;
mod id;
mod quality;

pub use self::{
    cache::NetworkQualityCache,
    connection_type::{ConnectionType, ConnectionTypeParseError},
    id::NetworkId,
    quality::{CachedNetworkQuality, NetworkQuality},
};
