//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ConfigError, Credentials, DEFAULT_TRUEDATA_URL, FeedSettings, ProviderKind, RelayConfig,
    ServerSettings, StreamSettings, TrueDataSettings,
};
