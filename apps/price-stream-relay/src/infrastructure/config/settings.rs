//! Relay Configuration Settings
//!
//! Configuration types for the price relay, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Upstream feed implementation selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// TrueData WebSocket feed.
    #[default]
    TrueData,
    /// In-process random-walk feed for local development.
    Simulated,
}

impl ProviderKind {
    /// Parse provider kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "simulated" | "sim" => Self::Simulated,
            _ => Self::TrueData,
        }
    }

    /// Get the provider name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TrueData => "truedata",
            Self::Simulated => "simulated",
        }
    }
}

/// Upstream feed credentials.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(user: String, password: String) -> Self {
        Self { user, password }
    }

    /// Get the user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Get the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// TrueData endpoint settings.
#[derive(Debug, Clone)]
pub struct TrueDataSettings {
    /// WebSocket endpoint, without query string.
    pub url: String,
    /// Login credentials.
    pub credentials: Credentials,
}

/// Default TrueData real-time endpoint.
pub const DEFAULT_TRUEDATA_URL: &str = "wss://push.truedata.in:8084";

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Top-level field carrying the market status in upstream messages.
    pub market_status_key: String,
    /// Interval between keep-alive / status-poll requests.
    pub keepalive_interval: Duration,
    /// Silence after which the connection is considered dead.
    pub idle_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier (1.0 = fixed delay).
    pub reconnect_delay_multiplier: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            market_status_key: "NSE_EQ".to_string(),
            keepalive_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_secs(5),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 1.0,
        }
    }
}

/// Client stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Base dispatch tick.
    pub dispatch_tick: Duration,
    /// Market status is emitted every this many ticks.
    pub status_every_ticks: u32,
    /// Per-client outbound buffer, in events.
    pub buffer: usize,
    /// Idle time after which a client without open streams is evicted.
    pub subscription_ttl: Duration,
    /// How often the eviction sweep runs.
    pub eviction_interval: Duration,
    /// Reject subscription updates naming unknown symbols.
    pub validate_symbols: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            dispatch_tick: Duration::from_secs(1),
            status_every_ticks: 5,
            buffer: 16,
            subscription_ttl: Duration::from_secs(3600),
            eviction_interval: Duration::from_secs(60),
            validate_symbols: false,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Application HTTP port (subscription updates and streams).
    pub http_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 5000,
            health_port: 8082,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Selected upstream provider.
    pub provider: ProviderKind,
    /// TrueData settings; present when the TrueData provider is selected.
    pub truedata: Option<TrueDataSettings>,
    /// Optional symbol directory file; the built-in NSE list is used otherwise.
    pub symbol_directory_path: Option<PathBuf>,
    /// Server port settings.
    pub server: ServerSettings,
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Client stream settings.
    pub streams: StreamSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty, or if a
    /// duration or the reconnect multiplier is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let provider = lookup("FEED_PROVIDER")
            .map(|s| ProviderKind::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let truedata = match provider {
            ProviderKind::TrueData => {
                let user = env.required("TRUEDATA_USER")?;
                let password = env.required("TRUEDATA_PASSWORD")?;
                Some(TrueDataSettings {
                    url: lookup("TRUEDATA_URL")
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| DEFAULT_TRUEDATA_URL.to_string()),
                    credentials: Credentials::new(user, password),
                })
            }
            ProviderKind::Simulated => None,
        };

        let symbol_directory_path = lookup("SYMBOL_DIRECTORY_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            http_port: env.parse("RELAY_HTTP_PORT", server_defaults.http_port),
            health_port: env.parse("RELAY_HEALTH_PORT", server_defaults.health_port),
        };

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            market_status_key: lookup("MARKET_STATUS_KEY")
                .filter(|v| !v.is_empty())
                .unwrap_or(feed_defaults.market_status_key),
            keepalive_interval: env.duration_secs(
                "RELAY_KEEPALIVE_INTERVAL_SECS",
                feed_defaults.keepalive_interval,
            )?,
            idle_timeout: env.duration_secs("RELAY_IDLE_TIMEOUT_SECS", feed_defaults.idle_timeout)?,
            reconnect_delay_initial: env.duration_millis(
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                feed_defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.duration_secs(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                feed_defaults.reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.multiplier(
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                feed_defaults.reconnect_delay_multiplier,
            )?,
        };

        let stream_defaults = StreamSettings::default();
        let streams = StreamSettings {
            dispatch_tick: env.duration_millis("RELAY_DISPATCH_TICK_MS", stream_defaults.dispatch_tick)?,
            status_every_ticks: env.parse(
                "RELAY_STATUS_EVERY_TICKS",
                stream_defaults.status_every_ticks,
            ),
            buffer: env.parse("RELAY_STREAM_BUFFER", stream_defaults.buffer),
            subscription_ttl: env.duration_secs(
                "RELAY_SUBSCRIPTION_TTL_SECS",
                stream_defaults.subscription_ttl,
            )?,
            eviction_interval: env.duration_secs(
                "RELAY_EVICTION_INTERVAL_SECS",
                stream_defaults.eviction_interval,
            )?,
            validate_symbols: env.bool("RELAY_VALIDATE_SYMBOLS", stream_defaults.validate_symbols),
        };

        Ok(Self {
            provider,
            truedata,
            symbol_directory_path,
            server,
            feed,
            streams,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is set to a value the relay cannot run with.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with the value.
        reason: &'static str,
    },
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        (self.0)(key).map_or(default, |v| {
            matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.non_zero(key, default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.non_zero(key, default, Duration::from_millis)
    }

    /// Unparseable values fall back to `default`; an explicit zero is an error.
    fn non_zero(
        &self,
        key: &str,
        default: Duration,
        unit: fn(u64) -> Duration,
    ) -> Result<Duration, ConfigError> {
        match (self.0)(key).and_then(|v| v.trim().parse::<u64>().ok()) {
            Some(0) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "must be greater than zero",
            }),
            Some(n) => Ok(unit(n)),
            None => Ok(default),
        }
    }

    fn multiplier(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let value = self.parse(key, default);
        if !value.is_finite() || value < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "must be a finite number of at least 1.0",
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn provider_kind_parsing() {
        assert_eq!(
            ProviderKind::from_str_case_insensitive("simulated"),
            ProviderKind::Simulated
        );
        assert_eq!(
            ProviderKind::from_str_case_insensitive("SIM"),
            ProviderKind::Simulated
        );
        assert_eq!(
            ProviderKind::from_str_case_insensitive("truedata"),
            ProviderKind::TrueData
        );
        assert_eq!(
            ProviderKind::from_str_case_insensitive("unknown"),
            ProviderKind::TrueData
        );
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("trader".to_string(), "hunter2".to_string());
        let debug = format!("{creds:?}");
        assert!(debug.contains("trader"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn truedata_requires_credentials() {
        let err = RelayConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "TRUEDATA_USER"));

        let err = RelayConfig::from_lookup(lookup(&[
            ("TRUEDATA_USER", "u"),
            ("TRUEDATA_PASSWORD", ""),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref k) if k == "TRUEDATA_PASSWORD"));
    }

    #[test]
    fn simulated_needs_no_credentials() {
        let config = RelayConfig::from_lookup(lookup(&[("FEED_PROVIDER", "simulated")])).unwrap();
        assert_eq!(config.provider, ProviderKind::Simulated);
        assert!(config.truedata.is_none());
    }

    #[test]
    fn defaults_applied() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("TRUEDATA_USER", "u"),
            ("TRUEDATA_PASSWORD", "p"),
        ]))
        .unwrap();

        let truedata = config.truedata.unwrap();
        assert_eq!(truedata.url, DEFAULT_TRUEDATA_URL);
        assert_eq!(truedata.credentials.user(), "u");
        assert_eq!(config.feed.market_status_key, "NSE_EQ");
        assert_eq!(config.feed.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.feed.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_secs(5));
        assert!((config.feed.reconnect_delay_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.streams.dispatch_tick, Duration::from_secs(1));
        assert_eq!(config.streams.status_every_ticks, 5);
        assert!(!config.streams.validate_symbols);
        assert_eq!(config.server.http_port, 5000);
        assert_eq!(config.server.health_port, 8082);
        assert!(config.symbol_directory_path.is_none());
    }

    #[test]
    fn overrides_applied() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("FEED_PROVIDER", "simulated"),
            ("MARKET_STATUS_KEY", "NSE_FO"),
            ("SYMBOL_DIRECTORY_PATH", "/etc/relay/symbols.json"),
            ("RELAY_HTTP_PORT", "8080"),
            ("RELAY_KEEPALIVE_INTERVAL_SECS", "10"),
            ("RELAY_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("RELAY_RECONNECT_DELAY_MULTIPLIER", "2.0"),
            ("RELAY_DISPATCH_TICK_MS", "500"),
            ("RELAY_STREAM_BUFFER", "4"),
            ("RELAY_VALIDATE_SYMBOLS", "true"),
        ]))
        .unwrap();

        assert_eq!(config.feed.market_status_key, "NSE_FO");
        assert_eq!(
            config.symbol_directory_path,
            Some(PathBuf::from("/etc/relay/symbols.json"))
        );
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.feed.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_millis(250));
        assert!((config.feed.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.streams.dispatch_tick, Duration::from_millis(500));
        assert_eq!(config.streams.buffer, 4);
        assert!(config.streams.validate_symbols);
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("FEED_PROVIDER", "simulated"),
            ("RELAY_HTTP_PORT", "not-a-port"),
            ("RELAY_STATUS_EVERY_TICKS", "-3"),
        ]))
        .unwrap();
        assert_eq!(config.server.http_port, 5000);
        assert_eq!(config.streams.status_every_ticks, 5);
    }

    fn invalid_key(vars: &[(&str, &str)]) -> String {
        let mut all = vec![("FEED_PROVIDER", "simulated")];
        all.extend_from_slice(vars);
        match RelayConfig::from_lookup(lookup(&all)) {
            Err(ConfigError::InvalidValue { key, .. }) => key,
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn zero_durations_rejected() {
        for key in [
            "RELAY_DISPATCH_TICK_MS",
            "RELAY_KEEPALIVE_INTERVAL_SECS",
            "RELAY_IDLE_TIMEOUT_SECS",
            "RELAY_EVICTION_INTERVAL_SECS",
            "RELAY_SUBSCRIPTION_TTL_SECS",
            "RELAY_RECONNECT_DELAY_INITIAL_MS",
            "RELAY_RECONNECT_DELAY_MAX_SECS",
        ] {
            assert_eq!(invalid_key(&[(key, "0")]), key);
        }
    }

    #[test]
    fn shrinking_or_non_finite_multiplier_rejected() {
        for value in ["0", "0.5", "-2", "NaN", "inf"] {
            assert_eq!(
                invalid_key(&[("RELAY_RECONNECT_DELAY_MULTIPLIER", value)]),
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                "value {value}"
            );
        }
    }
}
