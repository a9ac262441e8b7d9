//! Service Configuration Settings
//!
//! Configuration types for the price stream, loaded from environment
//! variables. Parsing goes through a lookup function so it can be tested
//! without touching the process environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::pricing::WalkConfig;

/// Bearer tokens accepted by the stream endpoint, keyed by token.
#[derive(Clone, Default)]
pub struct ApiTokens {
    logins_by_token: HashMap<String, String>,
}

impl ApiTokens {
    /// Build from `(login, token)` pairs.
    #[must_use]
    pub fn new<I, L, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        Self {
            logins_by_token: pairs
                .into_iter()
                .map(|(login, token)| (token.into(), login.into()))
                .collect(),
        }
    }

    /// Parse `login:token` pairs separated by commas.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a pair is malformed.
    pub fn parse(key: &str, raw: &str) -> Result<Self, ConfigError> {
        let mut pairs = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((login, token)) = entry.split_once(':') else {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "expected login:token".to_string(),
                });
            };
            let (login, token) = (login.trim(), token.trim());
            if login.is_empty() || token.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "login and token must both be non-empty".to_string(),
                });
            }
            pairs.push((login.to_string(), token.to_string()));
        }

        if pairs.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(Self::new(pairs))
    }

    /// Login owning `token`, if any.
    #[must_use]
    pub fn login_for(&self, token: &str) -> Option<&str> {
        self.logins_by_token.get(token).map(String::as_str)
    }

    /// Number of configured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logins_by_token.len()
    }

    /// Whether no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logins_by_token.is_empty()
    }
}

impl std::fmt::Debug for ApiTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiTokens")
            .field("count", &self.logins_by_token.len())
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

/// An asset and the price it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAsset {
    /// Asset name.
    pub name: String,
    /// Starting price.
    pub price: Decimal,
}

impl SeedAsset {
    /// Create a seed entry.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }

    /// Parse `name=price` pairs separated by commas.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a pair is malformed or a
    /// price is not a positive decimal.
    pub fn parse_list(key: &str, raw: &str) -> Result<Vec<Self>, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            reason,
        };

        let mut assets = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, price) = entry
                .split_once('=')
                .ok_or_else(|| invalid(format!("expected name=price, got {entry:?}")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid(format!("missing asset name in {entry:?}")));
            }
            let price = Decimal::from_str(price.trim())
                .map_err(|e| invalid(format!("bad price for {name}: {e}")))?;
            if price <= Decimal::ZERO {
                return Err(invalid(format!("price for {name} must be positive")));
            }
            assets.push(Self::new(name, price));
        }
        Ok(assets)
    }
}

/// Assets seeded when no `PRICE_STREAM_ASSETS` is given.
#[must_use]
pub fn default_assets() -> Vec<SeedAsset> {
    vec![
        SeedAsset::new("white_wool", Decimal::new(45, 0)),
        SeedAsset::new("black_wool", Decimal::new(42, 0)),
    ]
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP API and WebSocket port.
    pub api_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_port: 8002,
            health_port: 8082,
        }
    }
}

/// Subscriber stream settings.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Longest a single outbound write may take.
    pub write_deadline: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            write_deadline: Duration::from_secs(1),
        }
    }
}

/// Broadcast hub settings.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Capacity of the price change ingress channel.
    pub ingress_capacity: usize,
    /// Capacity of the register and remove channels.
    pub control_capacity: usize,
    /// Capacity of each subscriber's outbound queue.
    pub queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            ingress_capacity: 1024,
            control_capacity: 256,
            queue_capacity: 1,
        }
    }
}

/// Per-group request rates.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Allowed `GET /rates` requests per second, shared by all callers.
    pub rates_per_second: f64,
    /// Allowed stream connects per second, per login.
    pub stream_connects_per_second: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            rates_per_second: 20.0,
            stream_connects_per_second: 1.0,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Accepted bearer tokens.
    pub api_tokens: ApiTokens,
    /// Assets and their starting prices.
    pub assets: Vec<SeedAsset>,
    /// Server port settings.
    pub server: ServerSettings,
    /// Subscriber stream settings.
    pub stream: StreamSettings,
    /// Broadcast hub settings.
    pub broadcast: BroadcastSettings,
    /// Price walk settings.
    pub walk: WalkConfig,
    /// Rate limit settings.
    pub rate_limits: RateLimitSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or a value is
    /// malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);

        let raw_tokens = env
            .get("PRICE_STREAM_API_TOKENS")
            .ok_or_else(|| ConfigError::MissingEnvVar("PRICE_STREAM_API_TOKENS".to_string()))?;
        if raw_tokens.trim().is_empty() {
            return Err(ConfigError::EmptyValue(
                "PRICE_STREAM_API_TOKENS".to_string(),
            ));
        }
        let api_tokens = ApiTokens::parse("PRICE_STREAM_API_TOKENS", &raw_tokens)?;

        let assets = match env.get("PRICE_STREAM_ASSETS") {
            Some(raw) => SeedAsset::parse_list("PRICE_STREAM_ASSETS", &raw)?,
            None => default_assets(),
        };
        if assets.is_empty() {
            return Err(ConfigError::EmptyValue("PRICE_STREAM_ASSETS".to_string()));
        }

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            api_port: env.parse_or("PRICE_STREAM_API_PORT", server_defaults.api_port),
            health_port: env.parse_or("PRICE_STREAM_HEALTH_PORT", server_defaults.health_port),
        };

        let stream = StreamSettings {
            write_deadline: env.millis_or(
                "PRICE_STREAM_WRITE_DEADLINE_MS",
                StreamSettings::default().write_deadline,
            ),
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            ingress_capacity: env.parse_or(
                "PRICE_STREAM_INGRESS_CAPACITY",
                broadcast_defaults.ingress_capacity,
            ),
            control_capacity: env.parse_or(
                "PRICE_STREAM_CONTROL_CAPACITY",
                broadcast_defaults.control_capacity,
            ),
            queue_capacity: env.parse_or(
                "PRICE_STREAM_QUEUE_CAPACITY",
                broadcast_defaults.queue_capacity,
            ),
        };

        let walk_defaults = WalkConfig::default();
        let walk = WalkConfig {
            min_change_interval: env.millis_or(
                "PRICE_STREAM_MIN_CHANGE_INTERVAL_MS",
                walk_defaults.min_change_interval,
            ),
            max_change_interval: env.millis_or(
                "PRICE_STREAM_MAX_CHANGE_INTERVAL_MS",
                walk_defaults.max_change_interval,
            ),
            max_swing: env
                .parse_or::<Decimal>(
                    "PRICE_STREAM_MAX_SWING_PCT",
                    walk_defaults.max_swing * Decimal::ONE_HUNDRED,
                )
                / Decimal::ONE_HUNDRED,
            min_cycle: env.millis_or("PRICE_STREAM_MIN_CYCLE_MS", walk_defaults.min_cycle),
            cycles_per_interval: walk_defaults.cycles_per_interval,
        };
        walk.validate().map_err(|e| ConfigError::InvalidValue {
            key: "PRICE_STREAM_*_CHANGE_INTERVAL_MS / PRICE_STREAM_MAX_SWING_PCT".to_string(),
            reason: e.to_string(),
        })?;

        let rate_defaults = RateLimitSettings::default();
        let rate_limits = RateLimitSettings {
            rates_per_second: env
                .positive_f64_or("PRICE_STREAM_RATES_RPS", rate_defaults.rates_per_second),
            stream_connects_per_second: env.positive_f64_or(
                "PRICE_STREAM_STREAM_CONNECT_RPS",
                rate_defaults.stream_connects_per_second,
            ),
        };

        Ok(Self {
            api_tokens,
            assets,
            server,
            stream,
            broadcast,
            walk,
            rate_limits,
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
    /// Environment variable could not be interpreted.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Offending variable.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis_or(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn positive_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config =
            ServiceConfig::from_lookup(lookup_from(&[("PRICE_STREAM_API_TOKENS", "ana:s3cret")]))
                .unwrap();

        assert_eq!(config.server.api_port, 8002);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.stream.write_deadline, Duration::from_secs(1));
        assert_eq!(config.broadcast.queue_capacity, 1);
        assert_eq!(config.walk, WalkConfig::default());
        assert!((config.rate_limits.rates_per_second - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.assets, default_assets());
        assert_eq!(config.api_tokens.login_for("s3cret"), Some("ana"));
    }

    #[test]
    fn missing_tokens_is_an_error() {
        let result = ServiceConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(key)) if key == "PRICE_STREAM_API_TOKENS"));
    }

    #[test]
    fn blank_tokens_is_an_error() {
        let result = ServiceConfig::from_lookup(lookup_from(&[("PRICE_STREAM_API_TOKENS", "  ")]));
        assert!(matches!(result, Err(ConfigError::EmptyValue(_))));
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("PRICE_STREAM_API_TOKENS", "ana:a1, ben:b2"),
            ("PRICE_STREAM_ASSETS", "toothpaste=8.5,olive_oil=127"),
            ("PRICE_STREAM_API_PORT", "9000"),
            ("PRICE_STREAM_WRITE_DEADLINE_MS", "250"),
            ("PRICE_STREAM_QUEUE_CAPACITY", "4"),
            ("PRICE_STREAM_MAX_SWING_PCT", "2.5"),
            ("PRICE_STREAM_RATES_RPS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.api_tokens.len(), 2);
        assert_eq!(config.api_tokens.login_for("b2"), Some("ben"));
        assert_eq!(
            config.assets,
            vec![
                SeedAsset::new("toothpaste", Decimal::new(85, 1)),
                SeedAsset::new("olive_oil", Decimal::new(127, 0)),
            ]
        );
        assert_eq!(config.server.api_port, 9000);
        assert_eq!(config.stream.write_deadline, Duration::from_millis(250));
        assert_eq!(config.broadcast.queue_capacity, 4);
        assert_eq!(config.walk.max_swing, Decimal::new(25, 3));
        assert!((config.rate_limits.rates_per_second - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("PRICE_STREAM_API_TOKENS", "ana:a1"),
            ("PRICE_STREAM_API_PORT", "not-a-port"),
            ("PRICE_STREAM_RATES_RPS", "-3"),
        ]))
        .unwrap();

        assert_eq!(config.server.api_port, 8002);
        assert!((config.rate_limits.rates_per_second - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_assets_are_rejected() {
        for raw in ["white_wool", "white_wool=abc", "white_wool=-1", "=4"] {
            let result = ServiceConfig::from_lookup(lookup_from(&[
                ("PRICE_STREAM_API_TOKENS", "ana:a1"),
                ("PRICE_STREAM_ASSETS", raw),
            ]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn inverted_change_intervals_are_rejected() {
        let result = ServiceConfig::from_lookup(lookup_from(&[
            ("PRICE_STREAM_API_TOKENS", "ana:a1"),
            ("PRICE_STREAM_MIN_CHANGE_INTERVAL_MS", "9000"),
            ("PRICE_STREAM_MAX_CHANGE_INTERVAL_MS", "1000"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn malformed_token_pair_is_rejected() {
        assert!(matches!(
            ApiTokens::parse("KEY", "ana"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ApiTokens::parse("KEY", "ana:"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn api_tokens_redacted_debug() {
        let tokens = ApiTokens::new([("ana", "s3cret")]);
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("ana"));
        assert!(debug.contains("[REDACTED]"));
    }
}
