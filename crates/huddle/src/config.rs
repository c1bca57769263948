//! Server configuration loaded from the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `HUDDLE_ENV` | `development` or `production` | `development` |
//! | `PORT` | listening port | `8080` |
//! | `HUDDLE_BIND_HOST` | listening host | `0.0.0.0` |
//! | `HUDDLE_ORIGINS` | comma-separated origin whitelist | see below |
//! | `HUDDLE_PROBE_INTERVAL_SECS` | liveness interval, `0` disables | `30` |
//!
//! In development an unset `HUDDLE_ORIGINS` falls back to the local dev
//! client. In production it must be set: no deployment's origins are
//! compiled into the binary, so a production server without the variable
//! refuses to start rather than guess which site it serves.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use huddle_liveness::LivenessConfig;

const ENV: &str = "HUDDLE_ENV";
const PORT: &str = "PORT";
const BIND_HOST: &str = "HUDDLE_BIND_HOST";
const ORIGINS: &str = "HUDDLE_ORIGINS";
const PROBE_INTERVAL: &str = "HUDDLE_PROBE_INTERVAL_SECS";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Errors from loading [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable that has no default is unset.
    #[error("environment variable {0} must be set")]
    MissingEnv(&'static str),

    /// A variable is set but can't be parsed.
    #[error("environment variable {key}={value:?} is invalid: expected {expected}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// The set of `Origin` values allowed to open a connection.
///
/// Matching is exact. A handshake without an `Origin` header never
/// matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginWhitelist {
    origins: Vec<String>,
}

impl OriginWhitelist {
    /// The origin the local development client is served from.
    pub const DEVELOPMENT_ORIGIN: &'static str = "http://localhost:3000";

    /// A whitelist of the given origins.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
        }
    }

    /// Only the local development client.
    pub fn development() -> Self {
        Self::new([Self::DEVELOPMENT_ORIGIN])
    }

    /// Parses a comma-separated list, ignoring blanks and surrounding
    /// whitespace.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty()),
        )
    }

    /// Whether a handshake declaring `origin` may connect.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        origin.is_some_and(|origin| self.origins.iter().any(|o| o == origin))
    }

    /// The whitelisted origins.
    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// Returns `true` if no origin is allowed, so every client would be
    /// refused.
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// Everything needed to start a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub environment: Environment,
    pub bind_host: String,
    pub port: u16,
    pub origin_whitelist: OriginWhitelist,
    pub liveness: LivenessConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            origin_whitelist: OriginWhitelist::development(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the config through `lookup`, which returns the value of an
    /// environment variable or `None` if it's unset.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let environment = match lookup(ENV) {
            Some(value) => {
                value.parse::<Environment>().map_err(|()| {
                    ConfigError::InvalidEnv {
                        key: ENV,
                        value,
                        expected: "development or production",
                    }
                })?
            }
            None => Environment::default(),
        };

        let port = match lookup(PORT) {
            Some(value) => {
                value.trim().parse::<u16>().map_err(|_| {
                    ConfigError::InvalidEnv {
                        key: PORT,
                        value,
                        expected: "a port number",
                    }
                })?
            }
            None => DEFAULT_PORT,
        };

        let bind_host = lookup(BIND_HOST)
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let origin_whitelist = match (lookup(ORIGINS), environment) {
            (Some(list), _) => {
                let whitelist = OriginWhitelist::parse(&list);
                if whitelist.is_empty() {
                    return Err(ConfigError::InvalidEnv {
                        key: ORIGINS,
                        value: list,
                        expected: "at least one origin",
                    });
                }
                whitelist
            }
            (None, Environment::Development) => OriginWhitelist::development(),
            (None, Environment::Production) => {
                return Err(ConfigError::MissingEnv(ORIGINS));
            }
        };

        let liveness = match lookup(PROBE_INTERVAL) {
            Some(value) => {
                let secs: u64 = value.trim().parse().map_err(|_| {
                    ConfigError::InvalidEnv {
                        key: PROBE_INTERVAL,
                        value,
                        expected: "a whole number of seconds",
                    }
                })?;
                LivenessConfig::with_interval(Duration::from_secs(secs))
            }
            None => LivenessConfig::default(),
        };

        Ok(Self {
            environment,
            bind_host,
            port,
            origin_whitelist,
            liveness,
        })
    }

    /// `host:port` to bind the listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}
