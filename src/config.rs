//! Endpoint configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Builder-style setters cover
//! programmatic construction in embedding applications and tests.
//!
//! | Variable                      | Endpoint | Default    |
//! |-------------------------------|----------|------------|
//! | `SOCKWRAP_HOST`               | server   | `0.0.0.0`  |
//! | `SOCKWRAP_URL`                | client   | (required) |
//! | `SOCKWRAP_PORT`               | both     | server `9876`, client required |
//! | `SOCKWRAP_PATH`               | both     | `/socket`  |
//! | `SOCKWRAP_REQUIRE_AUTH`       | server   | `false`    |
//! | `SOCKWRAP_BUNDLING`           | server   | `false`    |
//! | `SOCKWRAP_BUNDLE_INTERVAL_MS` | server   | `50`       |
//! | `SOCKWRAP_WIRE_PROFILE`       | both     | `standard` |
//! | `SOCKWRAP_EVENT_CAPACITY`     | both     | `1024`     |

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::SocketError;
use crate::protocol::WireProfile;

/// Default mount path of the socket endpoint.
pub const DEFAULT_PATH: &str = "/socket";

/// Default server port.
pub const DEFAULT_PORT: u16 = 9876;

/// Route of the health check, served next to the socket endpoint.
pub const HEALTH_PATH: &str = "/health";

const DEFAULT_EVENT_CAPACITY: usize = 1024;
const DEFAULT_BUNDLE_INTERVAL_MS: u64 = 50;

/// Server endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Path the WebSocket endpoint is mounted on.
    pub path: String,
    /// Keep new connections pending until they complete the handshake.
    pub require_authentication: bool,
    /// Queue outbound messages and flush them as bundles.
    pub bundling: bool,
    /// Flush period when bundling is enabled.
    pub bundle_interval: Duration,
    /// Key scheme on the wire.
    pub wire_profile: WireProfile,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            require_authentication: false,
            bundling: false,
            bundle_interval: Duration::from_millis(DEFAULT_BUNDLE_INTERVAL_MS),
            wire_profile: WireProfile::Standard,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Config`] if `SOCKWRAP_WIRE_PROFILE` names an
    /// unknown profile or `SOCKWRAP_PATH` does not start with `/`.
    pub fn from_env() -> Result<Self, SocketError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            host: std::env::var("SOCKWRAP_HOST").unwrap_or(defaults.host),
            port: parse_env("SOCKWRAP_PORT", defaults.port),
            path: std::env::var("SOCKWRAP_PATH").unwrap_or(defaults.path),
            require_authentication: parse_env_bool("SOCKWRAP_REQUIRE_AUTH", false),
            bundling: parse_env_bool("SOCKWRAP_BUNDLING", false),
            bundle_interval: Duration::from_millis(parse_env(
                "SOCKWRAP_BUNDLE_INTERVAL_MS",
                DEFAULT_BUNDLE_INTERVAL_MS,
            )),
            wire_profile: wire_profile_from_env()?,
            event_capacity: parse_env("SOCKWRAP_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the mount path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enables or disables the authentication handshake.
    #[must_use]
    pub fn with_authentication(mut self, required: bool) -> Self {
        self.require_authentication = required;
        self
    }

    /// Enables or disables outbound bundling.
    #[must_use]
    pub fn with_bundling(mut self, enabled: bool) -> Self {
        self.bundling = enabled;
        self
    }

    /// Selects the wire profile.
    #[must_use]
    pub fn with_wire_profile(mut self, profile: WireProfile) -> Self {
        self.wire_profile = profile;
        self
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Config`] if `host:port` is not a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, SocketError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| SocketError::Config(format!("invalid listen address: {e}")))
    }

    /// Checks invariants not expressible in the types.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Config`] if the path does not start with `/`
    /// or collides with the `/health` route.
    pub fn validate(&self) -> Result<(), SocketError> {
        validate_path(&self.path)?;
        if self.path == HEALTH_PATH {
            return Err(SocketError::Config(format!(
                "path {HEALTH_PATH} is reserved"
            )));
        }
        Ok(())
    }
}

/// Client endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host or URL (`example.com`, `http://example.com`, `wss://…`).
    pub url: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Path the server endpoint is mounted on.
    pub path: String,
    /// Key scheme on the wire.
    pub wire_profile: WireProfile,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            port: None,
            path: DEFAULT_PATH.to_string(),
            wire_profile: WireProfile::Standard,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `url:port` with default path.
    #[must_use]
    pub fn new(url: impl Into<String>, port: u16) -> Self {
        Self {
            url: Some(url.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// `SOCKWRAP_URL` and `SOCKWRAP_PORT` are left unset when absent; the
    /// client reports that when it starts.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Config`] if `SOCKWRAP_WIRE_PROFILE` names an
    /// unknown profile.
    pub fn from_env() -> Result<Self, SocketError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            url: std::env::var("SOCKWRAP_URL").ok(),
            port: std::env::var("SOCKWRAP_PORT")
                .ok()
                .and_then(|v| v.parse().ok()),
            path: std::env::var("SOCKWRAP_PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()),
            wire_profile: wire_profile_from_env()?,
            event_capacity: parse_env("SOCKWRAP_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY),
        })
    }

    /// Sets the mount path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Selects the wire profile.
    #[must_use]
    pub fn with_wire_profile(mut self, profile: WireProfile) -> Self {
        self.wire_profile = profile;
        self
    }

    /// Builds the WebSocket URL `ws(s)://host:port/path`.
    ///
    /// `http` becomes `ws`, `https` becomes `wss`, and a bare host gets
    /// `ws://`.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::TransportUnavailable`] if url or port is
    /// missing, or [`SocketError::Config`] for an invalid path.
    pub fn endpoint_url(&self) -> Result<String, SocketError> {
        let (Some(url), Some(port)) = (self.url.as_deref(), self.port) else {
            return Err(SocketError::TransportUnavailable(
                "url or port not defined".to_string(),
            ));
        };
        validate_path(&self.path)?;

        let base = url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            format!("ws://{base}")
        };
        Ok(format!("{base}:{port}{}", self.path))
    }
}

fn validate_path(path: &str) -> Result<(), SocketError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(SocketError::Config(format!(
            "path must start with '/': {path}"
        )))
    }
}

fn wire_profile_from_env() -> Result<WireProfile, SocketError> {
    std::env::var("SOCKWRAP_WIRE_PROFILE")
        .ok()
        .map_or(Ok(WireProfile::Standard), |v| v.parse())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.path, "/socket");
        assert!(!config.require_authentication);
        assert!(!config.bundling);
        assert_eq!(config.wire_profile, WireProfile::Standard);
        assert!(config.listen_addr().is_ok());
    }

    #[test]
    fn server_rejects_relative_path() {
        let config = ServerConfig::default().with_path("socket");
        assert!(matches!(config.validate(), Err(SocketError::Config(_))));
    }

    #[test]
    fn server_rejects_health_path() {
        let config = ServerConfig::default().with_path(HEALTH_PATH);
        assert!(matches!(config.validate(), Err(SocketError::Config(_))));
    }

    #[test]
    fn client_requires_url_and_port() {
        let config = ClientConfig::default();
        assert!(matches!(
            config.endpoint_url(),
            Err(SocketError::TransportUnavailable(_))
        ));
    }

    #[test]
    fn client_url_schemes_are_mapped() {
        let cases = [
            ("localhost", "ws://localhost:9876/socket"),
            ("http://example.com", "ws://example.com:9876/socket"),
            ("https://example.com/", "wss://example.com:9876/socket"),
            ("wss://example.com", "wss://example.com:9876/socket"),
        ];
        for (url, expected) in cases {
            let config = ClientConfig::new(url, 9876);
            assert_eq!(config.endpoint_url().ok().as_deref(), Some(expected));
        }
    }

    #[test]
    fn client_custom_path() {
        let config = ClientConfig::new("127.0.0.1", 8080).with_path("/echo");
        assert_eq!(
            config.endpoint_url().ok().as_deref(),
            Some("ws://127.0.0.1:8080/echo")
        );
    }
}
