//! Session configuration.
//!
//! The defaults implement the protocol's published timing contract: the
//! server drops silent clients after 45 seconds, so the keep-alive cadence
//! and the watchdog must both stay well inside that budget.

use std::time::Duration;

use crate::error::RconError;
use crate::RconResult;

/// Shortest permitted roster poll interval.
pub const MIN_PLAYER_UPDATE_INTERVAL: Duration = Duration::from_secs(1);
/// Longest permitted roster poll interval; beyond this the roster would go
/// stale against the server's own bookkeeping.
pub const MAX_PLAYER_UPDATE_INTERVAL: Duration = Duration::from_secs(40);

/// How long to wait for the login status reply.
pub(crate) const LOGIN_DEADLINE: Duration = Duration::from_secs(5);
/// Fixed delay before a reconnect attempt.
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Idle span after which a keep-alive command is emitted. Must undercut
/// the server's 45 s inactivity cut with margin for loss and resends.
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Options for an [`RconClient`](crate::RconClient).
///
/// # Example
///
/// ```
/// use bercon::RconConfig;
/// use std::time::Duration;
///
/// let config = RconConfig::new("192.168.1.10", 2302, "secret")
///     .with_auto_reconnect(false)
///     .with_player_update_interval(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "RconConfig has no effect unless passed to RconClient"]
pub struct RconConfig {
    /// Server hostname or address.
    pub host: String,
    /// Server RCON port.
    pub port: u16,
    /// The RCON password.
    pub password: String,
    /// Whether the session reconnects after an unplanned close.
    ///
    /// Default: `true`. An invalid password always disables the reconnect
    /// regardless of this setting.
    pub auto_reconnect: bool,
    /// How often the roster is polled with `players`.
    ///
    /// Default: 5 s. Clamped to
    /// [`MIN_PLAYER_UPDATE_INTERVAL`]..=[`MAX_PLAYER_UPDATE_INTERVAL`].
    pub player_update_interval: Duration,
    /// How long the session tolerates inbound silence before closing.
    ///
    /// Default: 10 s. Must stay at or below the server's 45 s budget.
    pub idle_limit: Duration,
}

impl RconConfig {
    /// Creates a configuration with protocol-default timing.
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            auto_reconnect: true,
            player_update_interval: Duration::from_secs(5),
            idle_limit: Duration::from_secs(10),
        }
    }

    /// Sets whether the session reconnects after an unplanned close.
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Sets the roster poll interval. Values outside the permitted range
    /// are clamped when the session uses them.
    pub fn with_player_update_interval(mut self, interval: Duration) -> Self {
        self.player_update_interval = interval;
        self
    }

    /// Sets the inbound idle limit.
    pub fn with_idle_limit(mut self, idle_limit: Duration) -> Self {
        self.idle_limit = idle_limit;
        self
    }

    /// The roster poll interval with the permitted bounds applied.
    #[must_use]
    pub fn clamped_player_update_interval(&self) -> Duration {
        self.player_update_interval
            .clamp(MIN_PLAYER_UPDATE_INTERVAL, MAX_PLAYER_UPDATE_INTERVAL)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::InvalidConfig`] when the host or password is
    /// empty, the port is zero, or the idle limit is zero.
    pub fn validate(&self) -> RconResult<()> {
        if self.host.is_empty() {
            return Err(RconError::InvalidConfig {
                info: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(RconError::InvalidConfig {
                info: "port must be non-zero".to_string(),
            });
        }
        if self.password.is_empty() {
            return Err(RconError::InvalidConfig {
                info: "password must not be empty".to_string(),
            });
        }
        if self.idle_limit.is_zero() {
            return Err(RconError::InvalidConfig {
                info: "idle limit must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RconConfig::new("localhost", 2302, "pw");
        assert!(config.auto_reconnect);
        assert_eq!(config.player_update_interval, Duration::from_secs(5));
        assert_eq!(config.idle_limit, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn poll_interval_clamped_to_bounds() {
        let config = RconConfig::new("h", 1, "pw")
            .with_player_update_interval(Duration::from_millis(100));
        assert_eq!(
            config.clamped_player_update_interval(),
            MIN_PLAYER_UPDATE_INTERVAL
        );

        let config =
            RconConfig::new("h", 1, "pw").with_player_update_interval(Duration::from_secs(600));
        assert_eq!(
            config.clamped_player_update_interval(),
            MAX_PLAYER_UPDATE_INTERVAL
        );

        let config =
            RconConfig::new("h", 1, "pw").with_player_update_interval(Duration::from_secs(7));
        assert_eq!(
            config.clamped_player_update_interval(),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn rejects_empty_fields() {
        assert!(RconConfig::new("", 2302, "pw").validate().is_err());
        assert!(RconConfig::new("h", 0, "pw").validate().is_err());
        assert!(RconConfig::new("h", 2302, "").validate().is_err());
        assert!(RconConfig::new("h", 2302, "pw")
            .with_idle_limit(Duration::ZERO)
            .validate()
            .is_err());
    }
}
