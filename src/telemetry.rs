//! Structured telemetry for protocol anomalies.
//!
//! UDP delivers whatever it delivers: duplicated fragments, responses for
//! retired sequences, roster rows that contradict the notification stream.
//! Instead of scattering `tracing::warn!` calls, anomalies are structured
//! records that can be:
//!
//! - Logged via tracing (default behavior)
//! - Collected programmatically for testing
//! - Sent to custom observers (metrics, alerting)
//!
//! # Example
//!
//! ```
//! use bercon::telemetry::CollectingObserver;
//!
//! let observer = CollectingObserver::new();
//! // ... run some operations against the observer ...
//! assert!(observer.violations().is_empty(), "unexpected anomalies");
//! ```

use parking_lot::Mutex;

/// Severity of a protocol anomaly.
///
/// Severities are ordered from least to most severe, allowing filtering
/// and comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable - processing continued with a fallback.
    Warning,
    /// Serious issue - a frame or message was discarded.
    Error,
    /// Critical invariant broken - session state may be inconsistent.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of protocol anomalies, one per subsystem.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`; always include a wildcard arm
/// when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Frame envelope or payload structure violated the wire format.
    Framing,
    /// Sequence-space anomaly: unexpected, stale, or conflicting sequence
    /// numbers.
    Sequencing,
    /// Multi-part reassembly anomaly: conflicting part counts, out-of-range
    /// indexes, expired buffers.
    Reassembly,
    /// Session lifecycle anomaly: frames arriving in states that should
    /// not see them.
    SessionLifecycle,
    /// The roster tables and the notification stream disagree.
    RosterConsistency,
    /// An internal invariant failed. Please report these as bugs.
    InternalError,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Framing => "framing",
            Self::Sequencing => "sequencing",
            Self::Reassembly => "reassembly",
            Self::SessionLifecycle => "session_lifecycle",
            Self::RosterConsistency => "roster_consistency",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded protocol anomaly.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SpecViolation {
    /// How severe the anomaly is.
    pub severity: ViolationSeverity,
    /// Which subsystem reported it.
    pub kind: ViolationKind,
    /// Human-readable description with the relevant values.
    pub message: String,
    /// `file:line` of the reporting site.
    pub location: &'static str,
}

impl SpecViolation {
    /// Creates a new violation record.
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
        }
    }
}

impl std::fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.severity, self.kind, self.message, self.location
        )
    }
}

/// Receives anomaly records as they are reported.
pub trait ViolationObserver: Send + Sync {
    /// Called once per reported anomaly.
    fn on_violation(&self, violation: &SpecViolation);
}

/// The default observer: routes anomalies to `tracing` at a level matching
/// their severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    kind = violation.kind.as_str(),
                    location = violation.location,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    kind = violation.kind.as_str(),
                    severity = violation.severity.as_str(),
                    location = violation.location,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// An observer that stores every anomaly for later inspection.
///
/// Intended for tests: run a scenario, then assert on the collected set.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    collected: Mutex<Vec<SpecViolation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every anomaly collected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<SpecViolation> {
        self.collected.lock().clone()
    }

    /// Returns `true` if any collected anomaly has the given kind.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.collected.lock().iter().any(|v| v.kind == kind)
    }

    /// Discards everything collected so far.
    pub fn clear(&self) {
        self.collected.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        self.collected.lock().push(violation.clone());
    }
}

/// Reports a protocol anomaly through the default [`TracingObserver`].
///
/// # Example
///
/// ```ignore
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::Reassembly,
///     "part count changed for sequence {} ({} -> {})",
///     sequence, stored_total, total
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample(kind: ViolationKind) -> SpecViolation {
        SpecViolation::new(
            ViolationSeverity::Warning,
            kind,
            "test anomaly",
            "telemetry.rs:1",
        )
    }

    #[test]
    fn severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn severity_labels() {
        assert_eq!(ViolationSeverity::Warning.as_str(), "warning");
        assert_eq!(ViolationSeverity::Critical.to_string(), "critical");
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ViolationKind::Framing.as_str(), "framing");
        assert_eq!(ViolationKind::RosterConsistency.to_string(), "roster_consistency");
    }

    #[test]
    fn violation_display_includes_all_parts() {
        let v = sample(ViolationKind::Sequencing);
        let s = v.to_string();
        assert!(s.contains("warning"));
        assert!(s.contains("sequencing"));
        assert!(s.contains("test anomaly"));
        assert!(s.contains("telemetry.rs:1"));
    }

    #[test]
    fn collecting_observer_collects() {
        let observer = CollectingObserver::new();
        assert!(observer.violations().is_empty());

        observer.on_violation(&sample(ViolationKind::Framing));
        observer.on_violation(&sample(ViolationKind::Reassembly));

        assert_eq!(observer.violations().len(), 2);
        assert!(observer.has_violation(ViolationKind::Framing));
        assert!(observer.has_violation(ViolationKind::Reassembly));
        assert!(!observer.has_violation(ViolationKind::InternalError));

        observer.clear();
        assert!(observer.violations().is_empty());
    }

    #[test]
    fn report_macro_compiles_with_and_without_args() {
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::Framing,
            "plain message"
        );
        report_violation!(
            ViolationSeverity::Error,
            ViolationKind::Sequencing,
            "formatted {} message",
            42
        );
    }
}
