//! Structured reporting of protocol anomalies.
//!
//! The protocol normalizes a handful of unexpected situations instead of
//! failing: a negative token arriving with a handoff is reset, a handoff for
//! somebody else is ignored, and so on. Each of those is recorded as a
//! [`ProtocolViolation`] and handed to a [`ViolationObserver`]. By default
//! they are logged through `tracing`; tests plug in a [`CollectingObserver`].
//!
//! # Example
//!
//! ```
//! use hot_potato::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! // ... run a game with `GameBuilder::with_violation_observer(observer.clone())` ...
//! assert!(!observer.has_violation(ViolationKind::Transport));
//! ```

use crate::PeerId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a protocol violation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable. The peer continued with a fallback.
    Warning,
    /// The message was discarded.
    Error,
    /// A local invariant is broken and the game outcome may be wrong.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging.
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

/// Categories of protocol violations.
///
/// This enum is `#[non_exhaustive]`; always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// A message arrived that the turn state machine did not expect.
    ///
    /// Examples:
    /// - A handoff carrying a negative token
    /// - A handoff addressed to another peer reaching a non-coordinator
    /// - A game-over notice reaching a non-coordinator
    Protocol,
    /// A configuration value that is accepted but degenerate.
    Configuration,
    /// The transport delivered something unusable.
    ///
    /// Example: a sender id outside the ring.
    Transport,
    /// A local invariant was found broken.
    Invariant,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded protocol violation.
///
/// # Example
///
/// ```
/// use hot_potato::telemetry::{ProtocolViolation, ViolationKind, ViolationSeverity};
/// use hot_potato::PeerId;
///
/// let violation = ProtocolViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Protocol,
///     "negative token on handoff",
///     "peer.rs:42",
/// )
/// .with_peer(PeerId::new(2))
/// .with_context("token", "-3");
///
/// assert_eq!(violation.peer, Some(PeerId::new(2)));
/// assert!(violation.to_string().contains("peer=2"));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProtocolViolation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The category of this violation.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// The peer that detected the violation, if known.
    pub peer: Option<PeerId>,
    /// Additional structured context as key-value pairs.
    pub context: BTreeMap<String, String>,
}

impl ProtocolViolation {
    /// Creates a new protocol violation.
    #[must_use]
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
            peer: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the peer that detected this violation.
    #[must_use]
    pub fn with_peer(mut self, peer: PeerId) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes this violation to a JSON string.
    ///
    /// Returns `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(peer) = self.peer {
            write!(f, ", peer={peer}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Trait for observing protocol violations.
///
/// Observers are shared between peer threads, so they must be `Send + Sync`.
///
/// # Example
///
/// ```
/// use hot_potato::telemetry::{ProtocolViolation, ViolationObserver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingObserver(AtomicUsize);
///
/// impl ViolationObserver for CountingObserver {
///     fn on_violation(&self, _violation: &ProtocolViolation) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called when a protocol violation is detected.
    fn on_violation(&self, violation: &ProtocolViolation);
}

/// Built-in observer that logs violations via the `tracing` crate.
///
/// `Warning` maps to `tracing::warn!`, `Error` and `Critical` to
/// `tracing::error!`. Severity, kind, location, peer and context are emitted
/// as structured fields.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn format_peer(peer: Option<PeerId>) -> String {
        match peer {
            None => "null".to_owned(),
            Some(peer) => peer.to_string(),
        }
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &ProtocolViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let peer = Self::format_peer(violation.peer);

        let context_str = if violation.context.is_empty() {
            "{}".to_owned()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    peer = %peer,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            }
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    peer = %peer,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            }
        }
    }
}

/// Built-in observer that collects violations for testing.
///
/// # Example
///
/// ```
/// use hot_potato::telemetry::{
///     CollectingObserver, ProtocolViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&ProtocolViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Protocol,
///     "test violation",
///     "test.rs:1",
/// ));
///
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::Protocol));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<ProtocolViolation>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer with an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<ProtocolViolation> {
        self.violations.lock().clone()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of the specified kind has been collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Returns all violations matching the specified kind.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<ProtocolViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &ProtocolViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Reports a violation to an optional observer, falling back to [`TracingObserver`] if `None`.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &ProtocolViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation through the default [`TracingObserver`], recording
/// the current file and line.
///
/// ```
/// use hot_potato::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::Configuration,
///     "max decrement {} never lets the token go negative", 1);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a violation through an optional observer, falling back to
/// [`TracingObserver`](crate::telemetry::TracingObserver).
///
/// The `peer = ...` form tags the violation with the peer that saw it.
///
/// ```text
/// report_violation_to!(observer, severity, kind, "message");
/// report_violation_to!(observer, peer = id, severity, kind, "message with {}", args);
/// ```
///
/// ```
/// use hot_potato::{report_violation_to, telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity}};
/// use hot_potato::PeerId;
/// use std::sync::Arc;
///
/// let collector = Arc::new(CollectingObserver::new());
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
///
/// report_violation_to!(&observer, peer = PeerId::new(1), ViolationSeverity::Warning,
///     ViolationKind::Protocol, "handoff addressed to peer {}", 2);
/// assert_eq!(collector.violations()[0].peer, Some(PeerId::new(1)));
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, peer = $peer:expr, context = [$(($key:literal, $value:expr)),+ $(,)?], $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        )
        .with_peer($peer)
        $(.with_context($key, $value.to_string()))+;
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, peer = $peer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        )
        .with_peer($peer);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, peer = $peer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        )
        .with_peer($peer);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Asserts that no violations have been collected.
///
/// # Panics
///
/// Panics if the observer contains any violations, printing them for debugging.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};

    ($observer:expr, $msg:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "{}\nExpected no violations, but found {}:\n{:#?}",
            $msg,
            violations.len(),
            violations
        );
    }};
}

/// Asserts that a violation of the specified kind was collected.
///
/// # Panics
///
/// Panics if no violation of the specified kind was found.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn warning(message: &str) -> ProtocolViolation {
        ProtocolViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::Protocol,
            message,
            "test.rs:1",
        )
    }

    #[test]
    fn test_violation_severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn test_violation_kind_as_str() {
        assert_eq!(ViolationKind::Protocol.as_str(), "protocol");
        assert_eq!(ViolationKind::Configuration.as_str(), "configuration");
        assert_eq!(ViolationKind::Transport.as_str(), "transport");
        assert_eq!(ViolationKind::Invariant.as_str(), "invariant");
    }

    #[test]
    fn test_violation_builder_and_display() {
        let violation = ProtocolViolation::new(
            ViolationSeverity::Error,
            ViolationKind::Transport,
            "sender out of range",
            "test.rs:10",
        )
        .with_peer(PeerId::new(3))
        .with_context("sender", "9");

        assert_eq!(violation.peer, Some(PeerId::new(3)));
        assert_eq!(violation.context.get("sender"), Some(&"9".to_owned()));

        let display = violation.to_string();
        assert!(display.contains("error/transport"));
        assert!(display.contains("sender out of range"));
        assert!(display.contains("test.rs:10"));
        assert!(display.contains("peer=3"));
    }

    #[test]
    fn test_collecting_observer() {
        let observer = CollectingObserver::new();
        assert!(observer.is_empty());

        observer.on_violation(&warning("first"));
        observer.on_violation(&ProtocolViolation::new(
            ViolationSeverity::Error,
            ViolationKind::Transport,
            "second",
            "test.rs:2",
        ));

        assert_eq!(observer.len(), 2);
        assert!(observer.has_violation(ViolationKind::Protocol));
        assert!(!observer.has_violation(ViolationKind::Invariant));
        assert_eq!(observer.violations_of_kind(ViolationKind::Transport).len(), 1);
    }

    #[test]
    fn test_report_to_observer_falls_back_to_tracing() {
        let observer = Arc::new(CollectingObserver::new());
        report_to_observer(Some(&observer), &warning("to collector"));
        assert_eq!(observer.len(), 1);

        // Goes to the tracing observer and must not panic.
        report_to_observer(None::<&Arc<CollectingObserver>>, &warning("to tracing"));
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn test_report_violation_to_macro_records_location_and_peer() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());

        crate::report_violation_to!(
            &observer,
            peer = PeerId::new(4),
            ViolationSeverity::Warning,
            ViolationKind::Protocol,
            "token {} reset",
            -2
        );
        crate::report_violation_to!(
            &observer,
            ViolationSeverity::Error,
            ViolationKind::Transport,
            "plain"
        );

        let violations = collector.violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].message, "token -2 reset");
        assert_eq!(violations[0].peer, Some(PeerId::new(4)));
        assert!(violations[0].location.contains("telemetry.rs"));
        assert_eq!(violations[1].peer, None);
        assert_violation!(collector, ViolationKind::Transport);
    }

    #[test]
    fn test_report_violation_to_macro_attaches_context() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());

        crate::report_violation_to!(
            observer,
            peer = PeerId::new(2),
            context = [("sender", PeerId::new(1)), ("token", -4)],
            ViolationSeverity::Warning,
            ViolationKind::Protocol,
            "handoff from peer {} carried negative token {}",
            1,
            -4
        );

        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].context.get("sender"), Some(&"1".to_owned()));
        assert_eq!(violations[0].context.get("token"), Some(&"-4".to_owned()));
        assert!(violations[0].to_string().contains("context="));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json() {
        let json = warning("as json")
            .with_peer(PeerId::new(1))
            .to_json()
            .unwrap();
        assert!(json.contains(r#""severity":"warning""#));
        assert!(json.contains(r#""kind":"protocol""#));
        assert!(json.contains(r#""peer":1"#));
    }
}
