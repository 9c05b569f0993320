//! Per-instance identity, lifecycle state, and cached values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rainode_protocol::parse_numeric;

/// Opaque identity of one registered measure instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle phase of an instance. Stored as an atomic alongside the
/// lifecycle lock so hot-path reads (update gating) never contend with a
/// reload in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
}

impl LifecycleState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Initialized,
            _ => LifecycleState::Uninitialized,
        }
    }
}

/// Cooperative cancellation flag shared with in-flight waits.
///
/// Cancellation never interrupts a subprocess call mid-flight; waiters poll
/// the flag between timeout slices and abandon the wait when it flips.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The last known numeric and string results of an instance.
///
/// Values survive timeouts and failed calls; callers always read something,
/// at worst stale.
#[derive(Debug, Clone, Default)]
pub struct CachedValues {
    number: f64,
    string: String,
    has_string: bool,
}

impl CachedValues {
    /// Absorb a result payload. The string value always takes the payload;
    /// the numeric value only moves when the payload parses, so a
    /// non-numeric result leaves the last good number in place.
    pub fn apply(&mut self, payload: &str) {
        self.string = payload.to_string();
        self.has_string = !payload.is_empty();
        if let Some(number) = parse_numeric(payload) {
            self.number = number;
        }
    }

    pub fn number(&self) -> f64 {
        self.number
    }

    /// The string value, or `None` when no non-empty result has arrived
    /// since the last reset. Callers fall back to the numeric value then.
    pub fn string(&self) -> Option<String> {
        if self.has_string {
            Some(self.string.clone())
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_payload_moves_both_values() {
        let mut values = CachedValues::default();
        values.apply("42");
        assert_eq!(values.number(), 42.0);
        assert_eq!(values.string().as_deref(), Some("42"));
    }

    #[test]
    fn non_numeric_payload_keeps_last_number() {
        let mut values = CachedValues::default();
        values.apply("3.5");
        values.apply("hello");
        assert_eq!(values.number(), 3.5);
        assert_eq!(values.string().as_deref(), Some("hello"));
    }

    #[test]
    fn empty_payload_clears_the_string_value() {
        let mut values = CachedValues::default();
        values.apply("something");
        values.apply("");
        assert_eq!(values.string(), None);
    }

    #[test]
    fn reset_returns_to_defaults() {
        let mut values = CachedValues::default();
        values.apply("9");
        values.reset();
        assert_eq!(values.number(), 0.0);
        assert_eq!(values.string(), None);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
