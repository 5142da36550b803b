//! Seams to the outside world.
//!
//! The core consumes a clock (for sync cutoffs) and an identifier source
//! (for request correlation). Both are traits so tests can pin them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> SystemTime;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Generator of request identifiers.
///
/// # Requirements
///
/// - Identifiers MUST be unique for the lifetime of the process
/// - An identifier MUST never be handed out twice
pub trait RequestIdGenerator: Send + Sync + 'static {
    /// Produce a fresh identifier.
    fn next_id(&self) -> String;
}

/// Random (v4) UUID identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl RequestIdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Monotonic identifiers with a fixed prefix (`prefix-1`, `prefix-2`, ...).
///
/// Deterministic, which makes it convenient in tests and logs.
#[derive(Debug)]
pub struct SequentialGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialGenerator {
    /// Create a generator whose identifiers start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl RequestIdGenerator for SequentialGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
