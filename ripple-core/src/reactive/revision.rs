//! Revision Clock
//!
//! A process-wide counter that orders every mutation. `now()` observes the
//! current revision; `bump()` advances it and returns the new value, so
//! anything marked with a bumped revision is strictly newer than everything
//! that happened before.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The global clock. Starts at 1 so that `Revision::ZERO` predates
/// everything.
static CLOCK: AtomicU64 = AtomicU64::new(1);

/// A point in the global mutation order.
///
/// Revisions are totally ordered and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    /// A revision older than any the clock will ever produce.
    pub const ZERO: Revision = Revision(0);

    /// Get the raw counter value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Get the current revision without advancing the clock.
pub fn now() -> Revision {
    Revision(CLOCK.load(Ordering::SeqCst))
}

/// Advance the clock and return the new revision.
pub fn bump() -> Revision {
    Revision(CLOCK.fetch_add(1, Ordering::SeqCst) + 1)
}
