//! Reactive Primitives
//!
//! This module implements the dependency-tracking core: revisions, tags,
//! cells, formulas and subscriptions.
//!
//! # Concepts
//!
//! ## Revisions
//!
//! A single monotonically increasing counter orders every mutation. Each
//! tag remembers the revision at which it last changed, and staleness is
//! always decided by comparing two of these integers. There is no eager
//! graph walk on read: a formula's effective revision is memoised until the
//! clock moves or some formula on the thread recomputes.
//!
//! ## Cells
//!
//! A Cell is a container for mutable state backed by a mutable tag. Reading
//! it inside a formula evaluation records the tag as a dependency; setting
//! it to a different value bumps the tag's revision and notifies.
//!
//! ## Formulas
//!
//! A Formula is a derived value backed by a formula tag. It recomputes
//! lazily, on read, and only when one of the tags consumed during its last
//! evaluation is newer than the revision it recorded.
//!
//! ## Subscriptions
//!
//! Any tag can carry subscriber callbacks. Marking a mutable tag fires its
//! own subscribers and those of every formula that currently depends on it,
//! directly or through other formulas, exactly once per cycle.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded and synchronous. The consumption
//! tracker is a thread-local stack of evaluation frames, pushed and popped
//! by a guard so that nested evaluation and unwinding both leave it
//! balanced. Subscriber callbacks run in an untracked scope on top of that
//! stack.

mod cell;
mod formula;
mod revision;
mod runtime;
mod subscriber;
mod tag;
mod tracker;

pub use cell::{Cell, Equality};
pub use formula::Formula;
pub use revision::{bump, now, Revision};
pub use runtime::notify;
pub use subscriber::{subscribe, SubscriptionId, Unsubscribe};
pub use tag::{Dependencies, FormulaTag, MutableState, MutableTag, Tag, TagId, Tagged};
pub use tracker::{frame_depth, is_tracking, untracked, EvaluationFrame};

pub use crate::error::ReactiveError;
