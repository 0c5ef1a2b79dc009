//! Runtime Notifier
//!
//! The notifier turns one tag change into one notify cycle.
//!
//! # How It Works
//!
//! 1. Collect the subscribers of the changed tag.
//!
//! 2. Walk the reverse edges breadth-first: every formula tag whose current
//!    dependency set contains a visited tag is visited too, and its
//!    subscribers are collected. Each tag is visited once, however many
//!    paths lead to it.
//!
//! 3. Invoke the collected callbacks in collection order, each at most once.
//!
//! Callbacks run in an untracked scope: a cycle can start in the middle of a
//! formula evaluation, and what a callback reads is not that formula's
//! business.
//!
//! Callbacks are collected before any of them runs. A callback may
//! unsubscribe another, set a cell or read a formula; the current cycle is
//! unaffected, and any mutation it makes starts its own nested cycle.
//!
//! Nothing is recomputed here. Formulas stay lazy and notice they are stale
//! the next time someone reads them.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::trace;

use super::subscriber::{Callback, SubscriptionId};
use super::tag::{FormulaTag, TagCore, Tagged};
use super::tracker::untracked;

/// Run a notify cycle for `target` without changing its revision.
///
/// [`MutableTag::mark`](super::MutableTag::mark) calls this after bumping
/// the revision; it is public so that callers can re-announce a tag.
pub fn notify<T>(target: &T)
where
    T: Tagged + ?Sized,
{
    let tag = target.as_tag();
    notify_core(tag.core());
}

pub(crate) fn notify_core(origin: &TagCore) {
    let mut scheduled: IndexMap<SubscriptionId, Callback> = IndexMap::new();
    let mut visited = HashSet::from([origin.id()]);
    let mut queue: VecDeque<FormulaTag> = VecDeque::new();

    origin.subscriptions().schedule_into(&mut scheduled);
    queue.extend(origin.dependents());

    while let Some(formula) = queue.pop_front() {
        if !visited.insert(formula.id()) {
            continue;
        }

        formula.core().subscriptions().schedule_into(&mut scheduled);
        queue.extend(formula.core().dependents());
    }

    trace!(
        tag = %origin.id(),
        formulas = visited.len() - 1,
        callbacks = scheduled.len(),
        "notify cycle"
    );

    untracked(|| {
        for callback in scheduled.into_values() {
            callback();
        }
    });
}
