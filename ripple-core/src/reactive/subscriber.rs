//! Subscriptions
//!
//! A subscription is a zero-argument callback attached to one tag. It fires
//! whenever a notify cycle reaches that tag: when the tag itself is marked,
//! or, for a formula tag, when something it depends on is marked.
//!
//! Subscribing returns an [`Unsubscribe`] handle. Calling it removes exactly
//! the subscription it was created for. Dropping the handle without calling
//! it leaves the subscription in place.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::trace;

use super::tag::{TagId, Tagged};

pub(crate) type Callback = Rc<dyn Fn()>;

/// Unique identifier for a subscription.
///
/// Subscribing the same callback twice yields two independent IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The callbacks registered on one tag.
#[derive(Default)]
pub(crate) struct SubscriptionSet {
    entries: RefCell<IndexMap<SubscriptionId, Callback>>,
}

impl SubscriptionSet {
    fn insert(&self, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.entries.borrow_mut().insert(id, callback);
        id
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.entries.borrow_mut().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Copy every callback into `scheduled`, skipping IDs already there.
    pub(crate) fn schedule_into(&self, scheduled: &mut IndexMap<SubscriptionId, Callback>) {
        for (id, callback) in self.entries.borrow().iter() {
            scheduled.entry(*id).or_insert_with(|| Rc::clone(callback));
        }
    }
}

/// Handle returned by [`subscribe`].
pub struct Unsubscribe {
    id: SubscriptionId,
    tag: TagId,
    set: Weak<SubscriptionSet>,
}

impl Unsubscribe {
    /// The subscription this handle removes.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription.
    ///
    /// Returns `false` if it was already gone. Callbacks already scheduled
    /// by a notify cycle in progress still run; future cycles skip it.
    pub fn unsubscribe(&self) -> bool {
        let removed = self
            .set
            .upgrade()
            .is_some_and(|set| set.remove(self.id));

        if removed {
            trace!(tag = %self.tag, subscription = ?self.id, "unsubscribed");
        }
        removed
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

/// Register `callback` to run whenever `target`'s tag is notified.
///
/// Nothing fires at subscription time.
pub fn subscribe<T, F>(target: &T, callback: F) -> Unsubscribe
where
    T: Tagged + ?Sized,
    F: Fn() + 'static,
{
    let tag = target.as_tag();
    let set = tag.core().subscriptions();
    let id = set.insert(Rc::new(callback));
    trace!(tag = %tag.id(), subscription = ?id, "subscribed");

    Unsubscribe {
        id,
        tag: tag.id(),
        set: Rc::downgrade(set),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::MutableTag;
    use std::sync::atomic::{AtomicBool, AtomicI32};
    use std::sync::Arc;

    #[test]
    fn subscription_ids_are_unique() {
        let id1 = SubscriptionId::new();
        let id2 = SubscriptionId::new();
        let id3 = SubscriptionId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscribe_does_not_fire_immediately() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let tag = MutableTag::new();
        let _handle = subscribe(&tag, move || {
            called_clone.store(true, Ordering::SeqCst);
        });

        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(tag.as_tag().subscriber_count(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_its_own_callback() {
        let call_count = Arc::new(AtomicI32::new(0));
        let tag = MutableTag::new();

        let first = {
            let call_count = call_count.clone();
            subscribe(&tag, move || {
                call_count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = {
            let call_count = call_count.clone();
            subscribe(&tag, move || {
                call_count.fetch_add(10, Ordering::SeqCst);
            })
        };

        assert!(first.unsubscribe());
        assert!(!first.unsubscribe());

        tag.mark().unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 10);

        assert!(second.unsubscribe());
        tag.mark().unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn same_callback_twice_is_two_subscriptions() {
        let call_count = Arc::new(AtomicI32::new(0));
        let callback = {
            let call_count = call_count.clone();
            Rc::new(move || {
                call_count.fetch_add(1, Ordering::SeqCst);
            })
        };

        let tag = MutableTag::new();
        let first = {
            let callback = callback.clone();
            subscribe(&tag, move || callback())
        };
        let second = {
            let callback = callback.clone();
            subscribe(&tag, move || callback())
        };

        assert_ne!(first.id(), second.id());
        assert_eq!(tag.as_tag().subscriber_count(), 2);

        tag.mark().unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        // Removing one leaves the other firing once per mark
        assert!(first.unsubscribe());
        tag.mark().unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 3);

        assert!(second.unsubscribe());
        tag.mark().unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_after_tag_dropped_is_noop() {
        let tag = MutableTag::new();
        let handle = subscribe(&tag, || {});

        drop(tag);
        assert!(!handle.unsubscribe());
    }

    #[test]
    fn schedule_into_skips_known_ids() {
        let set = SubscriptionSet::default();
        let id = set.insert(Rc::new(|| {}));

        let mut scheduled = IndexMap::new();
        set.schedule_into(&mut scheduled);
        set.schedule_into(&mut scheduled);

        assert_eq!(scheduled.len(), 1);
        assert!(scheduled.contains_key(&id));
    }
}
