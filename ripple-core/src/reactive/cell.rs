//! Cell Implementation
//!
//! A Cell is the fundamental piece of reactive storage. It holds a value and
//! exclusively owns the mutable tag that versions it.
//!
//! # How Cells Work
//!
//! 1. Reading a cell inside a formula evaluation consumes its tag, which
//!    records the cell as a dependency of that formula.
//!
//! 2. Setting a cell compares the new value with the current one. An equal
//!    value is a no-op: no revision bump, no notification.
//!
//! 3. A different value is stored, the tag is marked, and every subscriber
//!    reachable from the tag is notified before `set` returns.
//!
//! # Freezing
//!
//! A frozen cell can never change. Reads stop registering as dependencies,
//! and any write that would change the value fails with
//! [`ReactiveError::FrozenMutation`].

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::debug;

use super::tag::{MutableTag, Tag, Tagged};
use crate::error::{ReactiveError, Result};

/// Equality used by a cell to decide whether a write is a change.
pub type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

struct CellInner<T> {
    value: RefCell<T>,
    equals: Equality<T>,
    tag: MutableTag,
}

/// A reactive cell holding a value of type T.
///
/// Cloning produces another handle to the same cell, which is how formula
/// bodies capture the cells they read.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Cell;
///
/// let count = Cell::new(0);
///
/// assert!(count.set(5).unwrap());
/// assert!(!count.set(5).unwrap());
/// assert_eq!(count.read(), 5);
/// ```
pub struct Cell<T: 'static>(Rc<CellInner<T>>);

impl<T> Cell<T>
where
    T: PartialEq + 'static,
{
    /// Create a new cell compared with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, <T as PartialEq>::eq)
    }
}

impl<T: 'static> Cell<T> {
    /// Create a new cell with a custom equality.
    pub fn with_equality<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self(Rc::new(CellInner {
            value: RefCell::new(value),
            equals: Box::new(equals),
            tag: MutableTag::new(),
        }))
    }

    /// Get the current value.
    ///
    /// If called during a formula evaluation, this also records the cell
    /// as a dependency of that formula.
    pub fn read(&self) -> T
    where
        T: Clone,
    {
        self.with(<T as Clone>::clone)
    }

    /// Borrow the current value, recording the dependency like
    /// [`read`](Self::read).
    ///
    /// `f` must not write to this cell.
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.0.tag.consume();
        f(&*self.0.value.borrow())
    }

    /// Set a new value.
    ///
    /// Returns `Ok(false)` without notifying if the value is equal to the
    /// current one. Otherwise stores it, marks the tag and returns
    /// `Ok(true)` once every subscriber has been notified.
    pub fn set(&self, value: T) -> Result<bool> {
        if (self.0.equals)(&*self.0.value.borrow(), &value) {
            return Ok(false);
        }

        if self.0.tag.is_frozen() {
            debug!(tag = %self.0.tag.id(), "rejected write to frozen cell");
            return Err(ReactiveError::FrozenMutation {
                tag: self.0.tag.id(),
            });
        }

        // Drop the previous value outside the borrow
        let previous = self.0.value.replace(value);
        drop(previous);

        self.0.tag.mark()?;
        Ok(true)
    }

    /// Update the value using a function of the current value.
    ///
    /// The current value is inspected without being consumed, so updating a
    /// cell inside a formula does not make the formula depend on it.
    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&*self.0.value.borrow());
        self.set(next)
    }

    /// Freeze the cell. Freezing twice is the same as freezing once.
    pub fn freeze(&self) {
        self.0.tag.freeze();
    }

    /// Whether the cell has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.0.tag.is_frozen()
    }

    /// The tag backing this cell.
    pub fn tag(&self) -> &MutableTag {
        &self.0.tag
    }
}

impl<T: 'static> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> Tagged for Cell<T> {
    fn as_tag(&self) -> Tag {
        self.0.tag.as_tag()
    }
}

impl<T> Debug for Cell<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("value", &*self.0.value.borrow())
            .field("tag", &self.0.tag)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
