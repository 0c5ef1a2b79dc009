//! Formula Implementation
//!
//! A Formula is a cached derived value. It recomputes lazily, on read, and
//! only when something it read last time has changed since.
//!
//! # How Formulas Work
//!
//! 1. Reading a formula first consumes its tag, so an enclosing formula
//!    records it as a dependency.
//!
//! 2. If the tag is fresh, the cached value is returned. Freshness is a
//!    single comparison per dependency: is any dependency's revision newer
//!    than the one the formula recorded?
//!
//! 3. Otherwise the body runs inside a new evaluation frame. Every cell or
//!    formula it reads is collected, and the collected set replaces the
//!    previous dependencies. The recorded revision becomes the newest
//!    revision among them, or a fresh bump if there are none.
//!
//! # Failure
//!
//! A fallible body (see [`Formula::try_new`]) that returns an error leaves
//! the cached value, the dependencies and the recorded revision exactly as
//! they were. The frame is popped by its guard, the error goes back to the
//! reader, and the next read retries the same recomputation. A panicking
//! body unwinds through the same guard.
//!
//! A formula must not read itself, directly or through other formulas.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::{debug, trace};

use super::revision::bump;
use super::tag::{FormulaTag, Tag, Tagged};
use super::tracker::EvaluationFrame;

struct FormulaInner<T, E> {
    compute: Box<dyn Fn() -> Result<T, E>>,
    value: RefCell<Option<T>>,
    tag: FormulaTag,
}

/// A cached derived value that recomputes only when its dependencies change.
///
/// # Type Parameters
///
/// - `T`: The computed value. Reads return clones of the cached value.
/// - `E`: The error a fallible body may return. Infallible by default.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Cell, Formula};
///
/// let width = Cell::new(3);
/// let height = Cell::new(4);
///
/// let (w, h) = (width.clone(), height.clone());
/// let area = Formula::new(move || w.read() * h.read());
///
/// assert_eq!(area.get(), 12);
///
/// width.set(5).unwrap();
/// assert!(area.is_stale());
/// assert_eq!(area.get(), 20);
/// ```
pub struct Formula<T: 'static, E: 'static = Infallible>(Rc<FormulaInner<T, E>>);

impl<T> Formula<T, Infallible>
where
    T: Clone + 'static,
{
    /// Create a new formula from an infallible body.
    ///
    /// The body does not run until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::try_new(move || Ok(compute()))
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        match self.read() {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T, E> Formula<T, E>
where
    T: Clone + 'static,
    E: 'static,
{
    /// Create a new formula from a fallible body.
    ///
    /// The body does not run until the first read.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T, E> + 'static,
    {
        Self(Rc::new(FormulaInner {
            compute: Box::new(compute),
            value: RefCell::new(None),
            tag: FormulaTag::new(),
        }))
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a formula. If called during
    /// another formula's evaluation, this formula becomes one of its
    /// dependencies, even when the body fails.
    pub fn read(&self) -> Result<T, E> {
        self.0.tag.consume();

        if !self.is_stale() {
            if let Some(value) = self.0.value.borrow().as_ref() {
                return Ok(value.clone());
            }
        }

        self.recompute()
    }

    /// Run the body in a fresh evaluation frame and install the result.
    fn recompute(&self) -> Result<T, E> {
        let frame = EvaluationFrame::begin();

        let value = match (self.0.compute)() {
            Ok(value) => value,
            Err(err) => {
                debug!(tag = %self.0.tag.id(), "formula evaluation failed");
                return Err(err);
            }
        };

        let dependencies = frame.finish();
        let revision = dependencies.latest().unwrap_or_else(bump);
        trace!(
            tag = %self.0.tag.id(),
            dependencies = dependencies.len(),
            %revision,
            "formula recomputed"
        );

        // Store before `updated`: the first update notifies, and subscribers
        // may read this formula right away.
        *self.0.value.borrow_mut() = Some(value.clone());
        self.0.tag.updated(dependencies, revision);

        Ok(value)
    }

    /// Whether the next read will run the body.
    pub fn is_stale(&self) -> bool {
        self.0.tag.is_stale()
    }

    /// Check if the formula has a cached value.
    pub fn has_value(&self) -> bool {
        self.0.value.borrow().is_some()
    }

    /// The tag backing this formula.
    pub fn tag(&self) -> &FormulaTag {
        &self.0.tag
    }
}

impl<T: 'static, E: 'static> Clone for Formula<T, E> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static, E: 'static> Tagged for Formula<T, E> {
    fn as_tag(&self) -> Tag {
        self.0.tag.as_tag()
    }
}

impl<T, E> Debug for Formula<T, E>
where
    T: Debug + 'static,
    E: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("value", &*self.0.value.borrow())
            .field("tag", &self.0.tag)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
