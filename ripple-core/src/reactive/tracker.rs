//! Consumption Tracker
//!
//! The tracker records which tags a formula reads while its body runs, so
//! the formula's dependency set never has to be declared by hand.
//!
//! # Implementation
//!
//! We use a thread-local stack of evaluation frames. A formula pushes a
//! frame before running its body and pops it afterwards; every tag consumed
//! in between lands in the top frame. Consuming with no frame on the stack
//! is a no-op, so top-level reads are never tracked.
//!
//! Frames are owned by an [`EvaluationFrame`] guard. Finishing the guard
//! pops the frame and hands back what it collected. Dropping it unfinished
//! (an early return through `?`, or a panic) pops and discards, so the stack
//! stays balanced on every exit path.
//!
//! # Untracked Scopes
//!
//! [`untracked`] pushes a frame that records nothing. Reads inside it are
//! invisible to the formula underneath, while a formula evaluated inside it
//! still pushes its own frame on top and tracks normally. The notifier runs
//! subscriber callbacks in such a scope, since a notification can fire in
//! the middle of an evaluation.

use std::cell::RefCell;

use smallvec::SmallVec;
use tracing::trace;

use super::tag::{Dependencies, Tag};

thread_local! {
    /// `None` marks an untracked scope.
    static FRAMES: RefCell<SmallVec<[Option<Dependencies>; 4]>> = RefCell::new(SmallVec::new());
}

/// Guard for one formula evaluation.
///
/// While it is alive, consumed tags are recorded in its frame.
#[must_use = "dropping the frame immediately stops tracking"]
pub struct EvaluationFrame {
    /// Stack depth right after this frame was pushed.
    depth: usize,
    active: bool,
}

impl EvaluationFrame {
    /// Push a new frame onto the tracker stack.
    pub fn begin() -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(Some(Dependencies::new()));
            frames.len()
        });
        trace!(depth, "evaluation frame pushed");

        Self {
            depth,
            active: true,
        }
    }

    /// Pop this frame and return the tags consumed while it was on top.
    pub fn finish(mut self) -> Dependencies {
        self.active = false;
        self.pop()
    }

    fn pop(&self) -> Dependencies {
        let popped = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();

            // Frames are strictly nested. A mismatch means a guard escaped
            // its evaluation.
            debug_assert_eq!(
                frames.len(),
                self.depth,
                "EvaluationFrame mismatch: expected depth {}, got {}",
                self.depth,
                frames.len()
            );

            frames.pop().flatten().unwrap_or_default()
        });
        trace!(depth = self.depth, consumed = popped.len(), "evaluation frame popped");

        popped
    }
}

impl Drop for EvaluationFrame {
    fn drop(&mut self) {
        if self.active {
            self.pop();
        }
    }
}

/// Pops its untracked frame when dropped, including during a panic.
struct UntrackedScope {
    depth: usize,
}

impl UntrackedScope {
    fn enter() -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(None);
            frames.len()
        });
        Self { depth }
    }
}

impl Drop for UntrackedScope {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(frames.len(), self.depth, "untracked scope mismatch");
            frames.pop();
        });
    }
}

/// Run `f` without recording anything it reads.
pub fn untracked<R, F>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _scope = UntrackedScope::enter();
    f()
}

/// Record a tag in the innermost frame, if one is active.
///
/// The tag is only built when there is a frame to put it in.
pub(crate) fn consume_with<F>(tag: F)
where
    F: FnOnce() -> Tag,
{
    FRAMES.with(|frames| {
        if let Some(Some(frame)) = frames.borrow_mut().last_mut() {
            frame.insert(tag());
        }
    });
}

/// Check if reads on this thread are currently being recorded.
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Some(_))))
}

/// Number of nested frames on this thread, untracked scopes included.
pub fn frame_depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}
