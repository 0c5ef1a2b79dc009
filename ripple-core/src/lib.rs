//! Ripple Core
//!
//! This crate provides the dependency-tracking engine behind Ripple's
//! fine-grained reactivity. It implements:
//!
//! - A global revision clock
//! - Tags: versioned identities for mutable state and derived computations
//! - Automatic dependency consumption while a formula evaluates
//! - Subscriptions and synchronous change notification
//!
//! The engine is UI-agnostic. It knows nothing about rendering or
//! scheduling; it only answers "did anything I read change?" by comparing
//! revision numbers, and tells subscribers when the answer becomes "yes".
//!
//! # Architecture
//!
//! - `reactive`: cells, formulas, tags, the consumption tracker and the
//!   notifier
//! - `error`: the error type shared by the mutation paths
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{subscribe, Cell, Formula};
//!
//! let count = Cell::new(1);
//!
//! let source = count.clone();
//! let doubled = Formula::new(move || source.read() * 2);
//!
//! let _handle = subscribe(&doubled, || println!("doubled changed"));
//!
//! // The first read initializes the formula, which notifies.
//! assert_eq!(doubled.get(), 2);
//!
//! // Notifies again before returning; `doubled` is now stale.
//! count.set(5).unwrap();
//! assert_eq!(doubled.get(), 10);
//! ```

pub mod error;
pub mod reactive;

pub use error::{ReactiveError, Result};
