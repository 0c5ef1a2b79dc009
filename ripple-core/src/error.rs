//! Error types for the reactive engine.

use thiserror::Error;

use crate::reactive::TagId;

/// Errors raised by mutation paths.
///
/// Formula bodies report their own error type through [`Formula::read`];
/// this enum only covers failures of the engine itself.
///
/// [`Formula::read`]: crate::reactive::Formula::read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A frozen tag was asked to change.
    ///
    /// Freezing is permanent, so this is reported in every build profile
    /// rather than being silently ignored.
    #[error("attempted to update {tag}, but it was frozen")]
    FrozenMutation {
        /// The frozen tag.
        tag: TagId,
    },
}

/// Result alias for engine operations.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
