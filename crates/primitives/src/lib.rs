//! Core collections for the registry: rank-ordered sequences and weak containers.

/// Rank-ordered sequences with resumable cursors.
pub mod ranked;
/// Weakly-held sequences and maps.
pub mod weak;

pub use ranked::{Cursor, Rank, RankedCursor, RankedList};
pub use weak::{LinkedSequence, WeakSequence, WeakValues};
