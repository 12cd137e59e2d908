//! # Mutations
//!
//! Higher-level edits on a [`Document`](crate::Document). Every mutation
//! reads and writes only through the overlay and emits atomic operations
//! (with their inverses) through the document's staging primitives.
//!
//! ## Groups
//!
//! - [`hierarchy`]: attach, detach, reorder, move and copy subtrees
//! - [`split_merge`]: split and join text and block nodes
//! - [`marks`]: mark normalization and statistics
//! - [`range`]: text and mark edits over ranges that may span nodes
//!
//! ## Error policy
//!
//! A missing id yields `false` or `None`. Only structural violations
//! (moving the root, creating a cycle, deleting the root) are errors.

pub mod hierarchy;
pub mod marks;
pub mod range;
pub mod split_merge;

pub use marks::{normalized_marks, MarkStatistics};
pub use range::ContentRange;
pub use split_merge::split_marks;
