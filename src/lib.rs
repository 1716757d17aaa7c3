//! Treesweeper - consistency checker for reactive mutable trees
//!
//! A [`Sweeper`] attaches to trees that notify their changes, runs detectors
//! either reactively (on every notification) or on demand (during
//! [`Sweeper::report`]), and collects [`Issue`]s for structural and typing
//! invariants the tree implementation should uphold but may not.
//!
//! The sweeper only reads trees through the [`tree::TreeView`] and
//! [`tree::ReactiveForest`] traits. [`tree::MemoryForest`] is an in-memory
//! implementation.

pub mod error;
pub mod issues;
pub mod logging;
pub mod notification;
pub mod sweeper;
pub mod tree;

pub use error::{SweeperError, SweeperResult};
pub use issues::{DetectionFamily, Issue, IssueKind};
pub use notification::{IssueRenderer, ListenerId};
pub use sweeper::{EnableOptions, Sweeper, SweeperConfig};
