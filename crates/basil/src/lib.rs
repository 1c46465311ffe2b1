//! # basil: nested tests by re-entrant declaration
//!
//! Declare arbitrarily deep test hierarchies with ordinary nested closures.
//! There is no tree to build up front: the runner re-invokes a top-level
//! body pass after pass, discovering nested declarations by name each time
//! and running exactly one unfinished branch per pass, until every node has
//! run.
//!
//! ## Quick example
//!
//! ```rust
//! let runner = basil::TestRunner::new();
//! let root = runner.test("Calculator", |ctx| {
//!     let (a, b) = (2, 3);
//!     ctx.test("adds", |_| assert_eq!(a + b, 5));
//!     ctx.test("with negative numbers", |ctx| {
//!         ctx.test("handles negatives", |_| assert_eq!(-1 + b, 2));
//!     });
//! });
//! assert!(root.has_passed());
//! ```
//!
//! Application code that completes through callbacks can be made steppable
//! with an [`Interceptor`] on a [`Namespace`]: pause it, let the code under
//! test fire its callbacks, then resume and drain the [`TaskQueue`].
//!
//! ## Features
//!
//! - `macros` (default): the [`declare!`] macro, which names a test after
//!   its body when no name is given
//! - `googletest`: re-exports `googletest` matchers via `basil::matchers`

mod context;
pub mod error;
pub mod interceptor;
pub mod name;
mod node;
pub mod report;
pub mod runner;
mod scope;
pub mod task;

pub use context::Context;
pub use error::{BasilError, Failure, FailureKind, Outcome};
pub use interceptor::{Capture, Interceptor, Namespace};
pub use node::{Inspection, Test};
pub use report::{run, run_with};
pub use runner::{Next, Plugin, TestRunner};
pub use scope::Scope;
pub use task::TaskQueue;

#[cfg(feature = "macros")]
pub use basil_macros::declare;

/// Re-export of the [`googletest`] crate. Available with the `googletest` feature.
#[cfg(feature = "googletest")]
pub use googletest;

/// Composable matchers re-exported from [`googletest::prelude`].
#[cfg(feature = "googletest")]
pub mod matchers {
    pub use googletest::prelude::*;
}
