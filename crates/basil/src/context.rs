//! The handle passed into every test body.

use std::rc::Rc;

use crate::error::Outcome;
use crate::node::Test;
use crate::runner::TestRunner;
use crate::scope::Scope;

/// A lightweight handle for declaring nested tests from inside a body.
///
/// `Context` is `Copy` so it can be passed into nested closures without
/// ceremony. Every declaration goes to the runner that invoked the body.
///
/// ```rust
/// let runner = basil::TestRunner::new();
/// let root = runner.test("Login flow", |ctx| {
///     ctx.scope().set("user", "ada");
///     ctx.test("greets the user", |ctx| {
///         assert_eq!(ctx.scope().get::<&str>("user"), Some("ada"));
///     });
/// });
/// assert!(root.has_passed());
/// ```
#[derive(Copy, Clone)]
pub struct Context<'a> {
    runner: &'a TestRunner,
}

impl<'a> Context<'a> {
    pub(crate) fn new(runner: &'a TestRunner) -> Self {
        Context { runner }
    }

    /// Declare a nested test. See [`TestRunner::test`].
    pub fn test<R, F>(&self, name: impl Into<String>, body: F) -> Rc<Test>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        self.runner.test(name, body)
    }

    /// Declare a nested test named after the callable. See
    /// [`TestRunner::test_fn`].
    pub fn test_fn<R, F>(&self, body: F) -> Rc<Test>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        self.runner.test_fn(body)
    }

    /// Declare a nested test and record the body's source text.
    pub fn test_with_source<R, F>(
        &self,
        name: impl Into<String>,
        source: &'static str,
        body: F,
    ) -> Rc<Test>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        self.runner.test_with_source(name, source, body)
    }

    /// The current pass's scope.
    pub fn scope(&self) -> Scope {
        self.runner.scope()
    }

    pub fn runner(&self) -> &'a TestRunner {
        self.runner
    }
}
