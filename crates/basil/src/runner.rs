//! Re-entrant test discovery and execution.
//!
//! A top-level declaration is re-invoked pass after pass against the same
//! [`Test`] node until that node is complete. Inside a pass, nested
//! declarations are matched to existing children by name (or create them),
//! and only the first one that is still incomplete actually runs; a one-shot
//! latch turns every other nested declaration in that pass into a no-op.
//! Each pass therefore advances exactly one branch, and re-running the outer
//! body on the next pass reaches the next unfinished sibling.
//!
//! ```text
//! pass 1: A runs -> B discovered, runs  -> C discovered, skipped
//! pass 2: A runs -> B complete, skipped -> C runs
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::context::Context;
use crate::error::{Failure, FailureKind, Outcome};
use crate::name;
use crate::node::Test;
use crate::scope::Scope;
use crate::task::TaskQueue;

type PluginFn = dyn Fn(&Test, &Scope, Next<'_>);

/// Middleware wrapped around every pass of a top-level traversal.
#[derive(Clone)]
pub struct Plugin {
    name: &'static str,
    call: Rc<PluginFn>,
}

impl Plugin {
    fn new<F>(call: F) -> Self
    where
        F: Fn(&Test, &Scope, Next<'_>) + 'static,
    {
        Plugin {
            name: std::any::type_name::<F>(),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish()
    }
}

/// The continuation handed to a plugin. A plugin must call
/// [`run`](Next::run) exactly once to delegate to the next plugin, and
/// eventually to the pass itself.
pub struct Next<'a> {
    chain: &'a [Plugin],
    test: &'a Test,
    scope: &'a Scope,
    inner: &'a mut dyn FnMut(),
    reached: &'a Cell<usize>,
}

impl Next<'_> {
    pub fn run(self) {
        let Next {
            chain,
            test,
            scope,
            inner,
            reached,
        } = self;
        reached.set(reached.get() + 1);

        // The most recently registered plugin is the outermost.
        match chain.split_last() {
            Some((plugin, rest)) => (plugin.call)(
                test,
                scope,
                Next {
                    chain: rest,
                    test,
                    scope,
                    inner,
                    reached,
                },
            ),
            None => inner(),
        }
    }
}

/// Run `inner` wrapped by `plugins`. On a broken chain, returns the name of
/// the plugin that did not delegate.
fn run_with_plugins(
    plugins: &[Plugin],
    test: &Test,
    scope: &Scope,
    inner: &mut dyn FnMut(),
) -> Result<(), &'static str> {
    let reached = Cell::new(0);
    Next {
        chain: plugins,
        test,
        scope,
        inner,
        reached: &reached,
    }
    .run();

    match reached.get() {
        r if r > plugins.len() => Ok(()),
        r => Err(plugins[plugins.len() - r].name),
    }
}

/// Runs its closure on drop, so runner state is restored even if a plugin
/// unwinds through it.
struct Guard<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Guard<F> {
    fn new(f: F) -> Self {
        Guard { f: Some(f) }
    }
}

impl<F: FnOnce()> Drop for Guard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// Orchestrates declaration, traversal and the plugin chain.
///
/// A failing test never makes the runner panic or return an error; the
/// failure is recorded on the node that raised it.
///
/// ```rust
/// let runner = basil::TestRunner::new();
/// let root = runner.test("A", |ctx| {
///     ctx.test("B", |_| {});
///     ctx.test("C", |_| {});
/// });
///
/// assert!(root.is_complete());
/// let names: Vec<String> = root.children().iter().map(|c| c.name().to_string()).collect();
/// assert_eq!(names, ["B", "C"]);
/// ```
#[derive(Default)]
pub struct TestRunner {
    setup_plugins: RefCell<Vec<Plugin>>,
    root_plugins: RefCell<Vec<Plugin>>,
    outer: RefCell<Option<Rc<Test>>>,
    branch_has_run: Cell<bool>,
    first_runs: Cell<usize>,
    scope: RefCell<Scope>,
    tasks: Option<TaskQueue>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `tasks` after every pass, giving intercepted callbacks a turn
    /// before the tree is revisited.
    pub fn with_task_queue(mut self, tasks: TaskQueue) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Declare a test.
    ///
    /// Outside any running body this starts a traversal and returns the
    /// root once it is complete. Inside a body it declares a child of the
    /// test whose body is running, runs it if it is this pass's branch, and
    /// returns the child (possibly still incomplete).
    ///
    /// A body that always panics has no return type to infer `R` from;
    /// annotate it as `|ctx| -> () { ... }`.
    pub fn test<R, F>(&self, name: impl Into<String>, body: F) -> Rc<Test>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        self.declare(name.into(), None, body)
    }

    /// Declare a test named after the callable's display name: the function
    /// name for a `fn` item, `"(No Name)"` for a closure.
    pub fn test_fn<R, F>(&self, body: F) -> Rc<Test>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        let name = name::display_name::<F>().unwrap_or(name::NO_NAME);
        self.declare(name.to_string(), None, body)
    }

    /// Like [`test`](Self::test), also recording the body's source text on a
    /// newly created node.
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
        self.declare(name.into(), Some(source), body)
    }

    /// Continue the traversal of an existing root with `body`. Does nothing
    /// when the root is already complete, or when called from inside a
    /// running body.
    pub fn retraverse<R, F>(&self, root: &Rc<Test>, mut body: F)
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        if self.is_running() {
            tracing::warn!(test = root.name(), "retraverse called from a running body; ignored");
            return;
        }
        self.run_tree(root, &mut body);
    }

    /// Wrap every pass of every top-level traversal. Plugins registered
    /// later wrap the ones registered earlier.
    pub fn register_setup_plugin<F>(&self, plugin: F)
    where
        F: Fn(&Test, &Scope, Next<'_>) + 'static,
    {
        self.setup_plugins.borrow_mut().push(Plugin::new(plugin));
    }

    /// Record a root plugin. Root plugins are reserved for root-scoped
    /// middleware and are not invoked by either traversal mode.
    pub fn register_root_plugin<F>(&self, plugin: F)
    where
        F: Fn(&Test, &Scope, Next<'_>) + 'static,
    {
        let plugin = Plugin::new(plugin);
        tracing::debug!(plugin = plugin.name(), "root plugin recorded; root plugins are not invoked");
        self.root_plugins.borrow_mut().push(plugin);
    }

    pub fn setup_plugins(&self) -> Vec<Plugin> {
        self.setup_plugins.borrow().clone()
    }

    pub fn root_plugins(&self) -> Vec<Plugin> {
        self.root_plugins.borrow().clone()
    }

    /// Whether a test body is executing right now.
    pub fn is_running(&self) -> bool {
        self.outer.borrow().is_some()
    }

    /// The test whose body is executing.
    pub fn current(&self) -> Option<Rc<Test>> {
        self.outer.borrow().clone()
    }

    /// The current pass's scope.
    pub fn scope(&self) -> Scope {
        self.scope.borrow().clone()
    }

    fn declare<R, F>(&self, name: String, source: Option<&'static str>, mut body: F) -> Rc<Test>
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        let outer = self.outer.borrow().clone();
        match outer {
            Some(outer) => {
                let test = outer.child_with_source(&name, source);
                self.run_single_branch(&test, &mut body);
                test
            }
            None => {
                let test = Rc::new(Test::with_source(name, source));
                self.run_tree(&test, &mut body);
                test
            }
        }
    }

    fn run_tree<R, F>(&self, test: &Rc<Test>, body: &mut F)
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        let mut pass = 0u32;
        while !test.is_complete() {
            pass += 1;
            self.branch_has_run.set(false);
            self.first_runs.set(0);
            let scope = Scope::new();
            *self.scope.borrow_mut() = scope.clone();
            tracing::debug!(test = test.name(), pass, "starting pass");

            let plugins = self.setup_plugins();
            let chain = catch_unwind(AssertUnwindSafe(|| {
                let mut branch = || self.run_single_branch(test, body);
                run_with_plugins(&plugins, test, &scope, &mut branch)
            }));

            match chain {
                Ok(Ok(())) => {}
                Ok(Err(plugin)) => {
                    tracing::warn!(test = test.name(), plugin, pass, "setup plugin did not delegate");
                    test.fail(
                        Failure::new(
                            FailureKind::PluginDidNotDelegate,
                            format!("setup plugin `{plugin}` did not call its continuation"),
                        ),
                        &scope,
                    );
                    break;
                }
                Err(payload) => {
                    let failure = Failure::from_panic(payload);
                    tracing::warn!(test = test.name(), error = %failure, pass, "setup plugin panicked");
                    test.fail(failure, &scope);
                    break;
                }
            }

            let drained = self.tasks.as_ref().map_or(0, TaskQueue::run_until_idle);
            if self.first_runs.get() == 0 && drained == 0 && !test.is_complete() {
                tracing::warn!(test = test.name(), pass, "pass made no progress; stopping traversal");
                if test.error().is_none() {
                    test.fail(
                        Failure::new(
                            FailureKind::Stalled,
                            format!("traversal stalled on pass {pass}: incomplete tests were no longer declared"),
                        ),
                        &scope,
                    );
                }
                break;
            }
        }
        tracing::debug!(test = test.name(), passes = pass, passed = test.has_passed(), "traversal finished");
    }

    fn run_single_branch<R, F>(&self, test: &Rc<Test>, body: &mut F)
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        if test.is_complete() || self.branch_has_run.get() {
            return;
        }
        self.run_test_function(test, body);
        self.branch_has_run.set(true);
    }

    fn run_test_function<R, F>(&self, test: &Rc<Test>, body: &mut F)
    where
        R: Outcome,
        F: FnMut(Context<'_>) -> R,
    {
        if test.run_count() == 0 {
            self.first_runs.set(self.first_runs.get() + 1);
        }

        let previous = self.outer.replace(Some(Rc::clone(test)));
        let _restore = Guard::new(|| *self.outer.borrow_mut() = previous);

        tracing::trace!(test = test.name(), run = test.run_count() + 1, "running test body");
        let scope = self.scope();
        test.run(&scope, |_| body(Context::new(self)));
    }
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("setup_plugins", &*self.setup_plugins.borrow())
            .field("root_plugins", &*self.root_plugins.borrow())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(test: &Test) -> Vec<String> {
        test.children().iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn siblings_run_one_per_pass() {
        let runner = TestRunner::new();
        let log = RefCell::new(Vec::new());

        let root = runner.test("A", |ctx| {
            log.borrow_mut().push("A");
            ctx.test("B", |_| log.borrow_mut().push("B"));
            ctx.test("C", |_| log.borrow_mut().push("C"));
        });

        assert_eq!(*log.borrow(), ["A", "B", "A", "C"]);
        assert_eq!(names(&root), ["B", "C"]);
        assert!(root.is_complete());
        assert!(root.has_passed());
        assert_eq!(root.run_count(), 2);
        for child in root.children() {
            assert_eq!(child.run_count(), 1);
        }
    }

    #[test]
    fn nested_call_returns_the_child() {
        let runner = TestRunner::new();
        let seen = RefCell::new(None);
        let root = runner.test("root", |ctx| {
            let child = ctx.test("child", |_| {});
            *seen.borrow_mut() = Some(child);
        });
        let child = seen.borrow_mut().take().unwrap();
        assert!(Rc::ptr_eq(&child, &root.children()[0]));
    }

    #[test]
    fn scope_is_fresh_each_pass_and_shared_within_it() {
        let runner = TestRunner::new();
        let scopes = RefCell::new(Vec::new());

        let root = runner.test("root", |ctx| {
            let scope = ctx.scope();
            assert!(!scope.contains("seen"));
            scope.set("seen", true);
            scopes.borrow_mut().push(scope);
            ctx.test("one", |ctx| assert_eq!(ctx.scope().get::<bool>("seen"), Some(true)));
            ctx.test("two", |ctx| assert_eq!(ctx.scope().get::<bool>("seen"), Some(true)));
        });

        assert!(root.has_passed());
        let scopes = scopes.borrow();
        assert_eq!(scopes.len(), 2);
        assert!(!scopes[0].ptr_eq(&scopes[1]));
    }

    #[test]
    fn runner_state_is_clear_after_traversal() {
        let runner = TestRunner::new();
        let root = runner.test("root", |ctx| {
            assert!(ctx.runner().is_running());
            assert_eq!(ctx.runner().current().unwrap().name(), "root");
        });
        assert!(root.has_passed());
        assert!(!runner.is_running());
        assert!(runner.current().is_none());
    }

    #[test]
    fn plugins_wrap_each_pass_last_registered_outermost() {
        let runner = TestRunner::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&log);
        runner.register_setup_plugin(move |_, _, next| {
            first.borrow_mut().push("first:before".to_string());
            next.run();
            first.borrow_mut().push("first:after".to_string());
        });
        let second = Rc::clone(&log);
        runner.register_setup_plugin(move |test, _, next| {
            second.borrow_mut().push(format!("second:{}", test.name()));
            next.run();
        });

        let body_log = Rc::clone(&log);
        runner.test("root", move |_| body_log.borrow_mut().push("body".to_string()));

        assert_eq!(
            *log.borrow(),
            ["second:root", "first:before", "body", "first:after"]
        );
    }

    #[test]
    fn plugins_see_the_pass_scope() {
        let runner = TestRunner::new();
        runner.register_setup_plugin(|_, scope, next| {
            scope.set("db", "connected");
            next.run();
        });
        let root = runner.test("root", |ctx| {
            assert_eq!(ctx.scope().get::<&str>("db"), Some("connected"));
        });
        assert!(root.has_passed());
    }

    #[test]
    fn non_delegating_plugin_stops_traversal() {
        let runner = TestRunner::new();
        runner.register_setup_plugin(|_, _, next| next.run());
        runner.register_setup_plugin(|_, _, _next| {});

        let ran = Cell::new(false);
        let root = runner.test("root", |_| ran.set(true));

        assert!(!ran.get());
        assert!(!root.is_complete());
        assert!(!root.has_passed());
        let error = root.error().unwrap();
        assert_eq!(error.kind(), FailureKind::PluginDidNotDelegate);
        assert!(error.message().contains("did not call its continuation"));
    }

    #[test]
    fn panicking_plugin_is_recorded_on_root() {
        let runner = TestRunner::new();
        runner.register_setup_plugin(|_, _, _| panic!("fixture unavailable"));
        let root = runner.test("root", |_| {});
        assert_eq!(root.error().unwrap().message(), "fixture unavailable");
        assert!(!runner.is_running());
    }

    #[test]
    fn root_plugins_are_recorded_but_not_invoked() {
        let runner = TestRunner::new();
        let called = Rc::new(Cell::new(false));
        let flag = Rc::clone(&called);
        runner.register_root_plugin(move |_, _, next| {
            flag.set(true);
            next.run();
        });

        let root = runner.test("root", |_| {});
        assert!(root.has_passed());
        assert!(!called.get());
        assert_eq!(runner.root_plugins().len(), 1);
    }

    #[test]
    fn disappearing_child_stalls_instead_of_looping() {
        let runner = TestRunner::new();
        let pass = Cell::new(0);
        let root = runner.test("root", |ctx| {
            pass.set(pass.get() + 1);
            ctx.test("B", |_| {});
            if pass.get() == 1 {
                ctx.test("C", |_| {});
            }
        });

        assert_eq!(pass.get(), 2);
        assert!(!root.is_complete());
        assert_eq!(root.error().unwrap().kind(), FailureKind::Stalled);
        assert_eq!(root.children()[1].run_count(), 0);
    }

    #[test]
    fn task_queue_is_drained_between_passes() {
        let tasks = TaskQueue::new();
        let runner = TestRunner::new().with_task_queue(tasks.clone());
        let ready = Rc::new(Cell::new(false));

        let root = runner.test("root", |ctx| {
            let flag = Rc::clone(&ready);
            tasks.schedule(move || flag.set(true));
            ctx.test("first", |_| {});
            ctx.test("second", |_| {});
            if ready.get() {
                ctx.test("after callback", |_| {});
            }
        });

        assert!(root.has_passed());
        assert_eq!(names(&root), ["first", "second", "after callback"]);
    }

    #[test]
    fn fn_items_are_named_after_the_function() {
        fn signs_in(_: Context<'_>) {}

        let runner = TestRunner::new();
        assert_eq!(runner.test_fn(signs_in).name(), "signs_in");
        assert_eq!(runner.test_fn(|_| {}).name(), name::NO_NAME);
    }
}
