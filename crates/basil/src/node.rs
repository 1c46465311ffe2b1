//! The result tree: one [`Test`] per declared name, owned by its parent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{Failure, Outcome};
use crate::scope::Scope;

/// What a failed node retains for replaying or displaying its failure.
#[derive(Debug, Clone)]
pub struct Inspection {
    /// The scope the failing body ran under.
    pub scope: Scope,
    /// Source text of the failing body, when it was declared with `declare!`.
    pub source: Option<&'static str>,
}

/// A node in the hierarchical result tree.
///
/// A node is *complete* once its own body has run and every child is
/// complete; it has *passed* when it is complete, carries no error and every
/// child has passed. A failing body does not stop the runner from
/// discovering and running the node's other children on later passes.
pub struct Test {
    name: String,
    source: Option<&'static str>,
    run_count: Cell<u32>,
    children: RefCell<Vec<Rc<Test>>>,
    error: RefCell<Option<Failure>>,
    inspect: RefCell<Option<Inspection>>,
}

impl Test {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_source(name, None)
    }

    pub(crate) fn with_source(name: impl Into<String>, source: Option<&'static str>) -> Self {
        Test {
            name: name.into(),
            source,
            run_count: Cell::new(0),
            children: RefCell::new(Vec::new()),
            error: RefCell::new(None),
            inspect: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&'static str> {
        self.source
    }

    /// How many times this node's own body has executed.
    pub fn run_count(&self) -> u32 {
        self.run_count.get()
    }

    /// The child called `name`, created on first sight.
    pub fn child(&self, name: &str) -> Rc<Test> {
        self.child_with_source(name, None)
    }

    pub(crate) fn child_with_source(&self, name: &str, source: Option<&'static str>) -> Rc<Test> {
        let mut children = self.children.borrow_mut();
        if let Some(existing) = children.iter().find(|c| c.name == name) {
            return Rc::clone(existing);
        }
        let child = Rc::new(Test::with_source(name, source));
        children.push(Rc::clone(&child));
        child
    }

    /// Children in declaration order.
    pub fn children(&self) -> Vec<Rc<Test>> {
        self.children.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.run_count.get() > 0 && self.children.borrow().iter().all(|c| c.is_complete())
    }

    pub fn has_passed(&self) -> bool {
        self.is_complete()
            && self.error.borrow().is_none()
            && self.children.borrow().iter().all(|c| c.has_passed())
    }

    /// The failure captured from this node's own body.
    pub fn error(&self) -> Option<Failure> {
        self.error.borrow().clone()
    }

    /// Present only while [`error`](Self::error) is set.
    pub fn inspect(&self) -> Option<Inspection> {
        self.inspect.borrow().clone()
    }

    /// Run `body` once under `scope`, capturing a panic or an `Err` return
    /// as this node's error. The run count increments either way.
    pub fn run<R: Outcome>(&self, scope: &Scope, body: impl FnOnce(&Scope) -> R) {
        let outcome = catch_unwind(AssertUnwindSafe(|| body(scope)));
        let failure = match outcome {
            Ok(returned) => returned.into_failure(),
            Err(payload) => Some(Failure::from_panic(payload)),
        };
        if let Some(failure) = failure {
            tracing::trace!(test = %self.name, error = %failure, "test body failed");
            self.fail(failure, scope);
        }
        self.run_count.set(self.run_count.get() + 1);
    }

    /// Record a failure that did not come from this node's body.
    pub(crate) fn fail(&self, failure: Failure, scope: &Scope) {
        *self.error.borrow_mut() = Some(failure);
        *self.inspect.borrow_mut() = Some(Inspection {
            scope: scope.clone(),
            source: self.source,
        });
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.name)
            .field("run_count", &self.run_count.get())
            .field("error", &*self.error.borrow())
            .field("children", &*self.children.borrow())
            .finish()
    }
}
