//! Capturing calls that application code makes on a shared namespace, so a
//! synchronous test can observe, hold back and replay asynchronous
//! callbacks.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::BasilError;
use crate::task::TaskQueue;

type Method<A> = Rc<dyn Fn(A)>;

/// A shared, name-keyed method table, the thing application code calls into
/// and interceptors install stubs on. Cloning yields another handle to the
/// same table.
pub struct Namespace<A> {
    methods: Rc<RefCell<BTreeMap<String, Method<A>>>>,
}

impl<A> Namespace<A> {
    pub fn new() -> Self {
        Namespace {
            methods: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Define (or redefine) `name`.
    pub fn define(&self, name: impl Into<String>, method: impl Fn(A) + 'static) {
        self.methods.borrow_mut().insert(name.into(), Rc::new(method));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.borrow().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.methods.borrow_mut().remove(name).is_some()
    }

    /// Defined names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.methods.borrow().keys().cloned().collect()
    }

    /// Invoke `name` with `args`.
    pub fn call(&self, name: &str, args: A) -> Result<(), BasilError> {
        // Clone the method out so it may redefine or remove names while running.
        let method = self
            .methods
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| BasilError::NoSuchMethod(name.to_string()))?;
        method(args);
        Ok(())
    }
}

impl<A> Clone for Namespace<A> {
    fn clone(&self) -> Self {
        Namespace {
            methods: Rc::clone(&self.methods),
        }
    }
}

impl<A> Default for Namespace<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Namespace<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace").field("names", &self.names()).finish()
    }
}

/// One intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture<A> {
    /// The intercepted method name the call was made on.
    pub method: String,
    pub args: A,
}

type Callback<A> = Box<dyn Fn(&Interceptor<A>, Capture<A>)>;

struct Inner<A> {
    target: Namespace<A>,
    tasks: TaskQueue,
    callback: Callback<A>,
    intercepted: RefCell<Vec<String>>,
    paused: Cell<bool>,
    aborted: Cell<bool>,
    pending: RefCell<Vec<Capture<A>>>,
}

/// Installs capturing stubs on a [`Namespace`] and routes the captured calls
/// to a delivery callback.
///
/// While running, captures are delivered synchronously. While paused they
/// queue up; [`resume`](Self::resume) hands the whole queue to the
/// [`TaskQueue`] in capture order. [`abort`](Self::abort) is a one-way latch
/// after which nothing is delivered, queued or not.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use basil::{Interceptor, Namespace, TaskQueue};
///
/// let api: Namespace<u32> = Namespace::new();
/// let tasks = TaskQueue::new();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = Rc::clone(&seen);
/// let interceptor = Interceptor::new(&api, &tasks, move |_, capture| {
///     sink.borrow_mut().push(capture.args);
/// });
/// interceptor.intercept("onData").unwrap();
///
/// interceptor.pause();
/// api.call("onData", 7).unwrap();
/// interceptor.resume();
/// assert!(seen.borrow().is_empty());
///
/// tasks.run_until_idle();
/// assert_eq!(*seen.borrow(), vec![7]);
/// ```
pub struct Interceptor<A> {
    inner: Rc<Inner<A>>,
}

impl<A: 'static> Interceptor<A> {
    pub fn new(
        target: &Namespace<A>,
        tasks: &TaskQueue,
        callback: impl Fn(&Interceptor<A>, Capture<A>) + 'static,
    ) -> Self {
        Interceptor {
            inner: Rc::new(Inner {
                target: target.clone(),
                tasks: tasks.clone(),
                callback: Box::new(callback),
                intercepted: RefCell::new(Vec::new()),
                paused: Cell::new(false),
                aborted: Cell::new(false),
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Install a capturing stub at `name`.
    ///
    /// Fails without installing anything if the target already defines
    /// `name`. Stubs hold the interceptor weakly: once every handle is
    /// dropped, calls to a stub that was never restored are ignored.
    pub fn intercept(&self, name: &str) -> Result<(), BasilError> {
        if self.inner.target.contains(name) {
            return Err(BasilError::CannotInterceptExistingMethod(name.to_string()));
        }

        let weak = Rc::downgrade(&self.inner);
        let method = name.to_string();
        self.inner.target.define(name, move |args| {
            if let Some(inner) = weak.upgrade() {
                Interceptor { inner }.capture(Capture {
                    method: method.clone(),
                    args,
                });
            }
        });
        self.inner.intercepted.borrow_mut().push(name.to_string());
        tracing::debug!(method = name, "intercepting");
        Ok(())
    }

    /// Remove every installed stub. Pause, abort and queued captures are
    /// left as they are.
    pub fn restore(&self) {
        let names = std::mem::take(&mut *self.inner.intercepted.borrow_mut());
        for name in &names {
            self.inner.target.remove(name);
        }
        tracing::debug!(restored = names.len(), "restored intercepted methods");
    }

    pub fn pause(&self) {
        self.inner.paused.set(true);
    }

    /// Unpause and schedule every queued capture on the task queue, in
    /// capture order. Nothing is delivered before this returns.
    pub fn resume(&self) {
        self.inner.paused.set(false);

        // Taken up front so a pause/resume made while these drain starts
        // from an empty queue.
        let queued = std::mem::take(&mut *self.inner.pending.borrow_mut());
        tracing::trace!(queued = queued.len(), "resuming");
        for capture in queued {
            let interceptor = self.clone();
            self.inner.tasks.schedule(move || {
                if !interceptor.is_aborted() {
                    interceptor.deliver(capture);
                }
            });
        }
    }

    /// Drop everything from now on, including captures already scheduled by
    /// [`resume`](Self::resume) but not yet run.
    pub fn abort(&self) {
        self.inner.aborted.set(true);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.get()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// Captures waiting for [`resume`](Self::resume).
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Installed names, in installation order.
    pub fn intercepted(&self) -> Vec<String> {
        self.inner.intercepted.borrow().clone()
    }

    pub fn target(&self) -> &Namespace<A> {
        &self.inner.target
    }

    fn capture(&self, capture: Capture<A>) {
        if self.is_aborted() {
            tracing::trace!(method = %capture.method, "dropping call after abort");
            return;
        }
        if self.is_paused() {
            self.inner.pending.borrow_mut().push(capture);
        } else {
            self.deliver(capture);
        }
    }

    fn deliver(&self, capture: Capture<A>) {
        (self.inner.callback)(self, capture);
    }
}

impl<A> Clone for Interceptor<A> {
    fn clone(&self) -> Self {
        Interceptor {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Interceptor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("intercepted", &*self.inner.intercepted.borrow())
            .field("paused", &self.inner.paused.get())
            .field("aborted", &self.inner.aborted.get())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording(api: &Namespace<&'static str>, tasks: &TaskQueue) -> (Interceptor<&'static str>, Log) {
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);
        let interceptor = Interceptor::new(api, tasks, move |_, capture| {
            sink.borrow_mut().push(format!("{}:{}", capture.method, capture.args));
        });
        (interceptor, log)
    }

    #[test]
    fn delivers_synchronously_when_running() {
        let api = Namespace::new();
        let tasks = TaskQueue::new();
        let (interceptor, log) = recording(&api, &tasks);
        interceptor.intercept("onData").unwrap();

        api.call("onData", "x").unwrap();
        api.call("onData", "y").unwrap();

        assert_eq!(*log.borrow(), ["onData:x", "onData:y"]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn second_intercept_of_same_name_fails() {
        let api = Namespace::new();
        let tasks = TaskQueue::new();
        let (interceptor, log) = recording(&api, &tasks);

        interceptor.intercept("onData").unwrap();
        assert_eq!(
            interceptor.intercept("onData"),
            Err(BasilError::CannotInterceptExistingMethod("onData".into()))
        );
        assert_eq!(interceptor.intercepted(), ["onData"]);

        // The first stub is still the one installed.
        api.call("onData", "x").unwrap();
        assert_eq!(*log.borrow(), ["onData:x"]);
    }

    #[test]
    fn refuses_application_methods() {
        let api: Namespace<&'static str> = Namespace::new();
        api.define("save", |_| {});
        let (interceptor, _log) = recording(&api, &TaskQueue::new());
        assert!(interceptor.intercept("save").is_err());
        assert!(interceptor.intercepted().is_empty());
    }

    #[test]
    fn restore_removes_only_installed_stubs() {
        let api: Namespace<&'static str> = Namespace::new();
        api.define("save", |_| {});
        let (interceptor, _log) = recording(&api, &TaskQueue::new());
        interceptor.intercept("onData").unwrap();
        interceptor.intercept("onError").unwrap();

        interceptor.restore();

        assert_eq!(api.names(), ["save"]);
        assert!(interceptor.intercepted().is_empty());
        assert_eq!(
            api.call("onData", "x"),
            Err(BasilError::NoSuchMethod("onData".into()))
        );

        // Reusable for a fresh cycle.
        interceptor.intercept("onData").unwrap();
        assert!(api.contains("onData"));
    }

    #[test]
    fn paused_captures_wait_for_a_task_turn() {
        let api = Namespace::new();
        let tasks = TaskQueue::new();
        let (interceptor, log) = recording(&api, &tasks);
        interceptor.intercept("onData").unwrap();

        interceptor.pause();
        api.call("onData", "x").unwrap();
        api.call("onData", "y").unwrap();
        assert_eq!(interceptor.pending_len(), 2);

        interceptor.resume();
        assert_eq!(interceptor.pending_len(), 0);
        assert!(log.borrow().is_empty());

        tasks.run_until_idle();
        assert_eq!(*log.borrow(), ["onData:x", "onData:y"]);
    }

    #[test]
    fn abort_drops_queued_and_later_calls() {
        let api = Namespace::new();
        let tasks = TaskQueue::new();
        let (interceptor, log) = recording(&api, &tasks);
        interceptor.intercept("onData").unwrap();

        interceptor.pause();
        api.call("onData", "x").unwrap();
        interceptor.abort();
        interceptor.resume();
        api.call("onData", "y").unwrap();
        tasks.run_until_idle();

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn abort_after_resume_cancels_scheduled_delivery() {
        let api = Namespace::new();
        let tasks = TaskQueue::new();
        let (interceptor, log) = recording(&api, &tasks);
        interceptor.intercept("onData").unwrap();

        interceptor.pause();
        api.call("onData", "x").unwrap();
        interceptor.resume();
        interceptor.abort();
        assert_eq!(tasks.run_until_idle(), 1);

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn dropped_interceptor_ignores_calls() {
        let api = Namespace::new();
        let tasks = TaskQueue::new();
        let (interceptor, log) = recording(&api, &tasks);
        interceptor.intercept("onData").unwrap();
        drop(interceptor);

        api.call("onData", "x").unwrap();
        assert!(log.borrow().is_empty());
    }
}
