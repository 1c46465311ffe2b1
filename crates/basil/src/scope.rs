//! Per-pass execution context shared by a root test, its descendants and
//! the setup plugins wrapped around them.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A keyed bag of values for one traversal pass.
///
/// The runner creates a fresh `Scope` for every pass, so values set by an
/// outer body are visible to the nested body that runs in the same pass but
/// never leak into the next pass. Cloning yields another handle to the same
/// storage.
///
/// ```rust
/// let scope = basil::Scope::new();
/// scope.set("user", String::from("ada"));
/// assert_eq!(scope.get::<String>("user").as_deref(), Some("ada"));
/// ```
#[derive(Clone, Default)]
pub struct Scope {
    values: Rc<RefCell<HashMap<String, Box<dyn Any>>>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: 'static>(&self, key: impl Into<String>, value: T) {
        self.values.borrow_mut().insert(key.into(), Box::new(value));
    }

    /// A clone of the value under `key`, if present and of type `T`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.values
            .borrow()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Mutate the value under `key` in place.
    ///
    /// `f` must not touch this scope again; the storage is borrowed for the
    /// duration of the call.
    pub fn with<T: 'static, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut values = self.values.borrow_mut();
        values.get_mut(key).and_then(|v| v.downcast_mut::<T>()).map(f)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.borrow_mut().remove(key).is_some()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.values, &other.values)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("keys", &self.keys()).finish()
    }
}
