use std::{collections::hash_map::Entry, sync::Arc};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::{Value, Visitable, Visitor};

type PinCounts = Arc<Mutex<AHashMap<Value, usize>>>;

/// Values that native code currently holds in local storage.
///
/// The heap traces every value in here as a root. Short-lived values are
/// pushed through a [`HandleScope`] and popped when that scope is dropped,
/// so a scope never needs to borrow the heap it protects values from.
/// Values held across unrelated work, whose release order is not known up
/// front, are [`Pinned`] instead.
#[derive(Clone, Default)]
pub struct HandleSet {
    slots: Arc<Mutex<Vec<Value>>>,
    pins: PinCounts,
}

/// Scope-bounded keep-alive guard.
///
/// Every value promoted into the scope stays reachable until the scope is
/// dropped. Scopes nest and must be dropped in reverse creation order.
#[must_use = "values are only protected while the scope is alive"]
pub struct HandleScope {
    slots: Arc<Mutex<Vec<Value>>>,
    base: usize,
}

/// Keep-alive for a single value. Pins are counted per value and may be
/// released in any order.
#[must_use = "the value is only protected while the pin is alive"]
pub struct Pinned {
    pins: PinCounts,
    value: Value,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new scope on top of the currently live ones.
    pub fn scope(&self) -> HandleScope {
        let base = self.slots.lock().len();
        HandleScope {
            slots: self.slots.clone(),
            base,
        }
    }

    /// Keep `value` alive until the returned pin is dropped.
    pub fn pin(&self, value: Value) -> Pinned {
        // immediates are never collected
        if value.is_reference() {
            *self.pins.lock().entry(value).or_insert(0) += 1;
        }
        Pinned {
            pins: self.pins.clone(),
            value,
        }
    }

    /// Number of distinct values currently pinned.
    pub fn pinned_len(&self) -> usize {
        self.pins.lock().len()
    }

    /// Number of values currently protected by all live scopes.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HandleScope {
    /// Protect `value` for the lifetime of this scope and hand it back.
    pub fn promote(&mut self, value: Value) -> Value {
        // immediates are never collected, no need to track them
        if value.is_reference() {
            self.slots.lock().push(value);
        }
        value
    }

    /// Number of values this scope protects.
    pub fn len(&self) -> usize {
        self.slots.lock().len().saturating_sub(self.base)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        debug_assert!(
            slots.len() >= self.base,
            "handle scope dropped after an enclosing scope"
        );
        slots.truncate(self.base);
    }
}

impl Pinned {
    pub fn value(&self) -> Value {
        self.value
    }
}

impl Drop for Pinned {
    fn drop(&mut self) {
        if let Entry::Occupied(mut count) = self.pins.lock().entry(self.value) {
            *count.get_mut() -= 1;
            if *count.get() == 0 {
                count.remove();
            }
        }
    }
}

impl Visitable for HandleSet {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.slots.lock().iter().for_each(|&value| visitor.visit(value));
        self.pins.lock().keys().for_each(|&value| visitor.visit(value));
    }
}

impl std::fmt::Debug for HandleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleSet")
            .field("len", &self.len())
            .field("pinned", &self.pinned_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CollectVisitor(Vec<Value>);

    impl Visitor for CollectVisitor {
        fn visit(&mut self, value: Value) {
            self.0.push(value);
        }
    }

    #[test]
    fn empty_set_visits_nothing() {
        let set = HandleSet::new();
        let mut visitor = CollectVisitor::default();
        set.visit_edges(&mut visitor);
        assert!(visitor.0.is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn scope_releases_on_drop() {
        let set = HandleSet::new();
        {
            let mut scope = set.scope();
            scope.promote(Value::from_index(1));
            scope.promote(Value::from_index(2));
            assert_eq!(scope.len(), 2);
            assert_eq!(set.len(), 2);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn immediates_are_not_tracked() {
        let set = HandleSet::new();
        let mut scope = set.scope();
        assert_eq!(scope.promote(Value::from_fixnum(3)), Value::from_fixnum(3));
        scope.promote(Value::NIL);
        assert!(scope.is_empty());
    }

    #[test]
    fn pins_release_in_any_order() {
        let set = HandleSet::new();
        let first = set.pin(Value::from_index(1));
        let second = set.pin(Value::from_index(2));
        assert_eq!(set.pinned_len(), 2);

        drop(first);
        let mut visitor = CollectVisitor::default();
        set.visit_edges(&mut visitor);
        assert_eq!(visitor.0, vec![Value::from_index(2)]);

        drop(second);
        assert_eq!(set.pinned_len(), 0);
    }

    #[test]
    fn pins_are_counted_per_value() {
        let set = HandleSet::new();
        let a = set.pin(Value::from_index(5));
        let b = set.pin(Value::from_index(5));
        let immediate = set.pin(Value::TRUE);
        assert_eq!(set.pinned_len(), 1);
        assert_eq!(immediate.value(), Value::TRUE);

        drop(a);
        assert_eq!(set.pinned_len(), 1);
        drop(b);
        drop(immediate);
        assert_eq!(set.pinned_len(), 0);
    }

    #[test]
    fn pins_and_scopes_are_independent() {
        let set = HandleSet::new();
        let mut scope = set.scope();
        let pin = set.pin(Value::from_index(3));
        scope.promote(Value::from_index(4));
        drop(pin);
        assert_eq!(scope.len(), 1);
        drop(scope);
        assert!(set.is_empty());
    }

    #[test]
    fn nested_scopes_keep_outer_values() {
        let set = HandleSet::new();
        let mut outer = set.scope();
        outer.promote(Value::from_index(10));
        {
            let mut inner = set.scope();
            inner.promote(Value::from_index(11));
            assert_eq!(inner.len(), 1);
            assert_eq!(set.len(), 2);
        }
        let mut visitor = CollectVisitor::default();
        set.visit_edges(&mut visitor);
        assert_eq!(visitor.0, vec![Value::from_index(10)]);
        drop(outer);
        assert!(set.is_empty());
    }
}
