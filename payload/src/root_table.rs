use log::{debug, trace};

use crate::{Error, Host, Result, Value};

/// Process-wide table of values compiled code refers to by index.
///
/// Literal constants (frozen strings, hash templates, symbols) are registered
/// once at load time and fetched by index afterwards. The backing array is
/// created on first use and registered with the host as a permanent root, so
/// everything in the table lives as long as the host does.
#[derive(Debug, Default)]
pub struct RootTable {
    backing: Option<Value>,
}

impl RootTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The host array holding every registered value, once one exists.
    pub fn backing(&self) -> Option<Value> {
        self.backing
    }

    pub fn len<H: Host>(&self, host: &H) -> usize {
        self.backing
            .and_then(|backing| host.array_elements(backing))
            .map_or(0, <[Value]>::len)
    }

    pub fn is_empty<H: Host>(&self, host: &H) -> bool {
        self.len(host) == 0
    }

    /// Append `value` and return its index. Indices are dense and stable.
    pub fn register<H: Host>(&mut self, host: &mut H, value: Value) -> usize {
        let backing = match self.backing {
            Some(backing) => backing,
            None => {
                let mut scope = host.handle_scope();
                scope.promote(value);
                let backing = host.new_array(&[]);
                host.register_root(backing);
                debug!("created root table {backing:?}");
                self.backing = Some(backing);
                backing
            }
        };

        let index = self.len(host);
        host.array_push(backing, value);
        trace!("root table [{index}] = {value:?}");
        index
    }

    pub fn fetch<H: Host>(&self, host: &H, index: usize) -> Result<Value> {
        let elements = self
            .backing
            .and_then(|backing| host.array_elements(backing))
            .unwrap_or_default();
        elements
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: elements.len(),
            })
    }

    /// Fresh shallow copy of the hash template stored at `index`.
    pub fn duplicate_hash<H: Host>(
        &self,
        host: &mut H,
        index: usize,
    ) -> Result<Value> {
        let template = self.fetch(host, index)?;
        if !host.is_hash(template) {
            return Err(Error::Type(format!(
                "wrong argument type {} (expected Hash)",
                host.class_name(template)
            )));
        }
        host.hash_dup(template).ok_or_else(|| {
            Error::Runtime(format!("failed to copy hash template {index}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Heap, HeapCreateInfo};

    #[test]
    fn indices_are_dense_and_stable() {
        let mut heap = Heap::default();
        let mut table = RootTable::new();
        assert!(table.is_empty(&heap));

        let values: Vec<Value> = (0..5)
            .map(|i| heap.new_string(&format!("constant {i}")))
            .collect();
        for (expected, &value) in values.iter().enumerate() {
            assert_eq!(table.register(&mut heap, value), expected);
        }

        assert_eq!(table.len(&heap), 5);
        for (index, &value) in values.iter().enumerate() {
            assert_eq!(table.fetch(&heap, index), Ok(value));
        }
    }

    #[test]
    fn fetch_past_the_end_fails() {
        let mut heap = Heap::default();
        let mut table = RootTable::new();
        assert_eq!(
            table.fetch(&heap, 0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        );

        table.register(&mut heap, Value::from_fixnum(1));
        let error = table.fetch(&heap, 1).unwrap_err();
        insta::assert_snapshot!(
            error.to_string(),
            @"1 is out of bounds for the constant table (1)"
        );
    }

    #[test]
    fn registered_values_survive_collection() {
        let mut heap = Heap::new(HeapCreateInfo {
            collect_threshold: Some(1),
            ..Default::default()
        });
        let mut table = RootTable::new();

        let first = heap.new_string("first");
        // allocating the backing array collects, `first` is still protected
        table.register(&mut heap, first);
        let second = heap.new_string("second");
        table.register(&mut heap, second);
        heap.collect();

        let fetched = [table.fetch(&heap, 0), table.fetch(&heap, 1)];
        let texts: Vec<_> = fetched
            .iter()
            .map(|value| heap.string_value(*value.as_ref().unwrap()))
            .collect();
        assert_eq!(texts, [Some("first"), Some("second")]);
        assert_eq!(heap.root_count(), 1);
    }

    #[test]
    fn duplicate_hash_returns_independent_copies() {
        let mut heap = Heap::default();
        let mut table = RootTable::new();
        let key = Value::symbol(heap.intern("a"));
        let template = heap.new_hash(&[(key, Value::from_fixnum(1))]);
        let index = table.register(&mut heap, template);

        let first = table.duplicate_hash(&mut heap, index).unwrap();
        let second = table.duplicate_hash(&mut heap, index).unwrap();
        assert_ne!(first, template);
        assert_ne!(first, second);

        heap.hash_insert(first, key, Value::from_fixnum(99));
        assert_eq!(heap.hash_get(template, key), Some(Value::from_fixnum(1)));
        assert_eq!(heap.hash_get(second, key), Some(Value::from_fixnum(1)));
    }

    #[test]
    fn duplicate_hash_rejects_other_values() {
        let mut heap = Heap::default();
        let mut table = RootTable::new();
        let not_a_hash = heap.new_string("x");
        let index = table.register(&mut heap, not_a_hash);

        let error = table.duplicate_hash(&mut heap, index).unwrap_err();
        assert_eq!(error.exception_class(), crate::ExceptionClass::TypeError);
        insta::assert_snapshot!(
            error.to_string(),
            @"wrong argument type String (expected Hash)"
        );
        assert!(matches!(
            table.duplicate_hash(&mut heap, 7),
            Err(Error::IndexOutOfRange { index: 7, len: 1 })
        ));
    }
}
