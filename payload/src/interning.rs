use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

/// Interned symbol handle. Symbols are never collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

struct InternedStringsImpl {
    table: Vec<Arc<str>>,
    mappings: HashMap<Arc<str>, SymbolId, ahash::RandomState>,
}

/// Process-wide symbol table, cheap to clone and share between threads.
#[derive(Clone)]
pub struct InternedStrings(Arc<RwLock<InternedStringsImpl>>);

impl InternedStringsImpl {
    fn new() -> Self {
        Self {
            table: Vec::new(),
            mappings: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    fn get_or_add(&mut self, value: &str) -> SymbolId {
        if let Some(&id) = self.mappings.get(value) {
            return id;
        }
        let id = SymbolId(self.table.len() as u32);
        let interned = Arc::<str>::from(value);
        self.mappings.insert(interned.clone(), id);
        self.table.push(interned);
        id
    }

    fn get(&self, id: SymbolId) -> Option<Arc<str>> {
        self.table.get(id.0 as usize).cloned()
    }
}

impl InternedStrings {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(InternedStringsImpl::new())))
    }

    pub fn add(&self, value: &str) -> SymbolId {
        // fast path, most names are interned more than once
        if let Some(&id) = self.0.read().mappings.get(value) {
            return id;
        }
        self.0.write().get_or_add(value)
    }

    pub fn get(&self, id: SymbolId) -> Option<Arc<str>> {
        self.0.read().get(id)
    }

    pub fn len(&self) -> usize {
        self.0.read().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InternedStrings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InternedStrings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternedStrings")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_id() {
        let strings = InternedStrings::new();
        let a = strings.add("foo");
        let b = strings.add("bar");
        assert_ne!(a, b);
        assert_eq!(strings.add("foo"), a);
        assert_eq!(strings.len(), 2);
        assert_eq!(strings.get(a).as_deref(), Some("foo"));
        assert_eq!(strings.get(b).as_deref(), Some("bar"));
    }

    #[test]
    fn clones_share_the_table() {
        let strings = InternedStrings::new();
        let shared = strings.clone();
        let id = shared.add("#$!");
        assert_eq!(strings.get(id).as_deref(), Some("#$!"));
        assert_eq!(strings.get(SymbolId(99)), None);
    }

    #[test]
    fn interning_from_many_threads() {
        let strings = InternedStrings::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let strings = strings.clone();
                std::thread::spawn(move || {
                    (0..64)
                        .map(|i| strings.add(&format!("local_{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<SymbolId>> = handles
            .into_iter()
            .map(|h| h.join().expect("interning thread panicked"))
            .collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(strings.len(), 64);
    }
}
