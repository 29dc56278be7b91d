//! Value: any raw value crossing the native boundary, a small integer, a
//! special constant, a static symbol or a reference into the host heap.
//!
//! Values are plain `Copy` words. Holding one does not keep the referenced
//! object alive, see [`crate::HandleScope`] for that.
use crate::SymbolId;

#[allow(unused)]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueTag {
    Fixnum = 0b0,
    Reference = 0b01,
    Special = 0b11,
}

pub const VALUE_TAG_MASK: u64 = 0b11;

// special values: [0..<2 tag][2..<4 kind][4..<64 payload]
const SPECIAL_KIND_SHIFT: u64 = 2;
const SPECIAL_KIND_MASK: u64 = 0b11 << SPECIAL_KIND_SHIFT;
const SPECIAL_PAYLOAD_SHIFT: u64 = 4;

const SPECIAL_KIND_CONSTANT: u64 = 0;
const SPECIAL_KIND_SYMBOL: u64 = 1;

const REFERENCE_SHIFT: u64 = 2;

const fn special(kind: u64, payload: u64) -> u64 {
    (payload << SPECIAL_PAYLOAD_SHIFT)
        | (kind << SPECIAL_KIND_SHIFT)
        | ValueTag::Special as u64
}

/// A generic Value, the object handle passed across the native boundary.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    pub const NIL: Value = Value(special(SPECIAL_KIND_CONSTANT, 0));
    pub const FALSE: Value = Value(special(SPECIAL_KIND_CONSTANT, 1));
    pub const TRUE: Value = Value(special(SPECIAL_KIND_CONSTANT, 2));
    /// Marker for "no value at all", distinct from `NIL`.
    pub const UNDEF: Value = Value(special(SPECIAL_KIND_CONSTANT, 3));

    pub fn from_fixnum(value: i64) -> Self {
        Self((value as u64) << 1)
    }

    pub fn symbol(id: SymbolId) -> Self {
        Self(special(SPECIAL_KIND_SYMBOL, id.index() as u64))
    }

    /// Create a reference to heap slot `index`.
    pub(crate) fn from_index(index: u32) -> Self {
        Self(((index as u64) << REFERENCE_SHIFT) | ValueTag::Reference as u64)
    }

    pub fn is_fixnum(self) -> bool {
        self.0 & 0b1 == ValueTag::Fixnum as u64
    }

    pub fn is_reference(self) -> bool {
        self.0 & VALUE_TAG_MASK == ValueTag::Reference as u64
    }

    pub fn is_special(self) -> bool {
        self.0 & VALUE_TAG_MASK == ValueTag::Special as u64
    }

    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }

    pub fn is_undef(self) -> bool {
        self == Self::UNDEF
    }

    pub fn is_symbol(self) -> bool {
        self.is_special()
            && (self.0 & SPECIAL_KIND_MASK) >> SPECIAL_KIND_SHIFT
                == SPECIAL_KIND_SYMBOL
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(self) -> bool {
        self != Self::NIL && self != Self::FALSE
    }

    pub fn as_fixnum(self) -> Option<i64> {
        if self.is_fixnum() {
            // arithmetic shift restores the sign
            return Some((self.0 as i64) >> 1);
        }
        None
    }

    pub fn as_symbol(self) -> Option<SymbolId> {
        if self.is_symbol() {
            let payload = self.0 >> SPECIAL_PAYLOAD_SHIFT;
            return Some(SymbolId::from_index(payload as u32));
        }
        None
    }

    /// Heap slot index of a reference.
    pub(crate) fn as_index(self) -> Option<usize> {
        if self.is_reference() {
            return Some((self.0 >> REFERENCE_SHIFT) as usize);
        }
        None
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::NIL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixnums_keep_their_sign() {
        for n in [0, 1, -1, 42, -4096, i64::MAX >> 1, i64::MIN >> 1] {
            let value = Value::from_fixnum(n);
            assert!(value.is_fixnum());
            assert!(!value.is_reference());
            assert_eq!(value.as_fixnum(), Some(n));
        }
    }

    #[test]
    fn special_constants_are_distinct() {
        let specials = [Value::NIL, Value::FALSE, Value::TRUE, Value::UNDEF];
        for (i, a) in specials.iter().enumerate() {
            assert!(a.is_special());
            assert!(!a.is_fixnum());
            assert!(!a.is_symbol());
            for b in &specials[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn truthiness_follows_host_rules() {
        assert!(!Value::NIL.is_truthy());
        assert!(!Value::FALSE.is_truthy());
        assert!(Value::TRUE.is_truthy());
        assert!(Value::from_fixnum(0).is_truthy());
        assert!(Value::UNDEF.is_truthy());
    }

    #[test]
    fn references_and_symbols_do_not_overlap() {
        let reference = Value::from_index(7);
        assert!(reference.is_reference());
        assert_eq!(reference.as_index(), Some(7));
        assert_eq!(reference.as_symbol(), None);

        let symbol = Value::symbol(SymbolId::from_index(7));
        assert!(symbol.is_symbol());
        assert_eq!(symbol.as_index(), None);
        assert_eq!(symbol.as_symbol(), Some(SymbolId::from_index(7)));
    }
}
