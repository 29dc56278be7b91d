//! Calling-convention adapters.
//!
//! Entry points compiled code calls at argument checks, casts,
//! destructuring and string building. Every function that can only fail
//! returns `Result<Infallible>` so call sites propagate it with `?`.
use std::{convert::Infallible, fmt};

use log::{debug, trace, warn};

use crate::{Error, Host, Result, Value};

/// Accepted positional argument count.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Arity {
    pub min: usize,
    /// `None` when trailing arguments are collected into a rest parameter.
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exact(count: usize) -> Self {
        Self {
            min: count,
            max: Some(count),
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn range(min: usize, max: usize) -> Self {
        debug_assert!(min <= max, "arity range {min}..{max} is inverted");
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn new(min: usize, max: Option<usize>) -> Self {
        match max {
            Some(max) => Self::range(min, max),
            None => Self::at_least(min),
        }
    }

    pub fn accepts(self, argc: usize) -> bool {
        argc >= self.min && self.max.is_none_or(|max| argc <= max)
    }

    pub fn check(self, argc: usize) -> Result<()> {
        if self.accepts(argc) {
            Ok(())
        } else {
            Err(build_arity_error(argc, self))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{}..{max}", self.min),
            None => write!(f, "{}+", self.min),
        }
    }
}

/// The error for calling with `argc` arguments, without raising it.
pub fn build_arity_error(argc: usize, arity: Arity) -> Error {
    Error::Arity {
        given: argc,
        expected: arity,
    }
}

/// Host exception object for an arity mismatch, without raising it.
pub fn arity_exception<H: Host>(
    host: &mut H,
    argc: usize,
    arity: Arity,
) -> Value {
    build_arity_error(argc, arity).to_exception(host)
}

pub fn raise_arity(argc: usize, arity: Arity) -> Result<Infallible> {
    debug!("arity mismatch: given {argc}, expected {arity}");
    Err(build_arity_error(argc, arity))
}

/// Reject the keyword arguments left over in `extra` after binding.
pub fn raise_extra_keywords<H: Host>(
    host: &mut H,
    extra: Value,
) -> Result<Infallible> {
    let mut scope = host.handle_scope();
    scope.promote(extra);
    let keys = match host.hash_keys(extra) {
        Some(keys) => scope.promote(keys),
        None => extra,
    };
    let rendered = host.render(keys);
    debug!("unknown keywords {rendered}");
    Err(Error::Argument(format!("unknown keywords: {rendered}")))
}

/// A runtime type check emitted for `method` failed on `value`.
pub fn cast_failure<H: Host>(
    host: &mut H,
    value: Value,
    method: &str,
    expected: &str,
) -> Result<Infallible> {
    let mut scope = host.handle_scope();
    scope.promote(value);
    let class = host.class_name(value);
    let rendered = host.render(value);
    Err(Error::Type(format!(
        "{method}: Expected type {expected}, got type {class} with value \
         {rendered}"
    )))
}

/// A branch the type checker proved unreachable was reached.
pub fn absurd<H: Host>(host: &mut H, value: Value) -> Result<Infallible> {
    let mut scope = host.handle_scope();
    scope.promote(value);
    let rendered = host.render(value);
    warn!("reached an unreachable branch with {rendered}");
    Err(Error::Type(format!(
        "Control flow reached T.absurd. Got value: {rendered}"
    )))
}

/// Array to destructure `value` into `before` leading and `after` trailing
/// targets.
///
/// An array already long enough is returned as is. Anything else is copied,
/// converted values and non-arrays included, and padded with nil up to
/// `before + after` elements.
pub fn expand_splat<H: Host>(
    host: &mut H,
    value: Value,
    before: usize,
    after: usize,
) -> Value {
    let needed = before + after;
    let mut scope = host.handle_scope();
    scope.promote(value);

    let is_array = host.is_array(value);
    let source = if is_array {
        Some(value)
    } else {
        host.check_array_type(value)
            .map(|converted| scope.promote(converted))
    };

    let source_elements = source.and_then(|array| host.array_elements(array));
    let mut elements = match source_elements {
        Some(elements) => {
            if is_array && elements.len() >= needed {
                return value;
            }
            elements.to_vec()
        }
        None => vec![value],
    };

    if elements.len() < needed {
        trace!("padding splat of {} to {needed}", elements.len());
        elements.resize(needed, Value::NIL);
    }
    host.new_array(&elements)
}

/// Concatenate `values` into one new string, converting non-strings with
/// `to_s` from left to right.
pub fn string_interpolate<H: Host>(host: &mut H, values: &[Value]) -> Value {
    let mut scope = host.handle_scope();
    for &value in values {
        scope.promote(value);
    }

    let mut parts = Vec::with_capacity(values.len());
    for &value in values {
        let part = if host.is_string(value) {
            value
        } else {
            scope.promote(host.as_string(value))
        };
        parts.push(part);
    }
    host.string_concat(&parts)
}

/// Size callback for enumerators over an array receiver.
pub fn enumerator_length_from_array<H: Host>(
    host: &H,
    receiver: Value,
) -> Value {
    host.array_elements(receiver).map_or(Value::NIL, |elements| {
        Value::from_fixnum(elements.len() as i64)
    })
}

/// Exception handler that does nothing. Used for rescue and ensure regions
/// compiled away entirely.
pub fn noop_handler() -> Value {
    Value::UNDEF
}
