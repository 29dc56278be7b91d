use std::fmt;

use crate::{Arity, Host, Value};

/// Host exception classes this layer raises.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionClass {
    ArgumentError,
    TypeError,
    IndexError,
    RuntimeError,
}

impl ExceptionClass {
    pub fn name(self) -> &'static str {
        match self {
            ExceptionClass::ArgumentError => "ArgumentError",
            ExceptionClass::TypeError => "TypeError",
            ExceptionClass::IndexError => "IndexError",
            ExceptionClass::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every failure this layer reports to compiled code.
///
/// Display renders the exact message the host exception carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Wrong number of positional arguments.
    Arity { given: usize, expected: Arity },
    /// Unexpected keyword arguments and other argument contract failures.
    Argument(String),
    /// Failed cast, absurd value, or a value of the wrong shape.
    Type(String),
    /// Constant table overrun.
    IndexOutOfRange { index: usize, len: usize },
    /// Malformed load-time input.
    Runtime(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn exception_class(&self) -> ExceptionClass {
        match self {
            Error::Arity { .. } | Error::Argument(_) => {
                ExceptionClass::ArgumentError
            }
            Error::Type(_) => ExceptionClass::TypeError,
            Error::IndexOutOfRange { .. } => ExceptionClass::IndexError,
            Error::Runtime(_) => ExceptionClass::RuntimeError,
        }
    }

    /// Build the host exception object carrying this error, without raising.
    pub fn to_exception<H: Host>(&self, host: &mut H) -> Value {
        host.new_exception(self.exception_class(), &self.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arity { given, expected } => write!(
                f,
                "wrong number of arguments (given {given}, expected {expected})"
            ),
            Error::IndexOutOfRange { index, len } => write!(
                f,
                "{index} is out of bounds for the constant table ({len})"
            ),
            Error::Argument(msg) | Error::Type(msg) | Error::Runtime(msg) => {
                f.write_str(msg)
            }
        }
    }
}

impl std::error::Error for Error {}
