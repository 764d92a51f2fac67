//! Error taxonomy for the Lua bridge.
//!
//! Contract violations between scripts and native code (`TypeMismatch`,
//! `NotAFunction`, `NotATable`, `UnknownField`) surface as values here when a
//! host-facing operation detects them. Inside Lua callbacks they are logged
//! with the calling script's `file:line` tag instead, since a callback cannot
//! return a Rust error to the script.

use std::ffi::c_int;
use std::fmt;

use mlua::ffi;
use thiserror::Error;

/// Result alias used by every bridge operation.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Classification of a failed protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorCode {
    /// The script raised an error (`LUA_ERRRUN`).
    RuntimeError,
    /// The allocator failed (`LUA_ERRMEM`).
    MemoryError,
    /// The message handler itself raised an error (`LUA_ERRERR`).
    ErrorInErrorHandler,
    /// Any status the runtime reports that is not part of the taxonomy above.
    Other(c_int),
}

impl CallErrorCode {
    /// Maps a raw `lua_pcall` status to a code. Returns `None` for `LUA_OK`.
    pub fn from_status(status: c_int) -> Option<Self> {
        match status {
            ffi::LUA_OK => None,
            ffi::LUA_ERRRUN => Some(Self::RuntimeError),
            ffi::LUA_ERRMEM => Some(Self::MemoryError),
            ffi::LUA_ERRERR => Some(Self::ErrorInErrorHandler),
            other => Some(Self::Other(other)),
        }
    }

    /// The runtime's name for this status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RuntimeError => "LUA_ERRRUN",
            Self::MemoryError => "LUA_ERRMEM",
            Self::ErrorInErrorHandler => "LUA_ERRERR",
            Self::Other(_) => "LUA_ERRUNKNOWN",
        }
    }
}

impl fmt::Display for CallErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(status) => write!(f, "{} ({status})", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

/// Every failure the bridge can report.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The value on the stack does not carry the tag the native type needs.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// No conversion exists for the requested value or native type.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Name or path resolution ended on something that cannot be called.
    #[error("'{name}' is not a function (found {found})")]
    NotAFunction { name: String, found: &'static str },

    /// An intermediate path segment is not a table.
    #[error("'{name}' is not a table (found {found})")]
    NotATable { name: String, found: &'static str },

    /// Field access on a native type for a name that was never registered.
    #[error("unknown field '{field}' on {type_name}")]
    UnknownField { type_name: String, field: String },

    /// A protected call failed inside the runtime.
    #[error("{code}: {message}")]
    Call {
        code: CallErrorCode,
        message: String,
    },

    /// A chunk failed to compile.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A name that has to cross into C contains an interior NUL byte.
    #[error("invalid name {0:?}: contains a NUL byte")]
    InvalidName(String),

    /// The runtime refused to grow the evaluation stack.
    #[error("cannot reserve {0} stack slots")]
    StackOverflow(c_int),

    /// A script file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
