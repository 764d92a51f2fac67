//! Type-erased view of a single stack slot.

use std::ffi::c_int;
use std::fmt;

use super::persistent::PersistentRef;
use super::stack::{LuaStack, LuaType};

/// A value that can live in one slot of the evaluation stack.
///
/// Values read back from the stack are `Integer` or `Double`; `Float` only
/// appears when native `f32` data is being encoded. The reference variants
/// own a registry handle, which must be given back with
/// [`StackValue::release`].
#[derive(Debug, PartialEq)]
pub enum StackValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f32),
    Double(f64),
    String(String),
    Function(PersistentRef),
    Userdata(PersistentRef),
}

impl StackValue {
    /// Tag this value takes once pushed.
    pub fn lua_type(&self) -> LuaType {
        match self {
            Self::Nil => LuaType::Nil,
            Self::Boolean(_) => LuaType::Boolean,
            Self::Integer(_) | Self::Float(_) | Self::Double(_) => LuaType::Number,
            Self::String(_) => LuaType::String,
            Self::Function(_) => LuaType::Function,
            Self::Userdata(_) => LuaType::Userdata,
        }
    }

    /// Frees any registry handle held by this value.
    pub fn release(self, stack: &LuaStack) {
        match self {
            Self::Function(reference) | Self::Userdata(reference) => reference.release(stack),
            _ => {}
        }
    }
}

impl fmt::Display for StackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n:?}"),
            Self::Double(n) => write!(f, "{n:?}"),
            Self::String(s) => f.write_str(s),
            Self::Function(r) => write!(f, "function: ref {}", r.id()),
            Self::Userdata(r) => write!(f, "userdata: ref {}", r.id()),
        }
    }
}

/// Renders any slot for log output without running metamethods and without
/// touching the stack.
pub fn describe(stack: &LuaStack, index: c_int) -> String {
    match stack.type_of(index) {
        LuaType::Nil | LuaType::None => "nil".to_string(),
        LuaType::Boolean => stack.to_boolean(index).to_string(),
        LuaType::Number | LuaType::String => stack.to_string_lossy(index).unwrap_or_default(),
        other => format!("{}: {:p}", other.name(), stack.to_pointer(index)),
    }
}
