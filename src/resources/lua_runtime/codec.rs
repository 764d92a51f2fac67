//! Conversion between native values and stack slots.
//!
//! [`Encode`] pushes exactly one slot. [`Decode`] reads one slot in place and
//! never changes the stack depth. Supporting a new native type means
//! implementing these two traits for it; nothing in the call or field
//! machinery needs to change.
//!
//! Decoding is strict. Every implementation checks the slot's runtime tag
//! and fails with [`BridgeError::TypeMismatch`] rather than coercing, except
//! that `f32` and `f64` both accept any number, since the runtime stores
//! every number in its native representation.

use std::ffi::{CStr, c_int};

use super::error::{BridgeError, BridgeResult};
use super::persistent::PersistentRef;
use super::stack::{LuaStack, LuaType};
use super::value::StackValue;

/// Pushes a native value as one stack slot.
pub trait Encode {
    fn encode(&self, stack: &LuaStack);
}

/// Reads a stack slot back into a native value.
///
/// The lifetime lets borrowed forms such as `&str` point into the runtime's
/// string storage. Such borrows are only valid while the slot stays on the
/// stack.
pub trait Decode<'s>: Sized {
    /// Tag the slot must carry.
    const LUA_TYPE: LuaType;
    /// Type name used in generated LuaLS annotations.
    const ANNOTATION: &'static str;

    /// # Errors
    ///
    /// `TypeMismatch` when the slot at `index` has the wrong tag.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self>;
}

fn mismatch(stack: &LuaStack, index: c_int, expected: &'static str) -> BridgeError {
    BridgeError::TypeMismatch {
        expected,
        found: stack.type_of(index).name(),
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, stack: &LuaStack) {
        (**self).encode(stack)
    }
}

impl Encode for i32 {
    fn encode(&self, stack: &LuaStack) {
        stack.push_integer(i64::from(*self));
    }
}

impl<'s> Decode<'s> for i32 {
    const LUA_TYPE: LuaType = LuaType::Number;
    const ANNOTATION: &'static str = "integer";

    /// Fails unless the slot is a number with an exact integer value that
    /// fits in 32 bits.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        stack.expect_type(index, LuaType::Number)?;
        stack
            .to_integer(index)
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| mismatch(stack, index, "32-bit integer"))
    }
}

impl Encode for f32 {
    fn encode(&self, stack: &LuaStack) {
        stack.push_number(f64::from(*self));
    }
}

impl<'s> Decode<'s> for f32 {
    const LUA_TYPE: LuaType = LuaType::Number;
    const ANNOTATION: &'static str = "number";

    /// Fails unless the slot is a number.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        stack.expect_type(index, LuaType::Number)?;
        stack
            .to_number(index)
            .map(|n| n as f32)
            .ok_or_else(|| mismatch(stack, index, "number"))
    }
}

impl Encode for f64 {
    fn encode(&self, stack: &LuaStack) {
        stack.push_number(*self);
    }
}

impl<'s> Decode<'s> for f64 {
    const LUA_TYPE: LuaType = LuaType::Number;
    const ANNOTATION: &'static str = "number";

    /// Fails unless the slot is a number.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        stack.expect_type(index, LuaType::Number)?;
        stack
            .to_number(index)
            .ok_or_else(|| mismatch(stack, index, "number"))
    }
}

impl Encode for bool {
    fn encode(&self, stack: &LuaStack) {
        stack.push_boolean(*self);
    }
}

impl<'s> Decode<'s> for bool {
    const LUA_TYPE: LuaType = LuaType::Boolean;
    const ANNOTATION: &'static str = "boolean";

    /// Fails unless the slot is a boolean; truthiness of other values is not
    /// accepted.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        stack.expect_type(index, LuaType::Boolean)?;
        Ok(stack.to_boolean(index))
    }
}

impl Encode for CStr {
    fn encode(&self, stack: &LuaStack) {
        stack.push_cstr(self);
    }
}

impl<'s> Decode<'s> for &'s CStr {
    const LUA_TYPE: LuaType = LuaType::String;
    const ANNOTATION: &'static str = "string";

    /// Fails unless the slot is a string. The view ends at the first NUL.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        stack
            .to_cstr(index)
            .ok_or_else(|| mismatch(stack, index, "string"))
    }
}

impl Encode for str {
    fn encode(&self, stack: &LuaStack) {
        stack.push_str(self);
    }
}

impl<'s> Decode<'s> for &'s str {
    const LUA_TYPE: LuaType = LuaType::String;
    const ANNOTATION: &'static str = "string";

    /// Fails unless the slot is a string holding valid UTF-8.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        let bytes = stack
            .to_bytes(index)
            .ok_or_else(|| mismatch(stack, index, "string"))?;
        std::str::from_utf8(bytes).map_err(|_| BridgeError::TypeMismatch {
            expected: "utf-8 string",
            found: "binary string",
        })
    }
}

impl Encode for String {
    fn encode(&self, stack: &LuaStack) {
        stack.push_str(self);
    }
}

impl<'s> Decode<'s> for String {
    const LUA_TYPE: LuaType = LuaType::String;
    const ANNOTATION: &'static str = "string";

    /// Fails unless the slot is a string. Invalid UTF-8 is replaced.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        stack
            .to_bytes(index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| mismatch(stack, index, "string"))
    }
}

impl Encode for StackValue {
    fn encode(&self, stack: &LuaStack) {
        match self {
            StackValue::Nil => stack.push_nil(),
            StackValue::Boolean(b) => stack.push_boolean(*b),
            StackValue::Integer(n) => stack.push_integer(*n),
            StackValue::Float(n) => stack.push_number(f64::from(*n)),
            StackValue::Double(n) => stack.push_number(*n),
            StackValue::String(s) => stack.push_str(s),
            StackValue::Function(reference) | StackValue::Userdata(reference) => {
                reference.push(stack);
            }
        }
    }
}

impl<'s> Decode<'s> for StackValue {
    const LUA_TYPE: LuaType = LuaType::None;
    const ANNOTATION: &'static str = "any";

    /// Accepts every tag with a variant. Functions and full userdata are
    /// captured as registry references owned by the returned value. Tables,
    /// threads and light userdata fail with `UnsupportedType`.
    fn decode(stack: &'s LuaStack, index: c_int) -> BridgeResult<Self> {
        let value = match stack.type_of(index) {
            LuaType::None | LuaType::Nil => StackValue::Nil,
            LuaType::Boolean => StackValue::Boolean(stack.to_boolean(index)),
            LuaType::Number if stack.is_integer(index) => {
                StackValue::Integer(stack.to_integer(index).unwrap_or_default())
            }
            LuaType::Number => StackValue::Double(stack.to_number(index).unwrap_or_default()),
            LuaType::String => StackValue::String(String::decode(stack, index)?),
            LuaType::Function => StackValue::Function(PersistentRef::from_slot(stack, index)),
            LuaType::Userdata => StackValue::Userdata(PersistentRef::from_slot(stack, index)),
            other @ (LuaType::Table | LuaType::Thread | LuaType::LightUserdata) => {
                return Err(BridgeError::UnsupportedType(format!(
                    "{} has no stack value representation",
                    other.name()
                )));
            }
        };
        Ok(value)
    }
}

/// An ordered argument list for a script call.
///
/// Implemented for `()`, tuples of up to eight [`Encode`] values, and slices
/// or vectors of pre-encoded [`StackValue`]s. Arguments are pushed strictly
/// left to right.
pub trait PushArgs {
    /// Number of slots [`PushArgs::push_all`] will push.
    fn count(&self) -> usize;

    /// Pushes every argument and returns how many were pushed.
    fn push_all(&self, stack: &LuaStack) -> usize;
}

impl PushArgs for () {
    fn count(&self) -> usize {
        0
    }

    fn push_all(&self, _stack: &LuaStack) -> usize {
        0
    }
}

impl PushArgs for [StackValue] {
    fn count(&self) -> usize {
        self.len()
    }

    fn push_all(&self, stack: &LuaStack) -> usize {
        for value in self {
            value.encode(stack);
        }
        self.count()
    }
}

impl PushArgs for Vec<StackValue> {
    fn count(&self) -> usize {
        self.as_slice().count()
    }

    fn push_all(&self, stack: &LuaStack) -> usize {
        self.as_slice().push_all(stack)
    }
}

impl<A: PushArgs + ?Sized> PushArgs for &A {
    fn count(&self) -> usize {
        (**self).count()
    }

    fn push_all(&self, stack: &LuaStack) -> usize {
        (**self).push_all(stack)
    }
}

macro_rules! impl_push_args {
    ($count:expr; $($name:ident),+) => {
        impl<$($name: Encode),+> PushArgs for ($($name,)+) {
            fn count(&self) -> usize {
                $count
            }

            #[allow(non_snake_case)]
            fn push_all(&self, stack: &LuaStack) -> usize {
                let ($($name,)+) = self;
                $( $name.encode(stack); )+
                $count
            }
        }
    };
}

impl_push_args!(1; A);
impl_push_args!(2; A, B);
impl_push_args!(3; A, B, C);
impl_push_args!(4; A, B, C, D);
impl_push_args!(5; A, B, C, D, E);
impl_push_args!(6; A, B, C, D, E, F);
impl_push_args!(7; A, B, C, D, E, F, G);
impl_push_args!(8; A, B, C, D, E, F, G, H);
