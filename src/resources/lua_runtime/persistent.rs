//! Registry references that keep Lua values alive across stack frames.

use std::ffi::c_int;

use mlua::ffi;

use super::stack::{LuaStack, LuaType};

/// `luaL_ref` result for a nil value.
const REF_NIL: c_int = -1;

/// Integer handle into the runtime's registry table.
///
/// Created from the top of the stack with [`PersistentRef::create`] and freed
/// with [`PersistentRef::release`]. A handle that is never released keeps its
/// value alive for the lifetime of the runtime. Handles only mean something
/// inside the runtime that created them.
#[derive(Debug, PartialEq, Eq)]
pub struct PersistentRef(c_int);

impl PersistentRef {
    /// Pops the top slot and stores it in the registry.
    pub fn create(stack: &LuaStack) -> Self {
        Self(unsafe { ffi::luaL_ref(stack.as_ptr(), ffi::LUA_REGISTRYINDEX) })
    }

    /// Stores a copy of the slot at `index`, leaving the stack unchanged.
    pub fn from_slot(stack: &LuaStack, index: c_int) -> Self {
        stack.push_value(index);
        Self::create(stack)
    }

    /// Raw registry index.
    pub fn id(&self) -> c_int {
        self.0
    }

    /// Whether the referenced value was nil when the handle was created.
    pub fn is_nil(&self) -> bool {
        self.0 == REF_NIL
    }

    /// Pushes the referenced value and returns its tag.
    pub fn push(&self, stack: &LuaStack) -> LuaType {
        LuaType::from_raw(unsafe {
            ffi::lua_rawgeti(stack.as_ptr(), ffi::LUA_REGISTRYINDEX, self.0 as _)
        })
    }

    /// Frees the registry slot.
    pub fn release(self, stack: &LuaStack) {
        unsafe { ffi::luaL_unref(stack.as_ptr(), ffi::LUA_REGISTRYINDEX, self.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::lua_runtime::stack::LuaState;

    #[test]
    fn test_ref_survives_stack_pop() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        stack.push_str("kept");
        let reference = PersistentRef::create(stack);
        assert_eq!(stack.top(), 0);

        assert_eq!(reference.push(stack), LuaType::String);
        assert_eq!(stack.to_string_lossy(-1).as_deref(), Some("kept"));
        stack.pop(1);
        reference.release(stack);
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_nil_ref() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        stack.push_nil();
        let reference = PersistentRef::create(stack);
        assert!(reference.is_nil());
        assert_eq!(reference.push(stack), LuaType::Nil);
        stack.pop(1);
        reference.release(stack);
    }

    #[test]
    fn test_from_slot_keeps_original() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        stack.new_table(0, 0);
        let reference = PersistentRef::from_slot(stack, -1);
        assert_eq!(stack.top(), 1);
        assert_eq!(reference.push(stack), LuaType::Table);
        assert!(stack.raw_equal(-1, -2));
        stack.pop(2);
        reference.release(stack);
    }
}
