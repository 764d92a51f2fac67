//! The `Keyboard` script global.
//!
//! ```lua
//! if Keyboard.is_pressed("SPACE") then jump() end
//! if Keyboard.is_pressed(Keyboard.keys.LEFT) then walk(-1) end
//! ```

use std::cell::RefCell;
use std::ffi::c_int;
use std::fmt;
use std::rc::Rc;

use mlua::ffi;

use crate::resources::input::{KEY_NAMES, KeySource, key_code};
use crate::resources::lua_runtime::diagnostics::contract_violation;
use crate::resources::lua_runtime::error::BridgeResult;
use crate::resources::lua_runtime::stack::{LuaStack, LuaType, StackGuard, upvalue_index};

/// Host-side state behind `Keyboard.is_pressed`.
///
/// The installed closure shares ownership of the binding, so the host may
/// keep its own handle to swap sources or drop it.
pub struct KeyboardBinding {
    source: RefCell<Rc<dyn KeySource>>,
}

impl KeyboardBinding {
    pub fn new(source: Rc<dyn KeySource>) -> Self {
        Self {
            source: RefCell::new(source),
        }
    }

    /// Swaps the key source. Closures installed earlier see the new one.
    pub fn set_source(&self, source: Rc<dyn KeySource>) {
        *self.source.borrow_mut() = source;
    }

    pub fn is_pressed(&self, code: i32) -> bool {
        self.source.borrow().is_pressed(code)
    }
}

impl fmt::Debug for KeyboardBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardBinding").finish_non_exhaustive()
    }
}

/// `Keyboard.is_pressed(key)`. Upvalues: binding.
unsafe extern "C-unwind" fn keyboard_is_pressed(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    match unsafe { query_key(&stack) } {
        Ok(pressed) => {
            stack.push_boolean(pressed);
            1
        }
        Err(message) => unsafe { contract_violation(&stack, message) },
    }
}

/// Body of `Keyboard.is_pressed`. Codes with no key behind them read as
/// released; names and argument types the table does not know are errors.
unsafe fn query_key(stack: &LuaStack) -> Result<bool, String> {
    let Some(binding) = (unsafe { stack.shared_at::<KeyboardBinding>(upvalue_index(1)) }) else {
        return Ok(false);
    };

    let code = match stack.type_of(1) {
        LuaType::String => {
            let name = stack.to_string_lossy(1).unwrap_or_default();
            key_code(&name).ok_or_else(|| format!("unknown key name '{name}'"))?
        }
        LuaType::Number => match stack.to_integer(1) {
            Some(code) => match i32::try_from(code) {
                Ok(code) => code,
                Err(_) => return Ok(false),
            },
            None => {
                return Err(format!(
                    "Keyboard.is_pressed expects an integer key code, found {}",
                    stack.to_string_lossy(1).unwrap_or_default()
                ));
            }
        },
        other => {
            return Err(format!(
                "Keyboard.is_pressed expects a key name or code, found {}",
                other.name()
            ));
        }
    };
    Ok(binding.is_pressed(code))
}

/// Installs the global `Keyboard` table backed by `binding`.
pub fn install(stack: &LuaStack, binding: Rc<KeyboardBinding>) -> BridgeResult<()> {
    let _guard = StackGuard::new(stack);
    stack.ensure(4)?;
    stack.new_table(0, 2);

    if let Err(err) = stack.push_shared(binding) {
        stack.pop(1);
        return Err(err);
    }
    stack.push_closure(keyboard_is_pressed, 1);
    if let Err(err) = stack.set_field(-2, "is_pressed") {
        stack.pop(1);
        return Err(err);
    }

    stack.new_table(0, KEY_NAMES.len() as c_int);
    for &(name, code) in KEY_NAMES {
        stack.push_integer(i64::from(code));
        if let Err(err) = stack.set_field(-2, name) {
            stack.pop(2);
            return Err(err);
        }
    }
    if let Err(err) = stack.set_field(-2, "keys") {
        stack.pop(1);
        return Err(err);
    }

    stack.set_global("Keyboard")
}
