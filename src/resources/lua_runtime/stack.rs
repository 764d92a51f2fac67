//! The Lua evaluation stack and its balance guard.
//!
//! [`LuaStack`] is a thin handle over a raw `lua_State` exposing the subset of
//! the C API the bridge needs. [`LuaState`] owns a state and closes it on drop.
//! [`StackGuard`] records the stack depth when a bridge operation starts and
//! checks the expected depth when it ends, on every exit path.
//!
//! All indexing follows Lua conventions: positive indices count from the
//! bottom (1 is the first slot), negative indices count from the top.

use std::alloc::{Layout, alloc, dealloc, realloc};
use std::cell::Cell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr::NonNull;
use std::rc::Rc;

use log::error;
use mlua::ffi;

use super::error::{BridgeError, BridgeResult, CallErrorCode};

/// Runtime type tag of a stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaType {
    None,
    Nil,
    Boolean,
    LightUserdata,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl LuaType {
    /// Maps a raw `lua_type` result to a tag.
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            ffi::LUA_TNIL => Self::Nil,
            ffi::LUA_TBOOLEAN => Self::Boolean,
            ffi::LUA_TLIGHTUSERDATA => Self::LightUserdata,
            ffi::LUA_TNUMBER => Self::Number,
            ffi::LUA_TSTRING => Self::String,
            ffi::LUA_TTABLE => Self::Table,
            ffi::LUA_TFUNCTION => Self::Function,
            ffi::LUA_TUSERDATA => Self::Userdata,
            ffi::LUA_TTHREAD => Self::Thread,
            _ => Self::None,
        }
    }

    /// The name Lua's `type()` would report.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "no value",
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::LightUserdata | Self::Userdata => "userdata",
            Self::Number => "number",
            Self::String => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::Thread => "thread",
        }
    }
}

/// Converts a Rust string into a C string for the name-based API calls.
pub(crate) fn c_name(name: &str) -> BridgeResult<CString> {
    CString::new(name).map_err(|_| BridgeError::InvalidName(name.to_string()))
}

/// Pseudo-index of the `i`-th upvalue of the running C closure.
pub const fn upvalue_index(i: c_int) -> c_int {
    ffi::LUA_REGISTRYINDEX - i
}

/// Handle to a Lua evaluation stack.
///
/// The handle is deliberately neither `Clone` nor `Send`: host code borrows
/// it from the [`LuaState`] that owns the runtime, and native callbacks build
/// a temporary one around the state Lua hands them.
#[derive(Debug)]
pub struct LuaStack {
    raw: NonNull<ffi::lua_State>,
}

impl LuaStack {
    /// Wraps a raw state pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be non-null and point to a live Lua state for as long as the
    /// returned handle is used.
    pub unsafe fn from_raw(raw: *mut ffi::lua_State) -> Self {
        Self {
            raw: unsafe { NonNull::new_unchecked(raw) },
        }
    }

    /// The underlying state pointer.
    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.raw.as_ptr()
    }

    /// Index of the top slot, which is also the number of slots in use.
    pub fn top(&self) -> c_int {
        unsafe { ffi::lua_gettop(self.as_ptr()) }
    }

    pub fn set_top(&self, index: c_int) {
        unsafe { ffi::lua_settop(self.as_ptr(), index) }
    }

    /// Pops `n` slots.
    pub fn pop(&self, n: c_int) {
        self.set_top(-n - 1);
    }

    /// Removes the slot at `index`, shifting the slots above it down.
    pub fn remove(&self, index: c_int) {
        unsafe { ffi::lua_rotate(self.as_ptr(), index, -1) };
        self.pop(1);
    }

    /// Converts a relative index into an absolute one.
    pub fn abs_index(&self, index: c_int) -> c_int {
        unsafe { ffi::lua_absindex(self.as_ptr(), index) }
    }

    /// Makes sure at least `extra` more slots can be pushed.
    pub fn ensure(&self, extra: c_int) -> BridgeResult<()> {
        if unsafe { ffi::lua_checkstack(self.as_ptr(), extra) } == 0 {
            return Err(BridgeError::StackOverflow(extra));
        }
        Ok(())
    }

    pub fn type_of(&self, index: c_int) -> LuaType {
        LuaType::from_raw(unsafe { ffi::lua_type(self.as_ptr(), index) })
    }

    /// Fails with `TypeMismatch` unless the slot carries `expected`.
    pub fn expect_type(&self, index: c_int, expected: LuaType) -> BridgeResult<()> {
        let found = self.type_of(index);
        if found != expected {
            return Err(BridgeError::TypeMismatch {
                expected: expected.name(),
                found: found.name(),
            });
        }
        Ok(())
    }

    pub fn push_nil(&self) {
        unsafe { ffi::lua_pushnil(self.as_ptr()) }
    }

    pub fn push_boolean(&self, value: bool) {
        unsafe { ffi::lua_pushboolean(self.as_ptr(), c_int::from(value)) }
    }

    pub fn push_integer(&self, value: i64) {
        unsafe { ffi::lua_pushinteger(self.as_ptr(), value as ffi::lua_Integer) }
    }

    pub fn push_number(&self, value: f64) {
        unsafe { ffi::lua_pushnumber(self.as_ptr(), value as ffi::lua_Number) }
    }

    /// Pushes a length-delimited string. Interior NUL bytes are preserved.
    pub fn push_str(&self, value: &str) {
        unsafe {
            ffi::lua_pushlstring(self.as_ptr(), value.as_ptr() as *const c_char, value.len());
        }
    }

    /// Pushes a NUL-terminated string.
    pub fn push_cstr(&self, value: &CStr) {
        unsafe {
            ffi::lua_pushstring(self.as_ptr(), value.as_ptr());
        }
    }

    pub fn push_light_userdata(&self, ptr: *mut c_void) {
        unsafe { ffi::lua_pushlightuserdata(self.as_ptr(), ptr) }
    }

    /// Pushes a copy of the slot at `index`.
    pub fn push_value(&self, index: c_int) {
        unsafe { ffi::lua_pushvalue(self.as_ptr(), index) }
    }

    /// Pushes a native closure that captures the top `upvalues` slots.
    pub fn push_closure(&self, function: ffi::lua_CFunction, upvalues: c_int) {
        unsafe { ffi::lua_pushcclosure(self.as_ptr(), function, upvalues) }
    }

    pub fn new_table(&self, array_len: c_int, record_len: c_int) {
        unsafe { ffi::lua_createtable(self.as_ptr(), array_len, record_len) }
    }

    /// Pushes the globals table straight from the registry.
    fn push_globals(&self) {
        unsafe {
            ffi::lua_rawgeti(self.as_ptr(), ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_GLOBALS as _);
        }
    }

    /// Pushes the global `name` and returns its tag.
    ///
    /// Access is raw: metamethods on `_G` (strict-mode guards, for example)
    /// never run here, since an error raised outside a protected call would
    /// abort the process.
    pub fn push_global(&self, name: &str) -> BridgeResult<LuaType> {
        c_name(name)?;
        self.ensure(2)?;
        self.push_globals();
        let found = self.raw_get_field(-1, name);
        self.remove(-2);
        Ok(found)
    }

    /// Pops the top slot into the global `name`, bypassing `_G` metamethods.
    pub fn set_global(&self, name: &str) -> BridgeResult<()> {
        if let Err(err) = c_name(name).and_then(|_| self.ensure(3)) {
            self.pop(1);
            return Err(err);
        }
        self.push_globals();
        self.push_str(name);
        self.push_value(-3);
        unsafe { ffi::lua_rawset(self.as_ptr(), -3) };
        self.pop(2);
        Ok(())
    }

    /// Pushes `t[key]` for the table at `table` without invoking metamethods.
    pub fn raw_get_field(&self, table: c_int, key: &str) -> LuaType {
        let table = self.abs_index(table);
        self.push_str(key);
        LuaType::from_raw(unsafe { ffi::lua_rawget(self.as_ptr(), table) })
    }

    /// Pops a key and pushes `t[key]` for the table at `table`, without
    /// invoking metamethods.
    pub fn raw_get(&self, table: c_int) -> LuaType {
        LuaType::from_raw(unsafe { ffi::lua_rawget(self.as_ptr(), table) })
    }

    /// Pops the top slot into `t[key]` for the table at `table`, without
    /// invoking metamethods.
    pub fn set_field(&self, table: c_int, key: &str) -> BridgeResult<()> {
        if let Err(err) = c_name(key).and_then(|_| self.ensure(1)) {
            self.pop(1);
            return Err(err);
        }
        let table = self.abs_index(table);
        self.push_str(key);
        unsafe {
            ffi::lua_rotate(self.as_ptr(), -2, 1);
            ffi::lua_rawset(self.as_ptr(), table);
        }
        Ok(())
    }

    /// Pops the top slot into `registry[key]`.
    pub fn set_registry_field(&self, key: &str) -> BridgeResult<()> {
        self.set_field(ffi::LUA_REGISTRYINDEX, key)
    }

    /// Pushes the metatable of the value at `index`. Pushes nothing and
    /// returns `false` when the value has none.
    pub fn push_metatable(&self, index: c_int) -> bool {
        unsafe { ffi::lua_getmetatable(self.as_ptr(), index) != 0 }
    }

    /// Pops a table and sets it as the metatable of the value at `index`.
    pub fn set_metatable(&self, index: c_int) {
        unsafe {
            ffi::lua_setmetatable(self.as_ptr(), index);
        }
    }

    /// Primitive equality, without `__eq`.
    pub fn raw_equal(&self, a: c_int, b: c_int) -> bool {
        unsafe { ffi::lua_rawequal(self.as_ptr(), a, b) != 0 }
    }

    pub fn to_boolean(&self, index: c_int) -> bool {
        unsafe { ffi::lua_toboolean(self.as_ptr(), index) != 0 }
    }

    /// Reads a number slot as an integer, if it has an exact integer value.
    pub fn to_integer(&self, index: c_int) -> Option<i64> {
        let mut is_num: c_int = 0;
        let value = unsafe { ffi::lua_tointegerx(self.as_ptr(), index, &mut is_num) };
        (is_num != 0).then_some(value as i64)
    }

    pub fn to_number(&self, index: c_int) -> Option<f64> {
        let mut is_num: c_int = 0;
        let value = unsafe { ffi::lua_tonumberx(self.as_ptr(), index, &mut is_num) };
        (is_num != 0).then_some(value as f64)
    }

    /// Whether a number slot uses the integer subtype.
    pub fn is_integer(&self, index: c_int) -> bool {
        unsafe { ffi::lua_isinteger(self.as_ptr(), index) != 0 }
    }

    /// Bytes of a string slot. Returns `None` for every other tag, so numbers
    /// are never converted in place.
    ///
    /// The slice stays valid while the string is reachable from the stack.
    pub fn to_bytes(&self, index: c_int) -> Option<&[u8]> {
        if self.type_of(index) != LuaType::String {
            return None;
        }
        let mut len: usize = 0;
        let ptr = unsafe { ffi::lua_tolstring(self.as_ptr(), index, &mut len) };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(ptr as *const u8, len) })
    }

    /// NUL-terminated view of a string slot.
    pub fn to_cstr(&self, index: c_int) -> Option<&CStr> {
        if self.type_of(index) != LuaType::String {
            return None;
        }
        let ptr = unsafe { ffi::lua_tolstring(self.as_ptr(), index, std::ptr::null_mut()) };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(ptr) })
    }

    /// Renders a string or number slot for messages, without mutating it.
    pub fn to_string_lossy(&self, index: c_int) -> Option<String> {
        match self.type_of(index) {
            LuaType::String => self
                .to_bytes(index)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            LuaType::Number if self.is_integer(index) => {
                self.to_integer(index).map(|n| n.to_string())
            }
            LuaType::Number => self.to_number(index).map(|n| format!("{n:?}")),
            _ => None,
        }
    }

    /// Memory block of a full userdata, or the pointer of a light one.
    pub fn to_userdata(&self, index: c_int) -> *mut c_void {
        unsafe { ffi::lua_touserdata(self.as_ptr(), index) }
    }

    /// Identity pointer of a reference value, used for display only.
    pub fn to_pointer(&self, index: c_int) -> *const c_void {
        unsafe { ffi::lua_topointer(self.as_ptr(), index) }
    }

    /// Allocates a raw userdata block with no user values and pushes it.
    pub fn new_userdata(&self, size: usize) -> *mut c_void {
        unsafe { ffi::lua_newuserdatauv(self.as_ptr(), size, 0) }
    }

    /// Pushes a userdata that owns one strong count of `value` and gives it
    /// back when the state collects the userdata.
    ///
    /// Native closures take this as an upvalue instead of a raw pointer, so
    /// whatever they reach lives exactly as long as they do.
    pub(crate) fn push_shared<V: 'static>(&self, value: Rc<V>) -> BridgeResult<()> {
        self.ensure(3)?;
        let block = self.new_userdata(size_of::<Option<Rc<V>>>()) as *mut Option<Rc<V>>;
        unsafe { block.write(Some(value)) };
        self.new_table(0, 1);
        self.push_closure(release_shared::<V>, 0);
        if let Err(err) = self.set_field(-2, "__gc") {
            self.pop(2);
            return Err(err);
        }
        self.set_metatable(-2);
        Ok(())
    }

    /// The value behind a [`LuaStack::push_shared`] userdata, or `None` once
    /// it has been collected.
    ///
    /// # Safety
    ///
    /// The slot at `index` must hold a userdata created by `push_shared`
    /// for the same `V`.
    pub(crate) unsafe fn shared_at<V: 'static>(&self, index: c_int) -> Option<&V> {
        let block = self.to_userdata(index) as *const Option<Rc<V>>;
        unsafe { block.as_ref() }.and_then(Option::as_deref)
    }

    /// Compiles `source` and pushes the resulting chunk.
    ///
    /// On failure pushes nothing and returns the compiler message.
    pub fn load(&self, source: &str, chunk_name: &str) -> BridgeResult<()> {
        let name = c_name(chunk_name)?;
        let status = unsafe {
            ffi::luaL_loadbufferx(
                self.as_ptr(),
                source.as_ptr() as *const c_char,
                source.len(),
                name.as_ptr(),
                std::ptr::null(),
            )
        };
        if status == ffi::LUA_OK {
            return Ok(());
        }
        let message = self
            .to_string_lossy(-1)
            .unwrap_or_else(|| "unknown load error".to_string());
        self.pop(1);
        match status {
            ffi::LUA_ERRSYNTAX => Err(BridgeError::Syntax(message)),
            other => Err(BridgeError::Call {
                code: CallErrorCode::from_status(other).unwrap_or(CallErrorCode::Other(other)),
                message,
            }),
        }
    }

    /// Raw protected call. Returns the runtime status code.
    pub fn pcall(&self, nargs: c_int, nresults: c_int, handler: c_int) -> c_int {
        unsafe { ffi::lua_pcall(self.as_ptr(), nargs, nresults, handler) }
    }
}

/// `__gc` of a [`LuaStack::push_shared`] block.
unsafe extern "C-unwind" fn release_shared<V: 'static>(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let block = stack.to_userdata(1) as *mut Option<Rc<V>>;
    if let Some(slot) = unsafe { block.as_mut() } {
        drop(slot.take());
    }
    0
}

/// Allocation accounting for one state, handed to Lua as the allocator's
/// user data.
#[derive(Debug)]
struct MemoryBudget {
    used: Cell<usize>,
    limit: Cell<usize>,
    /// Number of protected calls in progress. The limit only applies while
    /// this is non-zero, because an allocation failure outside a protected
    /// call aborts the process.
    enforced: Cell<u32>,
}

/// Block alignment; matches what the C allocator guarantees.
const ALLOC_ALIGN: usize = 16;

unsafe extern "C" fn budget_alloc(
    ud: *mut c_void,
    ptr: *mut c_void,
    osize: usize,
    nsize: usize,
) -> *mut c_void {
    let budget = unsafe { &*(ud as *const MemoryBudget) };
    // For a fresh block `osize` encodes the object kind, not a size.
    let old = if ptr.is_null() { 0 } else { osize };
    if nsize == 0 {
        if !ptr.is_null() {
            unsafe { dealloc(ptr as *mut u8, Layout::from_size_align_unchecked(old, ALLOC_ALIGN)) };
            budget.used.set(budget.used.get() - old);
        }
        return std::ptr::null_mut();
    }

    let base = budget.used.get() - old;
    if nsize > old && budget.enforced.get() > 0 && base.saturating_add(nsize) > budget.limit.get() {
        return std::ptr::null_mut();
    }
    let Ok(layout) = Layout::from_size_align(nsize, ALLOC_ALIGN) else {
        return std::ptr::null_mut();
    };
    let block = if ptr.is_null() {
        unsafe { alloc(layout) }
    } else {
        unsafe {
            realloc(
                ptr as *mut u8,
                Layout::from_size_align_unchecked(old, ALLOC_ALIGN),
                nsize,
            )
        }
    };
    if !block.is_null() {
        budget.used.set(base + nsize);
    }
    block as *mut c_void
}

unsafe extern "C-unwind" fn on_panic(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let message = stack
        .to_string_lossy(-1)
        .unwrap_or_else(|| "error object is not a string".to_string());
    error!(target: "lua", "unprotected error in call to Lua API ({message})");
    0
}

impl LuaStack {
    fn budget(&self) -> Option<&MemoryBudget> {
        let mut ud: *mut c_void = std::ptr::null_mut();
        let allocf = unsafe { ffi::lua_getallocf(self.as_ptr(), &mut ud) };
        if !std::ptr::fn_addr_eq(allocf, budget_alloc as ffi::lua_Alloc) {
            return None;
        }
        unsafe { (ud as *const MemoryBudget).as_ref() }
    }

    /// Applies the state's memory limit until the returned scope is dropped.
    pub(crate) fn limit_memory(&self) -> MemoryScope<'_> {
        let budget = self.budget();
        if let Some(budget) = budget {
            budget.enforced.set(budget.enforced.get() + 1);
        }
        MemoryScope { budget }
    }
}

/// See [`LuaStack::limit_memory`].
pub(crate) struct MemoryScope<'a> {
    budget: Option<&'a MemoryBudget>,
}

impl Drop for MemoryScope<'_> {
    fn drop(&mut self) {
        if let Some(budget) = self.budget {
            budget.enforced.set(budget.enforced.get() - 1);
        }
    }
}

/// Owning wrapper around a fresh Lua state with the standard libraries open.
///
/// The state allocates through a budget: [`LuaState::set_memory_limit`] caps
/// what scripts may allocate inside protected calls, which then fail with a
/// memory error instead of growing without bound.
pub struct LuaState {
    stack: LuaStack,
    // Freed after the state is closed in `drop`.
    budget: Box<MemoryBudget>,
}

impl LuaState {
    /// Creates a new state with no memory limit.
    ///
    /// # Errors
    ///
    /// Returns a memory error if the allocator could not create the state.
    pub fn new() -> BridgeResult<Self> {
        let budget = Box::new(MemoryBudget {
            used: Cell::new(0),
            limit: Cell::new(usize::MAX),
            enforced: Cell::new(0),
        });
        let ud = &*budget as *const MemoryBudget as *mut c_void;
        let raw = unsafe { ffi::lua_newstate(budget_alloc, ud) };
        if raw.is_null() {
            return Err(BridgeError::Call {
                code: CallErrorCode::MemoryError,
                message: "failed to allocate a Lua state".to_string(),
            });
        }
        unsafe {
            ffi::lua_atpanic(raw, on_panic);
            ffi::luaL_openlibs(raw);
        }
        Ok(Self {
            stack: unsafe { LuaStack::from_raw(raw) },
            budget,
        })
    }

    pub fn stack(&self) -> &LuaStack {
        &self.stack
    }

    /// Caps the bytes the state may hold while a protected call runs.
    /// `None` removes the cap.
    pub fn set_memory_limit(&self, limit: Option<usize>) {
        self.budget.limit.set(limit.unwrap_or(usize::MAX));
    }

    /// Bytes currently allocated by the state.
    pub fn memory_used(&self) -> usize {
        self.budget.used.get()
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        unsafe { ffi::lua_close(self.stack.as_ptr()) }
    }
}

/// Scoped check of the stack-balance invariant.
///
/// Records the depth on creation and, when dropped, verifies the depth moved
/// by exactly the declared delta. A mismatch fails a debug assertion and is
/// logged in every build.
pub struct StackGuard<'a> {
    stack: &'a LuaStack,
    entry: c_int,
    delta: c_int,
}

impl<'a> StackGuard<'a> {
    /// Guard for an operation that must leave the depth unchanged.
    pub fn new(stack: &'a LuaStack) -> Self {
        Self::with_delta(stack, 0)
    }

    /// Guard for an operation that leaves `delta` extra slots behind.
    pub fn with_delta(stack: &'a LuaStack, delta: c_int) -> Self {
        Self {
            stack,
            entry: stack.top(),
            delta,
        }
    }

    /// Depth recorded on entry.
    pub fn entry(&self) -> c_int {
        self.entry
    }

    /// Changes the expected delta, for operations whose result count is only
    /// known once they run.
    pub fn set_delta(&mut self, delta: c_int) {
        self.delta = delta;
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let expected = self.entry + self.delta;
        let found = self.stack.top();
        if found != expected {
            error!(
                target: "storytime",
                "Lua stack imbalance: expected depth {expected}, found {found}"
            );
            if !std::thread::panicking() {
                debug_assert_eq!(found, expected, "Lua stack imbalance");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop_track_depth() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        assert_eq!(stack.top(), 0);
        stack.push_integer(1);
        stack.push_str("two");
        assert_eq!(stack.top(), 2);
        assert_eq!(stack.type_of(-1), LuaType::String);
        assert_eq!(stack.type_of(1), LuaType::Number);
        stack.pop(2);
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_to_bytes_does_not_convert_numbers() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        stack.push_integer(7);
        assert!(stack.to_bytes(-1).is_none());
        assert_eq!(stack.type_of(-1), LuaType::Number);
        assert_eq!(stack.to_string_lossy(-1).as_deref(), Some("7"));
        stack.pop(1);
    }

    #[test]
    fn test_guard_accepts_declared_delta() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        {
            let _guard = StackGuard::with_delta(stack, 1);
            stack.push_boolean(true);
        }
        assert_eq!(stack.top(), 1);
        stack.pop(1);
    }

    #[test]
    #[should_panic(expected = "Lua stack imbalance")]
    #[cfg(debug_assertions)]
    fn test_guard_flags_forgotten_pop() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        let _guard = StackGuard::new(stack);
        stack.push_nil();
    }

    #[test]
    fn test_load_reports_syntax_errors() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        let err = stack.load("function (", "=broken").unwrap_err();
        assert!(matches!(err, BridgeError::Syntax(_)));
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_invalid_global_name_is_rejected() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        let err = stack.push_global("bad\0name").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidName(_)));
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_globals_bypass_strict_metatable() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        stack
            .load(
                "setmetatable(_G, { __index = function(_, k) error('undefined global ' .. k, 2) end, \
                 __newindex = function(_, k) error('assignment to undeclared ' .. k, 2) end })",
                "=strict",
            )
            .unwrap();
        assert_eq!(stack.pcall(0, 0, 0), ffi::LUA_OK);

        assert_eq!(stack.push_global("missing").unwrap(), LuaType::Nil);
        stack.pop(1);
        stack.push_integer(5);
        stack.set_global("declared").unwrap();
        assert_eq!(stack.push_global("declared").unwrap(), LuaType::Number);
        assert_eq!(stack.to_integer(-1), Some(5));
        stack.pop(1);
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_shared_value_lives_with_the_state() {
        let value = Rc::new(String::from("anchored"));
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        stack.push_shared(value.clone()).unwrap();
        assert_eq!(Rc::strong_count(&value), 2);
        assert_eq!(
            unsafe { stack.shared_at::<String>(-1) }.map(String::as_str),
            Some("anchored")
        );
        stack.set_global("anchor").unwrap();

        drop(state);
        assert_eq!(Rc::strong_count(&value), 1);
    }

    #[test]
    fn test_memory_limit_only_binds_inside_scope() {
        let state = LuaState::new().unwrap();
        let stack = state.stack();
        let baseline = state.memory_used();
        assert!(baseline > 0);

        state.set_memory_limit(Some(baseline));
        // Outside a protected call the host can still allocate.
        stack.push_str(&"x".repeat(4096));
        assert!(state.memory_used() > baseline);
        stack.pop(1);

        stack.load("local s = string.rep('x', 1 << 20)", "=grow").unwrap();
        let status = {
            let _scope = stack.limit_memory();
            stack.pcall(0, 0, 0)
        };
        assert_eq!(status, ffi::LUA_ERRMEM);
        stack.pop(1);

        state.set_memory_limit(None);
        stack.load("local s = string.rep('x', 1 << 20)", "=grow").unwrap();
        let _scope = stack.limit_memory();
        assert_eq!(stack.pcall(0, 0, 0), ffi::LUA_OK);
    }
}
