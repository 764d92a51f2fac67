//! Native structs exposed to scripts as constructible objects.
//!
//! Registering `T` under a name creates a metatable that doubles as the
//! script-visible type table:
//!
//! ```lua
//! local p = Point.new()   -- default-initialised native storage
//! p.x = 3                 -- __newindex decodes into the native field
//! print(p.x)              -- __index encodes the native field
//! ```
//!
//! Field access goes through [`FieldAccessor`] trait objects kept in a map
//! shared between the host-side [`Usertype`] handle and the metamethod
//! closures, so fields added after instances exist are visible to them.

use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::ffi::c_int;
use std::fmt;
use std::mem::needs_drop;
use std::rc::Rc;

use log::debug;
use mlua::ffi;
use rustc_hash::FxHashMap;

use super::codec::{Decode, Encode};
use super::diagnostics::contract_violation;
use super::error::{BridgeError, BridgeResult};
use super::persistent::PersistentRef;
use super::stack::{LuaStack, LuaType, StackGuard, c_name, upvalue_index};
use super::value::describe;

/// Largest alignment the runtime guarantees for userdata blocks on the
/// platforms the engine targets.
pub const USERDATA_ALIGN: usize = 8;

/// Type-erased access to one field of `T`.
pub trait FieldAccessor<T> {
    /// Pushes the field's current value as exactly one slot.
    fn read(&self, owner: &mut T, stack: &LuaStack);

    /// Decodes the slot at `index` into the field. The field keeps its old
    /// value on failure.
    fn write(&self, owner: &mut T, stack: &LuaStack, index: c_int) -> BridgeResult<()>;

    /// LuaLS type name of the field.
    fn annotation(&self) -> &'static str;
}

/// Accessor built from a projection onto a struct member.
pub struct MemberField<T, E> {
    member: fn(&mut T) -> &mut E,
}

impl<T, E> MemberField<T, E> {
    pub fn new(member: fn(&mut T) -> &mut E) -> Self {
        Self { member }
    }
}

impl<T, E> FieldAccessor<T> for MemberField<T, E>
where
    E: Encode + for<'s> Decode<'s> + 'static,
{
    fn read(&self, owner: &mut T, stack: &LuaStack) {
        (self.member)(owner).encode(stack);
    }

    fn write(&self, owner: &mut T, stack: &LuaStack, index: c_int) -> BridgeResult<()> {
        let value = E::decode(stack, index)?;
        *(self.member)(owner) = value;
        Ok(())
    }

    fn annotation(&self) -> &'static str {
        <E as Decode<'static>>::ANNOTATION
    }
}

type FieldMap<T> = FxHashMap<String, Box<dyn FieldAccessor<T>>>;

/// Per-registration storage. The metamethod closures share ownership of it
/// through a state-owned anchor, so it outlives every instance that can reach
/// it whatever happens to the host-side handles.
struct UsertypeData<T> {
    name: String,
    /// Set once the metatable is complete.
    metatable: OnceCell<PersistentRef>,
    fields: RefCell<FieldMap<T>>,
}

/// Field listing of a registered type, used for generated annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsertypeMeta {
    pub name: String,
    /// `(field name, LuaLS annotation)`, sorted by field name.
    pub fields: Vec<(String, &'static str)>,
}

trait RegisteredType {
    fn meta(&self) -> UsertypeMeta;
}

impl<T: 'static> RegisteredType for UsertypeData<T> {
    fn meta(&self) -> UsertypeMeta {
        let mut fields: Vec<_> = self
            .fields
            .borrow()
            .iter()
            .map(|(key, accessor)| (key.clone(), accessor.annotation()))
            .collect();
        fields.sort();
        UsertypeMeta {
            name: self.name.clone(),
            fields,
        }
    }
}

struct RegistryEntry {
    meta: Rc<dyn RegisteredType>,
    any: Rc<dyn Any>,
}

/// Host-side index of the types registered with one runtime, by name.
///
/// Registering a name again replaces its entry. Dropping the registry only
/// drops lookup handles; the state keeps registered storage alive.
#[derive(Default)]
pub struct UsertypeRegistry {
    by_name: FxHashMap<String, RegistryEntry>,
}

impl UsertypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<T: 'static>(&mut self, data: &Rc<UsertypeData<T>>) {
        let entry = RegistryEntry {
            meta: data.clone(),
            any: data.clone(),
        };
        self.by_name.insert(data.name.clone(), entry);
    }

    /// Handle to the latest registration of `name`, if it was registered
    /// for `T`.
    pub fn get<T: 'static>(&self, name: &str) -> Option<Usertype<T>> {
        let entry = self.by_name.get(name)?;
        let data = entry.any.clone().downcast::<UsertypeData<T>>().ok()?;
        Some(Usertype { data })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of distinct type names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Metadata of the latest registration per name, sorted by name.
    pub fn describe(&self) -> Vec<UsertypeMeta> {
        let mut metas: Vec<_> = self.by_name.values().map(|entry| entry.meta.meta()).collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }
}

impl fmt::Debug for UsertypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("UsertypeRegistry")
            .field("types", &names)
            .finish()
    }
}

/// Host-side handle to a registered native type.
pub struct Usertype<T> {
    data: Rc<UsertypeData<T>>,
}

impl<T> Clone for Usertype<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<T> fmt::Debug for Usertype<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Usertype")
            .field("name", &self.data.name)
            .field("fields", &self.data.fields.borrow().len())
            .finish()
    }
}

impl<T: Default + 'static> Usertype<T> {
    /// Registers `T` under `name` and publishes its type table as the global
    /// `name` and as `registry[name]`.
    ///
    /// Registering a name that already exists overwrites the global and the
    /// registry slot. Instances created before keep their old metatable.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` if `T` needs more alignment than userdata blocks
    /// provide, `InvalidName` if `name` contains a NUL byte.
    pub fn register_global(
        stack: &LuaStack,
        registry: &mut UsertypeRegistry,
        name: &str,
    ) -> BridgeResult<Self> {
        if align_of::<Option<T>>() > USERDATA_ALIGN {
            return Err(BridgeError::UnsupportedType(format!(
                "{name} needs {}-byte alignment, userdata provides {USERDATA_ALIGN}",
                align_of::<Option<T>>()
            )));
        }
        c_name(name)?;

        let _guard = StackGuard::new(stack);
        stack.ensure(4)?;
        stack.new_table(0, 6);
        let metatable = stack.top();
        let data = Rc::new(UsertypeData {
            name: name.to_string(),
            metatable: OnceCell::new(),
            fields: RefCell::new(FieldMap::default()),
        });

        if let Err(err) = Self::fill_metatable(stack, metatable, &data) {
            stack.set_top(metatable - 1);
            return Err(err);
        }
        stack.push_value(metatable);
        stack.set_registry_field(name)?;
        stack.push_value(metatable);
        stack.set_global(name)?;
        // Taken last so no failure above can strand it.
        stack.push_value(metatable);
        let _ = data.metatable.set(PersistentRef::create(stack));

        registry.insert(&data);
        debug!(target: "storytime", "Registered usertype '{name}'");
        Ok(Self { data })
    }

    fn fill_metatable(
        stack: &LuaStack,
        metatable: c_int,
        data: &Rc<UsertypeData<T>>,
    ) -> BridgeResult<()> {
        stack.push_str(&data.name);
        stack.set_field(metatable, "__name")?;

        stack.push_shared(data.clone())?;
        stack.push_value(metatable);
        stack.push_closure(usertype_index::<T>, 2);
        stack.set_field(metatable, "__index")?;

        stack.push_shared(data.clone())?;
        stack.push_value(metatable);
        stack.push_closure(usertype_newindex::<T>, 2);
        stack.set_field(metatable, "__newindex")?;

        stack.push_value(metatable);
        stack.push_closure(usertype_new::<T>, 1);
        stack.set_field(metatable, "new")?;

        if needs_drop::<T>() {
            stack.push_value(metatable);
            stack.push_closure(usertype_gc::<T>, 1);
            stack.set_field(metatable, "__gc")?;
        }
        Ok(())
    }
}

impl<T: 'static> Usertype<T> {
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Adds or replaces the accessor for `key`. Existing instances see the
    /// change immediately.
    pub fn with_field<E>(&self, key: &str, member: fn(&mut T) -> &mut E) -> &Self
    where
        E: Encode + for<'s> Decode<'s> + 'static,
    {
        self.with_accessor(key, Box::new(MemberField::new(member)))
    }

    /// Adds or replaces a custom accessor for `key`.
    pub fn with_accessor(&self, key: &str, accessor: Box<dyn FieldAccessor<T>>) -> &Self {
        self.data
            .fields
            .borrow_mut()
            .insert(key.to_string(), accessor);
        self
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.data.fields.borrow().contains_key(key)
    }

    pub fn meta(&self) -> UsertypeMeta {
        self.data.meta()
    }

    /// Whether the value at `index` was created by this registration.
    pub fn is_instance(&self, stack: &LuaStack, index: c_int) -> bool {
        let _guard = StackGuard::new(stack);
        let Some(metatable) = self.data.metatable.get() else {
            return false;
        };
        if stack.ensure(1).is_err() {
            return false;
        }
        let index = stack.abs_index(index);
        metatable.push(stack);
        let found = unsafe { payload::<T>(stack, index, -1) }.is_some();
        stack.pop(1);
        found
    }

    /// Mutable access to the native value of a script-created instance.
    ///
    /// Returns `None` unless the value at `index` carries this registration's
    /// metatable.
    ///
    /// # Safety
    ///
    /// The caller must not hold another reference to the same instance while
    /// the returned one is alive, and must not let the instance be collected
    /// while using it.
    pub unsafe fn instance<'s>(&self, stack: &'s LuaStack, index: c_int) -> Option<&'s mut T> {
        let _guard = StackGuard::new(stack);
        let metatable = self.data.metatable.get()?;
        stack.ensure(1).ok()?;
        let index = stack.abs_index(index);
        metatable.push(stack);
        let value = unsafe { payload::<T>(stack, index, -1) }.and_then(Option::as_mut);
        stack.pop(1);
        value
    }

    /// Runs `f` on the native value of the instance at `index`.
    pub fn with_instance<R>(
        &self,
        stack: &LuaStack,
        index: c_int,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        unsafe { self.instance(stack, index) }.map(f)
    }
}

/// The storage block at `index` if its metatable is the table at
/// `metatable`. Leaves the stack unchanged.
///
/// # Safety
///
/// Tables passed as `metatable` must belong to a `T` registration.
unsafe fn payload<'s, T>(
    stack: &'s LuaStack,
    index: c_int,
    metatable: c_int,
) -> Option<&'s mut Option<T>> {
    if stack.type_of(index) != LuaType::Userdata {
        return None;
    }
    let metatable = stack.abs_index(metatable);
    if !stack.push_metatable(index) {
        return None;
    }
    let same = stack.raw_equal(-1, metatable);
    stack.pop(1);
    if !same {
        return None;
    }
    unsafe { (stack.to_userdata(index) as *mut Option<T>).as_mut() }
}

fn not_an_instance(stack: &LuaStack, type_name: &str) -> String {
    format!(
        "expected {type_name} instance, found {}",
        stack.type_of(1).name()
    )
}

/// `T.new()`. Upvalues: metatable.
unsafe extern "C-unwind" fn usertype_new<T: Default + 'static>(
    state: *mut ffi::lua_State,
) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let block = stack.new_userdata(size_of::<Option<T>>()) as *mut Option<T>;
    unsafe { block.write(Some(T::default())) };
    stack.push_value(upvalue_index(1));
    stack.set_metatable(-2);
    1
}

/// `instance[key]`. Upvalues: type storage, metatable.
unsafe extern "C-unwind" fn usertype_index<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    match unsafe { read_field::<T>(&stack) } {
        Ok(results) => results,
        Err(message) => unsafe { contract_violation(&stack, message) },
    }
}

/// Body of `__index`. Every borrow it takes ends before the caller can raise.
unsafe fn read_field<T: 'static>(stack: &LuaStack) -> Result<c_int, String> {
    // Already collected: the state is closing.
    let Some(data) = (unsafe { stack.shared_at::<UsertypeData<T>>(upvalue_index(1)) }) else {
        return Ok(0);
    };

    let key = stack.to_bytes(2).and_then(|b| std::str::from_utf8(b).ok());
    let fields = data.fields.borrow();
    if let Some(accessor) = key.and_then(|key| fields.get(key)) {
        let owner = unsafe { payload::<T>(stack, 1, upvalue_index(2)) }
            .and_then(Option::as_mut)
            .ok_or_else(|| not_an_instance(stack, &data.name))?;
        accessor.read(owner, stack);
        return Ok(1);
    }

    // Not a field: the metatable itself supplies `new` and the metamethods.
    stack.push_value(2);
    if stack.raw_get(upvalue_index(2)) != LuaType::Nil {
        return Ok(1);
    }
    stack.pop(1);
    Err(BridgeError::UnknownField {
        type_name: data.name.clone(),
        field: describe(stack, 2),
    }
    .to_string())
}

/// `instance[key] = value`. Upvalues: type storage, metatable.
unsafe extern "C-unwind" fn usertype_newindex<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    match unsafe { write_field::<T>(&stack) } {
        Ok(()) => 0,
        Err(message) => unsafe { contract_violation(&stack, message) },
    }
}

/// Body of `__newindex`. The field keeps its value on every error path.
unsafe fn write_field<T: 'static>(stack: &LuaStack) -> Result<(), String> {
    let Some(data) = (unsafe { stack.shared_at::<UsertypeData<T>>(upvalue_index(1)) }) else {
        return Ok(());
    };

    let key = stack.to_bytes(2).and_then(|b| std::str::from_utf8(b).ok());
    let fields = data.fields.borrow();
    let Some((key, accessor)) = key.and_then(|key| fields.get(key).map(|a| (key, a))) else {
        return Err(BridgeError::UnknownField {
            type_name: data.name.clone(),
            field: describe(stack, 2),
        }
        .to_string());
    };
    let owner = unsafe { payload::<T>(stack, 1, upvalue_index(2)) }
        .and_then(Option::as_mut)
        .ok_or_else(|| not_an_instance(stack, &data.name))?;
    accessor
        .write(owner, stack, 3)
        .map_err(|err| format!("{}.{key}: {err}", data.name))
}

/// `__gc`. Upvalues: metatable. Dropping twice is a no-op.
unsafe extern "C-unwind" fn usertype_gc<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    if let Some(slot) = unsafe { payload::<T>(&stack, 1, upvalue_index(1)) } {
        drop(slot.take());
    }
    0
}
