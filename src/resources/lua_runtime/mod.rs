//! Lua scripting runtime for Storytime.
//!
//! This module is the two-way binding layer between the engine and its
//! embedded Lua 5.4 scripts, built directly on the C API.
//!
//! # Architecture
//!
//! The module is split into focused submodules:
//!
//! - [`stack`] - evaluation stack handle, owned state and the balance guard
//! - [`codec`] - [`Encode`]/[`Decode`] between native values and stack slots
//! - [`callable`] - [`CallableRef`], protected calls into script functions
//! - [`usertype`] - native structs exposed as script objects
//! - [`diagnostics`] - call-stack snapshots for error reports
//! - [`bindings`] - the `log` and `Keyboard` globals
//! - [`runtime`] - [`LuaRuntime`], the host-facing facade
//!
//! Every bridge operation leaves the stack at the depth it found it, except
//! where its documentation says it pushes a result. [`StackGuard`] checks
//! this on every exit path.
//!
//! # Example
//!
//! ```lua
//! -- From a Lua script
//! local pos = Vec2.new()
//! pos.x = 12.5
//! log.info("player at", pos.x, pos.y)
//! if Keyboard.is_pressed("SPACE") then jump() end
//! ```

pub mod bindings;
mod callable;
mod codec;
mod diagnostics;
mod error;
mod persistent;
mod runtime;
mod stack;
mod usertype;
mod value;

pub use callable::CallableRef;
pub use codec::{Decode, Encode, PushArgs};
pub use diagnostics::{CallStack, CallStackEntry, DEFAULT_MAX_DEPTH, PrintConfig, TraceConfig};
pub use error::{BridgeError, BridgeResult, CallErrorCode};
pub use persistent::PersistentRef;
pub use runtime::LuaRuntime;
pub use stack::{LuaStack, LuaState, LuaType, StackGuard, upvalue_index};
pub use usertype::{
    FieldAccessor, MemberField, USERDATA_ALIGN, Usertype, UsertypeMeta, UsertypeRegistry,
};
pub use value::{StackValue, describe};
