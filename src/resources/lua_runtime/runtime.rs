//! Lua runtime facade.
//!
//! This module contains the `LuaRuntime` struct which owns the interpreter,
//! the registered native types and the script bindings, and is the entry
//! point the host uses to run scripts and call into them.

use std::path::Path;
use std::rc::Rc;

use log::{error, info};

use super::bindings::keyboard::{self, KeyboardBinding};
use super::bindings::log as log_binding;
use super::callable::{CallableRef, call_protected, push_message_handler};
use super::codec::{Decode, Encode, PushArgs};
use super::diagnostics::TraceConfig;
use super::error::{BridgeError, BridgeResult};
use super::stack::{LuaStack, LuaState, LuaType, StackGuard};
use super::usertype::{Usertype, UsertypeRegistry};
use crate::resources::input::KeySource;
use crate::resources::scriptconfig::ScriptConfig;

/// Owns one Lua state and everything native that scripts can reach.
pub struct LuaRuntime {
    state: LuaState,
    usertypes: UsertypeRegistry,
    keyboard: Option<Rc<KeyboardBinding>>,
    trace: TraceConfig,
}

impl LuaRuntime {
    /// Creates a new Lua runtime with default settings and the `log` global.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be allocated or a binding fails
    /// to install.
    pub fn new() -> BridgeResult<Self> {
        Self::with_config(&ScriptConfig::new())
    }

    /// Creates a runtime using the diagnostics and search-path settings of
    /// `config`.
    pub fn with_config(config: &ScriptConfig) -> BridgeResult<Self> {
        let runtime = Self {
            state: LuaState::new()?,
            usertypes: UsertypeRegistry::new(),
            keyboard: None,
            trace: config.trace(),
        };
        log_binding::install(runtime.stack())?;
        if !config.package_path.is_empty() {
            runtime.prepend_package_path(&config.package_path)?;
        }
        Ok(runtime)
    }

    /// Puts `path` in front of `package.path` so `require` finds game
    /// scripts first.
    pub fn prepend_package_path(&self, path: &str) -> BridgeResult<()> {
        let stack = self.stack();
        let _guard = StackGuard::new(stack);
        stack.ensure(3)?;
        let found = stack.push_global("package")?;
        if found != LuaType::Table {
            stack.pop(1);
            return Err(BridgeError::NotATable {
                name: "package".to_string(),
                found: found.name(),
            });
        }
        stack.raw_get_field(-1, "path");
        let current = stack.to_string_lossy(-1).unwrap_or_default();
        stack.pop(1);
        stack.push_str(&format!("{path};{current}"));
        stack.set_field(-2, "path")?;
        stack.pop(1);
        Ok(())
    }

    /// Compiles and runs `source` under protected-call error handling.
    ///
    /// # Errors
    ///
    /// `Syntax` if the chunk does not compile, `Call` if it raises.
    pub fn exec(&self, source: &str, chunk_name: &str) -> BridgeResult<()> {
        let stack = self.stack();
        let _guard = StackGuard::new(stack);
        stack.ensure(3)?;
        push_message_handler(stack, self.trace);
        if let Err(err) = stack.load(source, chunk_name) {
            stack.pop(1);
            error!(target: "lua", "Failed to load chunk {chunk_name}: {err}");
            return Err(err);
        }
        call_protected(stack, 0, 0)
    }

    /// Loads and executes a Lua script file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the script has
    /// syntax/runtime errors.
    pub fn run_script(&self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| BridgeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!(target: "storytime", "Running script {}", path.display());
        self.exec(&source, &format!("@{}", path.display()))
    }

    /// Handle to the global function `name`.
    pub fn function(&self, name: &str) -> BridgeResult<CallableRef> {
        Ok(CallableRef::global(self.stack(), name)?.with_trace(self.trace))
    }

    /// Handle to the function at a dotted path such as `"Scene.player.update"`.
    pub fn function_path(&self, path: &str) -> BridgeResult<CallableRef> {
        Ok(CallableRef::path(self.stack(), path)?.with_trace(self.trace))
    }

    /// Calls a global Lua function by name, discarding its results.
    ///
    /// # Errors
    ///
    /// Returns an error if the function doesn't exist or execution fails.
    pub fn call_function<A: PushArgs>(&self, name: &str, args: A) -> BridgeResult<()> {
        self.function(name)?.invoke(self.stack(), args)
    }

    /// Calls a global Lua function by name and decodes its first result.
    pub fn call_function_returning<A, R>(&self, name: &str, args: A) -> BridgeResult<R>
    where
        A: PushArgs,
        R: for<'s> Decode<'s>,
    {
        self.function(name)?.invoke_returning(self.stack(), args)
    }

    /// Checks if a global function exists.
    pub fn has_function(&self, name: &str) -> bool {
        CallableRef::global(self.stack(), name).is_ok()
    }

    /// Registers `T` as a script-constructible type under `name`.
    pub fn register_type<T: Default + 'static>(&mut self, name: &str) -> BridgeResult<Usertype<T>> {
        Usertype::register_global(self.state.stack(), &mut self.usertypes, name)
    }

    /// Handle to an already registered type.
    pub fn usertype<T: 'static>(&self, name: &str) -> Option<Usertype<T>> {
        self.usertypes.get(name)
    }

    /// Installs the `Keyboard` global reading from `source`. Installing again
    /// swaps the source for every closure handed out before.
    pub fn install_keyboard(&mut self, source: Rc<dyn KeySource>) -> BridgeResult<()> {
        let binding = match &self.keyboard {
            Some(binding) => {
                binding.set_source(source);
                binding.clone()
            }
            None => Rc::new(KeyboardBinding::new(source)),
        };
        keyboard::install(self.state.stack(), binding.clone())?;
        self.keyboard = Some(binding);
        Ok(())
    }

    /// Reads the global `name` as `R`.
    pub fn global<R: for<'s> Decode<'s>>(&self, name: &str) -> BridgeResult<R> {
        let stack = self.stack();
        let _guard = StackGuard::new(stack);
        stack.ensure(1)?;
        stack.push_global(name)?;
        let value = R::decode(stack, -1);
        stack.pop(1);
        value
    }

    /// Sets the global `name` to `value`.
    pub fn set_global<V: Encode + ?Sized>(&self, name: &str, value: &V) -> BridgeResult<()> {
        let stack = self.stack();
        let _guard = StackGuard::new(stack);
        stack.ensure(1)?;
        value.encode(stack);
        stack.set_global(name)
    }

    pub fn stack(&self) -> &LuaStack {
        self.state.stack()
    }

    /// Caps the memory scripts may hold while a protected call runs.
    /// Allocations past the cap fail the call with a memory error.
    pub fn set_memory_limit(&self, limit: Option<usize>) {
        self.state.set_memory_limit(limit);
    }

    pub fn memory_used(&self) -> usize {
        self.state.memory_used()
    }

    pub fn usertypes(&self) -> &UsertypeRegistry {
        &self.usertypes
    }

    pub fn trace(&self) -> TraceConfig {
        self.trace
    }

    /// Changes the stack dump settings for handles created afterwards.
    pub fn set_trace(&mut self, trace: TraceConfig) {
        self.trace = trace;
    }
}
