//! Handles to script functions that native code can invoke.
//!
//! A [`CallableRef`] names a Lua function by global name, by dotted path
//! (`"Outer.Inner.update"`), by registry reference, or by a stack slot the
//! caller filled. Invocation always goes through `lua_pcall` with a native
//! message handler underneath the function, so a failing script reports a
//! classified error and a stack dump instead of tearing down the host.
//!
//! # Stack layout during a call
//!
//! ```text
//! [.. | handler | function | arg1 .. argN]   before lua_pcall
//! [.. | handler | results..]                 after success
//! [.. | handler | error object]              after failure
//! ```
//!
//! The handler sits at `-(2 + N)` when `lua_pcall` runs and is removed before
//! the call returns, leaving the stack at its entry depth.

use std::ffi::c_int;

use log::error;
use mlua::ffi;

use super::codec::{Decode, PushArgs};
use super::diagnostics::{CallStack, DEFAULT_MAX_DEPTH, PrintConfig, TraceConfig};
use super::error::{BridgeError, BridgeResult, CallErrorCode};
use super::persistent::PersistentRef;
use super::stack::{LuaStack, LuaType, StackGuard, upvalue_index};

/// Message handler run by `lua_pcall` while the failing frames still exist.
///
/// Upvalues: verbose flag, maximum depth.
unsafe extern "C-unwind" fn message_handler(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let verbose = stack.to_boolean(upvalue_index(1));
    let max_depth = stack
        .to_integer(upvalue_index(2))
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_MAX_DEPTH);

    let message = error_message(&stack, 1);
    let trace = CallStack::capture_from(&stack, 1, max_depth);
    error!(target: "lua", "{message}");
    trace.print(PrintConfig { verbose });

    // Hand the original error object back to lua_pcall.
    stack.set_top(1);
    1
}

fn error_message(stack: &LuaStack, index: c_int) -> String {
    stack
        .to_string_lossy(index)
        .unwrap_or_else(|| format!("(error object is a {} value)", stack.type_of(index).name()))
}

/// Pushes the message handler closure. Net effect: one slot.
pub(crate) fn push_message_handler(stack: &LuaStack, trace: TraceConfig) {
    stack.push_boolean(trace.verbose);
    stack.push_integer(trace.max_depth as i64);
    stack.push_closure(message_handler, 2);
}

/// Calls the function below `argc` arguments, with the message handler
/// directly beneath the function.
///
/// On success the handler is removed and `nresults` results are left on the
/// stack. On failure the handler and the error object are popped and the
/// classified error is logged and returned.
pub(crate) fn call_protected(stack: &LuaStack, argc: c_int, nresults: c_int) -> BridgeResult<()> {
    let handler = stack.abs_index(-(2 + argc));
    let status = {
        let _limit = stack.limit_memory();
        stack.pcall(argc, nresults, -(2 + argc))
    };
    match CallErrorCode::from_status(status) {
        None => {
            stack.remove(handler);
            Ok(())
        }
        Some(code) => {
            let message = error_message(stack, -1);
            stack.pop(2);
            error!(target: "lua", "protected call failed with {code}: {message}");
            Err(BridgeError::Call { code, message })
        }
    }
}

#[derive(Debug)]
enum Target {
    Global(String),
    Path(Vec<String>),
    Ref(PersistentRef),
    Slot(c_int),
}

/// Invocable reference to a script function.
#[derive(Debug)]
pub struct CallableRef {
    target: Target,
    trace: TraceConfig,
}

impl CallableRef {
    fn new(target: Target) -> Self {
        Self {
            target,
            trace: TraceConfig::default(),
        }
    }

    /// References the global function `name`.
    ///
    /// # Errors
    ///
    /// `NotAFunction` if the global is missing or holds anything else.
    pub fn global(stack: &LuaStack, name: &str) -> BridgeResult<Self> {
        let callable = Self::new(Target::Global(name.to_string()));
        callable.check(stack)?;
        Ok(callable)
    }

    /// References a function through a dotted path such as `"A.b.c"`.
    ///
    /// The first segment is a global; every following segment is a raw field
    /// lookup in the table before it. The path is resolved again on each
    /// invocation.
    ///
    /// # Errors
    ///
    /// `NotATable` if an intermediate segment is not a table, `NotAFunction`
    /// if the last one is not a function.
    pub fn path(stack: &LuaStack, path: &str) -> BridgeResult<Self> {
        let segments = path.split('.').map(str::to_string).collect();
        let callable = Self::new(Target::Path(segments));
        callable.check(stack)?;
        Ok(callable)
    }

    /// Wraps an existing registry reference. The callable takes ownership.
    pub fn from_ref(reference: PersistentRef) -> Self {
        Self::new(Target::Ref(reference))
    }

    /// Uses the value the caller placed at `index`. The slot is copied for
    /// each call and stays owned by the caller.
    pub fn stack_slot(stack: &LuaStack, index: c_int) -> Self {
        Self::new(Target::Slot(stack.abs_index(index)))
    }

    /// Sets how much of the call stack a failure reports.
    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }

    /// Human-readable description of the target.
    pub fn describe(&self) -> String {
        match &self.target {
            Target::Global(name) => name.clone(),
            Target::Path(segments) => segments.join("."),
            Target::Ref(reference) => format!("<ref {}>", reference.id()),
            Target::Slot(index) => format!("<slot {index}>"),
        }
    }

    /// Re-resolves the target and checks that it is currently a function.
    pub fn is_valid(&self, stack: &LuaStack) -> bool {
        self.check(stack).is_ok()
    }

    fn check(&self, stack: &LuaStack) -> BridgeResult<()> {
        let _guard = StackGuard::new(stack);
        stack.ensure(2)?;
        self.push_target(stack)?;
        stack.pop(1);
        Ok(())
    }

    /// Pushes the target function. Pushes nothing on failure.
    fn push_target(&self, stack: &LuaStack) -> BridgeResult<()> {
        let (found, name) = match &self.target {
            Target::Global(name) => (stack.push_global(name)?, name.clone()),
            Target::Path(segments) => {
                let Some((first, rest)) = segments.split_first() else {
                    return Err(BridgeError::NotAFunction {
                        name: String::new(),
                        found: LuaType::None.name(),
                    });
                };
                let mut found = stack.push_global(first)?;
                let mut resolved = first.clone();
                for segment in rest {
                    if found != LuaType::Table {
                        stack.pop(1);
                        return Err(BridgeError::NotATable {
                            name: resolved,
                            found: found.name(),
                        });
                    }
                    found = stack.raw_get_field(-1, segment);
                    stack.remove(-2);
                    resolved.push('.');
                    resolved.push_str(segment);
                }
                (found, resolved)
            }
            Target::Ref(reference) => (reference.push(stack), self.describe()),
            Target::Slot(index) => {
                stack.push_value(*index);
                (stack.type_of(-1), self.describe())
            }
        };
        if found != LuaType::Function {
            stack.pop(1);
            return Err(BridgeError::NotAFunction {
                name,
                found: found.name(),
            });
        }
        Ok(())
    }

    fn call<A: PushArgs + ?Sized>(
        &self,
        stack: &LuaStack,
        args: &A,
        nresults: c_int,
    ) -> BridgeResult<()> {
        // Handler, function and the message handler's own pushes.
        const CALL_SLOTS: c_int = 4;
        let argc = c_int::try_from(args.count())
            .ok()
            .filter(|argc| *argc <= c_int::MAX - CALL_SLOTS)
            .ok_or(BridgeError::StackOverflow(c_int::MAX))?;
        stack.ensure(argc + CALL_SLOTS)?;
        push_message_handler(stack, self.trace);
        if let Err(err) = self.push_target(stack) {
            stack.pop(1);
            error!(target: "lua", "cannot call {}: {err}", self.describe());
            return Err(err);
        }
        args.push_all(stack);
        call_protected(stack, argc, nresults)
    }

    /// Calls the function with `args`, discarding any results.
    ///
    /// A script error is logged with its code name and a stack dump and comes
    /// back as `BridgeError::Call`; it never unwinds into the host. The stack
    /// depth on return equals the depth on entry.
    pub fn invoke<A: PushArgs>(&self, stack: &LuaStack, args: A) -> BridgeResult<()> {
        let _guard = StackGuard::new(stack);
        self.call(stack, &args, 0)
    }

    /// Calls the function with `args` and decodes its first result as `R`.
    ///
    /// A missing result reads as nil, so `R` must accept nil for functions
    /// that return nothing.
    pub fn invoke_returning<A, R>(&self, stack: &LuaStack, args: A) -> BridgeResult<R>
    where
        A: PushArgs,
        R: for<'s> Decode<'s>,
    {
        let _guard = StackGuard::new(stack);
        self.call(stack, &args, 1)?;
        let result = R::decode(stack, -1);
        stack.pop(1);
        result
    }

    /// Frees the registry reference, if this callable owns one.
    pub fn release(self, stack: &LuaStack) {
        if let Target::Ref(reference) = self.target {
            reference.release(stack);
        }
    }
}
