//! The `log` script global.
//!
//! ```lua
//! log.info("spawned", count, "enemies")   -- [waves.lua:12] spawned 3 enemies
//! log.critical("save slot corrupt")       -- [save.lua:40] CRITICAL: save slot corrupt
//! ```
//!
//! Every function takes any number of arguments, renders them without
//! metamethods, joins them with spaces and forwards the line to the `log`
//! facade under the `lua` target.

use std::ffi::c_int;

use log::{Level, log, log_enabled};
use mlua::ffi;

use crate::resources::lua_runtime::diagnostics::CallStack;
use crate::resources::lua_runtime::error::BridgeResult;
use crate::resources::lua_runtime::stack::{LuaStack, StackGuard, upvalue_index};
use crate::resources::lua_runtime::value::describe;

/// Severity names exposed as `log.<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl ScriptLevel {
    pub const ALL: [ScriptLevel; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Critical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Facade level the message is emitted at. `critical` has no level of
    /// its own and is marked in the message instead.
    pub fn level(self) -> Level {
        match self {
            Self::Trace => Level::Trace,
            Self::Debug => Level::Debug,
            Self::Info => Level::Info,
            Self::Warn => Level::Warn,
            Self::Error | Self::Critical => Level::Error,
        }
    }

    fn from_upvalue(raw: Option<i64>) -> Self {
        raw.and_then(|n| usize::try_from(n).ok())
            .and_then(|n| Self::ALL.get(n).copied())
            .unwrap_or(Self::Info)
    }

    fn index(self) -> i64 {
        Self::ALL.iter().position(|&l| l == self).unwrap_or(0) as i64
    }
}

/// Joins the slots `1..=top` with spaces.
pub(crate) fn join_arguments(stack: &LuaStack) -> String {
    (1..=stack.top())
        .map(|index| describe(stack, index))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats a script log line.
pub fn format_line(level: ScriptLevel, tag: &str, message: &str) -> String {
    match level {
        ScriptLevel::Critical => format!("[{tag}] CRITICAL: {message}"),
        _ => format!("[{tag}] {message}"),
    }
}

/// `log.<level>(...)`. Upvalues: level index.
unsafe extern "C-unwind" fn log_message(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let level = ScriptLevel::from_upvalue(stack.to_integer(upvalue_index(1)));
    if !log_enabled!(target: "lua", level.level()) {
        return 0;
    }
    let tag = CallStack::capture_from(&stack, 1, 1).top_tag();
    let message = join_arguments(&stack);
    log!(target: "lua", level.level(), "{}", format_line(level, &tag, &message));
    0
}

/// Installs the global `log` table.
pub fn install(stack: &LuaStack) -> BridgeResult<()> {
    let _guard = StackGuard::new(stack);
    stack.ensure(3)?;
    stack.new_table(0, ScriptLevel::ALL.len() as c_int);
    for level in ScriptLevel::ALL {
        stack.push_integer(level.index());
        stack.push_closure(log_message, 1);
        if let Err(err) = stack.set_field(-2, level.name()) {
            stack.pop(1);
            return Err(err);
        }
    }
    stack.set_global("log")
}
