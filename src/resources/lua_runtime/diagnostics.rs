//! Call-stack snapshots for script diagnostics.
//!
//! [`CallStack::capture`] walks the runtime's activation records from the
//! innermost frame outwards and copies what `lua_getinfo` reports into plain
//! [`CallStackEntry`] records. The snapshot is detached from the runtime: it
//! can be rendered, logged or serialized after the frames are gone.
//!
//! # Example output
//!
//! ```text
//! #0 c (global) at scripts/test.lua:3
//! #1 b (global) at scripts/test.lua:6
//! #2 - (-) at scripts/test.lua:12
//! ```

use std::ffi::{CStr, c_char, c_int};
use std::fmt;

use log::error;
use mlua::ffi;
use serde::Serialize;

use super::stack::LuaStack;

/// Rendering options for [`CallStack::render`] and [`CallStack::print`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintConfig {
    /// Adds parameter, upvalue, line-range, vararg and tail-call details.
    pub verbose: bool,
}

/// Default number of frames captured for error reports.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// How much of the call stack the protected-call message handler reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceConfig {
    pub verbose: bool,
    pub max_depth: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl TraceConfig {
    pub fn print_config(&self) -> PrintConfig {
        PrintConfig {
            verbose: self.verbose,
        }
    }
}

/// One activation record, copied out of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStackEntry {
    /// Name the caller used for the function, when the runtime can tell.
    pub name: Option<String>,
    /// How `name` was found: `global`, `local`, `method`, `field`, `upvalue`.
    pub name_kind: Option<String>,
    /// Raw chunk source descriptor (`@path/to/file.lua`, `=[C]`, or code).
    pub source: String,
    /// Printable form of `source`, as produced by the runtime.
    pub short_source: String,
    /// `Lua`, `C` or `main`.
    pub what: String,
    pub current_line: Option<i32>,
    /// First and last line of the function definition.
    pub line_range: Option<(i32, i32)>,
    pub upvalue_count: u8,
    pub parameter_count: u8,
    pub is_variadic: bool,
    pub is_tail_call: bool,
}

fn opt_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    (!s.is_empty()).then_some(s)
}

impl CallStackEntry {
    fn from_debug(ar: &ffi::lua_Debug) -> Self {
        let short_source = unsafe { CStr::from_ptr(ar.short_src.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        Self {
            name: opt_string(ar.name),
            name_kind: opt_string(ar.namewhat),
            source: opt_string(ar.source).unwrap_or_default(),
            short_source,
            what: opt_string(ar.what).unwrap_or_default(),
            current_line: (ar.currentline >= 0).then_some(ar.currentline),
            line_range: (ar.linedefined >= 0).then_some((ar.linedefined, ar.lastlinedefined)),
            upvalue_count: ar.nups,
            parameter_count: ar.nparams,
            is_variadic: ar.isvararg != 0,
            is_tail_call: ar.istailcall != 0,
        }
    }

    /// Compact `"file:line"` label for log prefixes.
    ///
    /// The directory prefix is stripped. The filename is left out when the
    /// source descriptor has no path separator, and the colon is left out when
    /// the line is unknown.
    pub fn tag(&self) -> String {
        let file = self
            .source
            .rfind(['/', '\\'])
            .map(|pos| &self.source[pos + 1..])
            .unwrap_or("");
        match self.current_line {
            Some(line) => format!("{file}:{line}"),
            None => file.to_string(),
        }
    }

    fn render_line(&self, depth: usize, config: PrintConfig) -> String {
        let name = self.name.as_deref().unwrap_or("-");
        let kind = self.name_kind.as_deref().unwrap_or("-");
        let line = self
            .current_line
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        let mut out = format!("#{depth} {name} ({kind}) at {}:{line}", self.short_source);
        if config.verbose {
            let range = self
                .line_range
                .map_or_else(|| "-".to_string(), |(first, last)| format!("{first}-{last}"));
            out.push_str(&format!(
                " [{}] params={} upvalues={} lines={range} vararg={} tailcall={}",
                if self.what.is_empty() { "-" } else { &self.what },
                self.parameter_count,
                self.upvalue_count,
                self.is_variadic,
                self.is_tail_call,
            ));
        }
        out
    }
}

/// Ordered snapshot of the runtime's call stack, innermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallStack {
    entries: Vec<CallStackEntry>,
}

impl CallStack {
    /// Captures up to `max_depth` frames starting at level 0, the running
    /// function.
    pub fn capture(stack: &LuaStack, max_depth: usize) -> Self {
        Self::capture_from(stack, 0, max_depth)
    }

    /// Captures up to `max_depth` frames starting at `level`.
    ///
    /// Native callbacks pass 1 to skip their own frame.
    pub fn capture_from(stack: &LuaStack, level: c_int, max_depth: usize) -> Self {
        let mut entries = Vec::new();
        let mut level = level;
        while entries.len() < max_depth {
            // SAFETY: lua_Debug is a plain C record; all-zero is a valid
            // initial state for lua_getstack to fill.
            let mut ar: ffi::lua_Debug = unsafe { std::mem::zeroed() };
            if unsafe { ffi::lua_getstack(stack.as_ptr(), level, &mut ar) } == 0 {
                break;
            }
            if unsafe { ffi::lua_getinfo(stack.as_ptr(), c"nSltu".as_ptr(), &mut ar) } == 0 {
                break;
            }
            entries.push(CallStackEntry::from_debug(&ar));
            level += 1;
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[CallStackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CallStackEntry> {
        self.entries.iter()
    }

    /// Tag of the innermost frame, or an empty string when there is none.
    pub fn top_tag(&self) -> String {
        self.entries.first().map(CallStackEntry::tag).unwrap_or_default()
    }

    /// One line per frame. Never fails; missing fields render as `-`.
    pub fn render(&self, config: PrintConfig) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(depth, entry)| entry.render_line(depth, config))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Writes the rendering to the diagnostic log stream.
    pub fn print(&self, config: PrintConfig) {
        for line in self.render(config).lines() {
            error!(target: "lua", "  {line}");
        }
    }

    /// JSON dump of the snapshot.
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(&self.entries)
            .map_err(|e| format!("Failed to serialize call stack: {e}"))
    }
}

impl<'a> IntoIterator for &'a CallStack {
    type Item = &'a CallStackEntry;
    type IntoIter = std::slice::Iter<'a, CallStackEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Logs `message` prefixed with the calling script's `file:line` tag.
pub(crate) fn report_to_caller(stack: &LuaStack, message: impl fmt::Display) {
    let tag = CallStack::capture_from(stack, 1, 1).top_tag();
    error!(target: "lua", "[{tag}] {message}");
}

/// Ends a native callback whose script caller broke the binding contract.
///
/// Debug builds raise a Lua error positioned at the caller, which the
/// enclosing protected call reports as a `RuntimeError`. Release builds log
/// the message with the caller's tag and let the script carry on.
///
/// # Safety
///
/// Must be the tail of a native callback. In debug builds it does not
/// return, so no frame between here and the runtime may still own a value
/// that needs dropping.
pub(crate) unsafe fn contract_violation(stack: &LuaStack, message: String) -> c_int {
    #[cfg(debug_assertions)]
    {
        unsafe { ffi::luaL_where(stack.as_ptr(), 1) };
        stack.push_str(&message);
        drop(message);
        unsafe {
            ffi::lua_concat(stack.as_ptr(), 2);
            ffi::lua_error(stack.as_ptr())
        }
    }
    #[cfg(not(debug_assertions))]
    {
        report_to_caller(stack, message);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, line: Option<i32>) -> CallStackEntry {
        CallStackEntry {
            name: None,
            name_kind: None,
            source: source.to_string(),
            short_source: source.trim_start_matches(['@', '=']).to_string(),
            what: "Lua".to_string(),
            current_line: line,
            line_range: None,
            upvalue_count: 0,
            parameter_count: 0,
            is_variadic: false,
            is_tail_call: false,
        }
    }

    #[test]
    fn test_tag_strips_directories() {
        assert_eq!(entry("@assets/scripts/player.lua", Some(12)).tag(), "player.lua:12");
        assert_eq!(entry("@C:\\game\\main.lua", Some(3)).tag(), "main.lua:3");
    }

    #[test]
    fn test_tag_without_line_omits_colon() {
        assert_eq!(entry("@assets/scripts/player.lua", None).tag(), "player.lua");
    }

    #[test]
    fn test_tag_without_separator_omits_filename() {
        assert_eq!(entry("=[C]", None).tag(), "");
        assert_eq!(entry("@main.lua", Some(4)).tag(), ":4");
    }

    #[test]
    fn test_render_uses_placeholders() {
        let stack = CallStack {
            entries: vec![entry("=[C]", None)],
        };
        assert_eq!(stack.render(PrintConfig::default()), "#0 - (-) at [C]:-");
        let verbose = stack.render(PrintConfig { verbose: true });
        assert!(verbose.contains("lines=-"));
        assert!(verbose.contains("tailcall=false"));
    }

    #[test]
    fn test_to_json_lists_entries() {
        let stack = CallStack {
            entries: vec![entry("@a/b.lua", Some(1))],
        };
        let json = stack.to_json().unwrap();
        assert!(json.contains("\"current_line\": 1"));
    }
}
