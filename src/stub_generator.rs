//! Lua stub generator for EmmyLua / lua-language-server.
//!
//! Reads the runtime's type registry and emits a deterministic `engine.lua`
//! stub file with `---@class`, `---@field`, `---@param`, and `---@return`
//! annotations for the registered types and the `log` and `Keyboard`
//! globals.

use crate::resources::input::KEY_NAMES;
use crate::resources::lua_runtime::bindings::log::ScriptLevel;
use crate::resources::lua_runtime::{LuaRuntime, UsertypeMeta};
use std::fmt::{self, Write as FmtWrite};
use std::path::Path;

/// Generate the stub file content from the runtime's registered bindings.
///
/// Fails if the `log` binding is missing, which means the runtime was not
/// set up through [`LuaRuntime::new`] or [`LuaRuntime::with_config`].
pub fn generate_stubs(runtime: &LuaRuntime) -> Result<String, String> {
    runtime
        .function_path("log.info")
        .map_err(|e| format!("Failed to find log binding: {e}"))?;

    let types = runtime.usertypes().describe();
    render_stubs(&types).map_err(|e| format!("Failed to render stubs: {e}"))
}

/// Write the generated stubs to a file.
pub fn write_stubs(path: &Path, content: &str) -> Result<(), String> {
    std::fs::write(path, content).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

// --------------- Rendering ---------------

fn render_stubs(types: &[UsertypeMeta]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "---@meta")?;
    writeln!(
        out,
        "-- Storytime engine API. Generated by `storytime --create-lua-stubs`, do not edit."
    )?;
    writeln!(out)?;

    render_log(&mut out)?;
    render_keyboard(&mut out)?;
    render_types(&mut out, types)?;
    Ok(out)
}

fn section(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out, "-- ==================== {title} ====================")?;
    writeln!(out)
}

fn render_log(out: &mut String) -> fmt::Result {
    section(out, "Logging")?;
    writeln!(out, "---Script logging. Arguments are joined with spaces and")?;
    writeln!(out, "---prefixed with the calling file and line.")?;
    writeln!(out, "---@class log")?;
    writeln!(out, "log = {{}}")?;
    writeln!(out)?;
    for level in ScriptLevel::ALL {
        writeln!(out, "---@param ... any")?;
        writeln!(out, "function log.{}(...) end", level.name())?;
        writeln!(out)?;
    }
    Ok(())
}

fn render_keyboard(out: &mut String) -> fmt::Result {
    section(out, "Keyboard")?;
    writeln!(out, "---@alias KeyName")?;
    for (name, _) in KEY_NAMES {
        writeln!(out, "---| \"{name}\"")?;
    }
    writeln!(out)?;
    writeln!(out, "---@class Keyboard")?;
    writeln!(out, "---@field keys table<KeyName, integer>")?;
    writeln!(out, "Keyboard = {{}}")?;
    writeln!(out)?;
    writeln!(out, "---Whether a key is held, by name or GLFW key code.")?;
    writeln!(out, "---@param key KeyName|integer")?;
    writeln!(out, "---@return boolean")?;
    writeln!(out, "function Keyboard.is_pressed(key) end")?;
    writeln!(out)
}

fn render_types(out: &mut String, types: &[UsertypeMeta]) -> fmt::Result {
    if types.is_empty() {
        return Ok(());
    }
    section(out, "Types")?;
    for meta in types {
        writeln!(out, "---@class {}", meta.name)?;
        for (field, annotation) in &meta.fields {
            writeln!(out, "---@field {field} {annotation}")?;
        }
        writeln!(out, "{} = {{}}", meta.name)?;
        writeln!(out)?;
        writeln!(out, "---@return {}", meta.name)?;
        writeln!(out, "function {}.new() end", meta.name)?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_types_lists_fields() {
        let types = vec![UsertypeMeta {
            name: "Point".to_string(),
            fields: vec![("x".to_string(), "integer"), ("y".to_string(), "number")],
        }];
        let out = render_stubs(&types).unwrap();
        assert!(out.contains("---@class Point\n---@field x integer\n---@field y number\nPoint = {}"));
        assert!(out.contains("---@return Point\nfunction Point.new() end"));
    }

    #[test]
    fn test_no_types_section_without_types() {
        let out = render_stubs(&[]).unwrap();
        assert!(!out.contains("Types"));
        assert!(out.contains("function log.critical(...) end"));
    }
}
