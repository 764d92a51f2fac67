//! Generator for `.luarc.json`, the Lua Language Server configuration.
//!
//! Produces a `.luarc.json` file that configures the Lua Language Server for
//! editor autocompletion based on the runtime's registered globals. The
//! generated config points to the generated stubs file.

use crate::resources::lua_runtime::LuaRuntime;
use std::path::Path;

/// Globals every runtime installs.
const BINDING_GLOBALS: &[&str] = &["log", "Keyboard"];

/// Generate `.luarc.json` content from the runtime's registered globals.
pub fn generate_luarc(runtime: &LuaRuntime, stubs_filename: &str) -> Result<String, String> {
    let mut globals: Vec<String> = BINDING_GLOBALS.iter().map(|g| g.to_string()).collect();
    globals.extend(runtime.usertypes().describe().into_iter().map(|meta| meta.name));

    let content = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/LuaLS/vscode-lua/master/setting/schema.json",
        "runtime.version": "Lua 5.4",
        "diagnostics.globals": globals,
        "workspace.library": [stubs_filename],
        "completion.autoRequire": false
    });

    serde_json::to_string_pretty(&content)
        .map_err(|e| format!("Failed to serialize .luarc.json: {e}"))
}

/// Write the generated `.luarc.json` content to a file.
pub fn write_luarc(path: &Path, content: &str) -> Result<(), String> {
    std::fs::write(path, content)
        .map_err(|e| format!("Failed to write {}: {e}", path.display()))
}
