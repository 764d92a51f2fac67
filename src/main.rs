//! Storytime script host entry point.
//!
//! Boots the Lua runtime with the engine bindings (`log`, `Keyboard`) and
//! engine types (`Vec2`, `Color`, `NameTag`), runs the main script, and can
//! optionally call one script function by dotted path afterwards.
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- assets/scripts/main.lua --call Game.start
//! cargo run --release -- --create-lua-stubs
//! ```

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use storytime::components::register_engine_types;
use storytime::luarc_generator;
use storytime::resources::input::KeyboardState;
use storytime::resources::lua_runtime::LuaRuntime;
use storytime::resources::scriptconfig::ScriptConfig;
use storytime::stub_generator;

/// Storytime script host
#[derive(Parser)]
#[command(version, about = "Runs Storytime Lua scripts against the engine bindings.")]
struct Cli {
    /// Script to run. Defaults to `[scripts] main` from the config file.
    script: Option<PathBuf>,

    /// INI configuration file (default: ./storytime.ini, if present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Call this function after the script has run, e.g. `Game.start`.
    #[arg(long, value_name = "PATH")]
    call: Option<String>,

    /// Generate Lua LSP stubs from the registered bindings and exit.
    /// Optionally provide a path (default: assets/scripts/engine.lua).
    #[arg(long, value_name = "PATH")]
    create_lua_stubs: Option<Option<PathBuf>>,

    /// Generate .luarc.json for Lua Language Server and exit.
    /// Optionally provide a path (default: assets/scripts/.luarc.json).
    #[arg(long, value_name = "PATH")]
    create_luarc: Option<Option<PathBuf>>,
}

fn load_config(path: Option<PathBuf>) -> Result<ScriptConfig, String> {
    match path {
        Some(path) => {
            let mut config = ScriptConfig::with_path(path);
            config.load_from_file()?;
            Ok(config)
        }
        None => {
            let mut config = ScriptConfig::new();
            if config.config_path.exists() {
                config.load_from_file()?;
            } else {
                info!("No config file at {:?}, using defaults", config.config_path);
            }
            Ok(config)
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config)?;

    let mut runtime = LuaRuntime::with_config(&config)
        .map_err(|e| format!("Failed to create Lua runtime: {e}"))?;
    register_engine_types(&mut runtime).map_err(|e| format!("Failed to register types: {e}"))?;
    let keyboard = Rc::new(KeyboardState::new());
    runtime
        .install_keyboard(keyboard)
        .map_err(|e| format!("Failed to install keyboard binding: {e}"))?;

    // Early-exit: generate Lua stubs and quit
    if let Some(maybe_path) = cli.create_lua_stubs {
        let path = maybe_path.unwrap_or_else(|| PathBuf::from("assets/scripts/engine.lua"));
        let content = stub_generator::generate_stubs(&runtime)
            .map_err(|e| format!("Error generating stubs: {e}"))?;
        stub_generator::write_stubs(&path, &content)?;
        println!("Lua stubs written to {}", path.display());
        return Ok(());
    }

    // Early-exit: generate .luarc.json and quit
    if let Some(maybe_path) = cli.create_luarc {
        let path = maybe_path.unwrap_or_else(|| PathBuf::from("assets/scripts/.luarc.json"));
        let content = luarc_generator::generate_luarc(&runtime, "engine.lua")
            .map_err(|e| format!("Error generating .luarc.json: {e}"))?;
        luarc_generator::write_luarc(&path, &content)?;
        println!(".luarc.json written to {}", path.display());
        return Ok(());
    }

    let script = cli.script.unwrap_or(config.main_script);
    runtime.run_script(&script).map_err(|e| e.to_string())?;

    if let Some(path) = cli.call {
        let function = runtime.function_path(&path).map_err(|e| e.to_string())?;
        let result = function.invoke(runtime.stack(), ());
        function.release(runtime.stack());
        result.map_err(|e| e.to_string())?;
    }

    if runtime.stack().top() != 0 {
        warn!("Lua stack not empty at exit: {} slots", runtime.stack().top());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
