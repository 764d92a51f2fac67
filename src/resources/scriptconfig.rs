//! Script runtime configuration.
//!
//! Loaded from an INI file. Missing values keep their defaults, so an empty
//! or partial file is valid.
//!
//! # Configuration File Format
//!
//! ```ini
//! [scripts]
//! main = assets/scripts/main.lua
//! package_path = ./assets/scripts/?.lua;./assets/scripts/?/init.lua
//!
//! [diagnostics]
//! verbose = false
//! max_depth = 16
//! ```

use configparser::ini::Ini;
use log::info;
use std::path::PathBuf;

use super::lua_runtime::{DEFAULT_MAX_DEPTH, TraceConfig};

const DEFAULT_MAIN_SCRIPT: &str = "assets/scripts/main.lua";
const DEFAULT_PACKAGE_PATH: &str = "./assets/scripts/?.lua;./assets/scripts/?/init.lua";
const DEFAULT_VERBOSE: bool = false;
const DEFAULT_CONFIG_PATH: &str = "./storytime.ini";

/// Parser that keeps `;` in values, since Lua search paths are
/// `;`-separated. Only `#` starts a comment.
fn parser() -> Ini {
    let mut defaults = Ini::new().defaults();
    defaults.comment_symbols = vec!['#'];
    Ini::new_from_defaults(defaults)
}

/// Settings for the script runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptConfig {
    /// Script run at startup when none is given on the command line.
    pub main_script: PathBuf,
    /// Prepended to the runtime's `package.path`. Empty leaves it untouched.
    pub package_path: String,
    /// Adds frame details to error stack dumps.
    pub verbose: bool,
    /// Frames captured for error stack dumps.
    pub max_depth: usize,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            main_script: PathBuf::from(DEFAULT_MAIN_SCRIPT),
            package_path: DEFAULT_PACKAGE_PATH.to_string(),
            verbose: DEFAULT_VERBOSE,
            max_depth: DEFAULT_MAX_DEPTH,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a configuration that loads from and saves to `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Load configuration from the INI file.
    ///
    /// Missing values retain their current values.
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(&mut self) -> Result<(), String> {
        let mut config = parser();
        config
            .load(&self.config_path)
            .map_err(|e| format!("Failed to load config file: {}", e))?;

        // [scripts] section
        if let Some(main) = config.get("scripts", "main") {
            self.main_script = PathBuf::from(main);
        }
        if let Some(package_path) = config.get("scripts", "package_path") {
            self.package_path = package_path;
        }

        // [diagnostics] section
        if let Some(verbose) = config.getbool("diagnostics", "verbose").ok().flatten() {
            self.verbose = verbose;
        }
        if let Some(depth) = config.getuint("diagnostics", "max_depth").ok().flatten() {
            self.max_depth = depth as usize;
        }

        info!(
            "Loaded config: main={:?}, verbose={}, max_depth={}",
            self.main_script, self.verbose, self.max_depth
        );

        Ok(())
    }

    /// Save configuration to the INI file.
    ///
    /// Creates the file if it doesn't exist.
    pub fn save_to_file(&self) -> Result<(), String> {
        let mut config = parser();

        // [scripts] section
        config.set(
            "scripts",
            "main",
            Some(self.main_script.to_string_lossy().into_owned()),
        );
        config.set("scripts", "package_path", Some(self.package_path.clone()));

        // [diagnostics] section
        config.set("diagnostics", "verbose", Some(self.verbose.to_string()));
        config.set("diagnostics", "max_depth", Some(self.max_depth.to_string()));

        config
            .write(&self.config_path)
            .map_err(|e| format!("Failed to save config file: {}", e))?;

        info!("Saved config to {:?}", self.config_path);

        Ok(())
    }

    /// Stack dump settings for protected calls.
    pub fn trace(&self) -> TraceConfig {
        TraceConfig {
            verbose: self.verbose,
            max_depth: self.max_depth,
        }
    }
}
