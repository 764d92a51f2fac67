//! Long-lived engine services.
//!
//! Overview
//! - `input` – keyboard state and the engine key-name table
//! - `lua_runtime` – the Lua binding layer and runtime facade
//! - `scriptconfig` – INI-backed settings for the script runtime
pub mod input;
pub mod lua_runtime;
pub mod scriptconfig;
