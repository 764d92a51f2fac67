//! Engine data types scripts can construct and edit.
//!
//! Each type registers itself with a [`LuaRuntime`] under its script name and
//! exposes its public fields through the native type bridge.
//!
//! Submodules overview:
//! - [`color`] – RGBA color with integer channels
//! - [`nametag`] – text label with visibility and draw layer
//! - [`vec2`] – 2D vector

pub mod color;
pub mod nametag;
pub mod vec2;

use log::info;

use crate::resources::lua_runtime::{BridgeResult, LuaRuntime};

/// Registers every engine type with `runtime`.
pub fn register_engine_types(runtime: &mut LuaRuntime) -> BridgeResult<()> {
    vec2::Vec2::register(runtime)?;
    color::Color::register(runtime)?;
    nametag::NameTag::register(runtime)?;
    info!(
        target: "storytime",
        "Registered {} engine types",
        runtime.usertypes().len()
    );
    Ok(())
}
