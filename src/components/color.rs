//! RGBA color exposed to scripts.
//!
//! Channels are plain integers so scripts can do arithmetic on them freely;
//! [`Color::clamped`] brings a value back into the 0-255 range before use.

use crate::resources::lua_runtime::{BridgeResult, LuaRuntime, Usertype};

/// RGBA color, exposed to scripts as `Color` with fields `r`, `g`, `b`, `a`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: i32,
    pub g: i32,
    pub b: i32,
    pub a: i32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const LUA_NAME: &'static str = "Color";
    pub const WHITE: Color = Color::new(255, 255, 255, 255);

    pub const fn new(r: i32, g: i32, b: i32, a: i32) -> Self {
        Self { r, g, b, a }
    }

    /// Copy with every channel clamped to 0-255.
    pub fn clamped(&self) -> Self {
        Self::new(
            self.r.clamp(0, 255),
            self.g.clamp(0, 255),
            self.b.clamp(0, 255),
            self.a.clamp(0, 255),
        )
    }

    /// Multiply with another color (component-wise), after clamping both.
    pub fn multiply(&self, other: Color) -> Color {
        let (a, b) = (self.clamped(), other.clamped());
        Color::new(
            a.r * b.r / 255,
            a.g * b.g / 255,
            a.b * b.b / 255,
            a.a * b.a / 255,
        )
    }

    pub fn register(runtime: &mut LuaRuntime) -> BridgeResult<Usertype<Self>> {
        let usertype = runtime.register_type::<Self>(Self::LUA_NAME)?;
        usertype
            .with_field("r", |c| &mut c.r)
            .with_field("g", |c| &mut c.g)
            .with_field("b", |c| &mut c.b)
            .with_field("a", |c| &mut c.a);
        Ok(usertype)
    }
}
