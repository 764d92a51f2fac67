use crate::resources::lua_runtime::{BridgeResult, LuaRuntime, Usertype};

/// 2D vector, exposed to scripts as `Vec2` with fields `x` and `y`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const LUA_NAME: &'static str = "Vec2";

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn register(runtime: &mut LuaRuntime) -> BridgeResult<Usertype<Self>> {
        let usertype = runtime.register_type::<Self>(Self::LUA_NAME)?;
        usertype
            .with_field("x", |v| &mut v.x)
            .with_field("y", |v| &mut v.y);
        Ok(usertype)
    }
}
