use crate::resources::lua_runtime::{BridgeResult, LuaRuntime, Usertype};

/// Label drawn over an entity, exposed to scripts as `NameTag`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameTag {
    pub name: String,
    pub visible: bool,
    /// Draw order; higher layers go on top.
    pub layer: i32,
}

impl Default for NameTag {
    fn default() -> Self {
        Self {
            name: String::new(),
            visible: true,
            layer: 0,
        }
    }
}

impl NameTag {
    pub const LUA_NAME: &'static str = "NameTag";

    pub fn register(runtime: &mut LuaRuntime) -> BridgeResult<Usertype<Self>> {
        let usertype = runtime.register_type::<Self>(Self::LUA_NAME)?;
        usertype
            .with_field("name", |t| &mut t.name)
            .with_field("visible", |t| &mut t.visible)
            .with_field("layer", |t| &mut t.layer);
        Ok(usertype)
    }
}
