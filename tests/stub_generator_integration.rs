use storytime::components::register_engine_types;
use storytime::resources::input::KEY_NAMES;
use storytime::resources::lua_runtime::LuaRuntime;
use storytime::stub_generator;

fn engine_runtime() -> LuaRuntime {
    let mut rt = LuaRuntime::new().unwrap();
    register_engine_types(&mut rt).unwrap();
    rt
}

#[test]
fn generate_stubs_produces_valid_output() {
    let rt = engine_runtime();
    let content = stub_generator::generate_stubs(&rt).unwrap();

    // Must start with @meta annotation
    assert!(content.starts_with("---@meta"), "Should start with ---@meta");

    // Must declare the binding globals
    assert!(content.contains("log = {}"), "Should declare log table");
    assert!(content.contains("Keyboard = {}"), "Should declare Keyboard table");
}

#[test]
fn generated_stubs_contain_representative_signatures() {
    let rt = engine_runtime();
    let content = stub_generator::generate_stubs(&rt).unwrap();

    // Logging
    for level in ["trace", "debug", "info", "warn", "error", "critical"] {
        let pattern = format!("function log.{level}(...) end");
        assert!(content.contains(&pattern), "Missing log.{level}");
    }

    // Keyboard
    assert!(content.contains("---@param key KeyName|integer\n---@return boolean\nfunction Keyboard.is_pressed(key) end"));
    assert!(content.contains("---@field keys table<KeyName, integer>"));

    // Engine types
    assert!(content.contains("---@class Vec2\n---@field x number\n---@field y number\nVec2 = {}"));
    assert!(content.contains(
        "---@class Color\n---@field a integer\n---@field b integer\n---@field g integer\n---@field r integer"
    ));
    assert!(content.contains(
        "---@class NameTag\n---@field layer integer\n---@field name string\n---@field visible boolean"
    ));
    assert!(content.contains("---@return NameTag\nfunction NameTag.new() end"));
}

#[test]
fn generated_key_alias_matches_key_table() {
    let rt = engine_runtime();
    let content = stub_generator::generate_stubs(&rt).unwrap();

    for (name, _) in KEY_NAMES {
        let pattern = format!("---| \"{name}\"\n");
        assert!(content.contains(&pattern), "Key '{name}' not found in KeyName alias");
    }
}

#[test]
fn generated_stubs_follow_registered_types() {
    #[derive(Default)]
    struct Door {
        open: bool,
    }

    let mut rt = engine_runtime();
    let door = rt.register_type::<Door>("Door").unwrap();
    door.with_field("open", |d| &mut d.open);

    let content = stub_generator::generate_stubs(&rt).unwrap();
    assert!(content.contains("---@class Door\n---@field open boolean\nDoor = {}"));
    // Types are emitted in name order
    let color = content.find("---@class Color").unwrap();
    let door = content.find("---@class Door").unwrap();
    let vec2 = content.find("---@class Vec2").unwrap();
    assert!(color < door && door < vec2);
}

#[test]
fn generate_stubs_is_deterministic() {
    let first = stub_generator::generate_stubs(&engine_runtime()).unwrap();
    let second = stub_generator::generate_stubs(&engine_runtime()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn write_stubs_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.lua");

    let rt = engine_runtime();
    let content = stub_generator::generate_stubs(&rt).unwrap();
    stub_generator::write_stubs(&path, &content).unwrap();

    assert!(path.exists(), "Stub file should be created");
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, content, "Written content should match generated content");
}
