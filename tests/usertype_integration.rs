use storytime::components::color::Color;
use storytime::components::nametag::NameTag;
use storytime::components::register_engine_types;
use storytime::components::vec2::Vec2;
use storytime::resources::lua_runtime::{BridgeError, CallErrorCode, LuaRuntime, Usertype};

fn engine_runtime() -> LuaRuntime {
    let mut rt = LuaRuntime::new().unwrap();
    register_engine_types(&mut rt).unwrap();
    rt
}

fn read_global<T: 'static, R>(rt: &LuaRuntime, usertype: &Usertype<T>, name: &str, f: impl FnOnce(&mut T) -> R) -> R {
    let stack = rt.stack();
    stack.push_global(name).unwrap();
    let value = usertype.with_instance(stack, -1, f);
    stack.pop(1);
    value.unwrap()
}

#[test]
fn script_writes_are_visible_natively() {
    let rt = engine_runtime();
    rt.exec("pos = Vec2.new(); pos.x = 12.5; pos.y = -3", "=test").unwrap();

    let vec2 = rt.usertype::<Vec2>("Vec2").unwrap();
    let native = read_global(&rt, &vec2, "pos", |v| *v);
    assert_eq!(native, Vec2::new(12.5, -3.0));
    assert_eq!(rt.stack().top(), 0);
}

#[test]
fn native_writes_are_visible_to_scripts() {
    let rt = engine_runtime();
    rt.exec("tag = NameTag.new()", "=test").unwrap();

    let nametag = rt.usertype::<NameTag>("NameTag").unwrap();
    read_global(&rt, &nametag, "tag", |t| {
        t.name = "Mira".to_string();
        t.layer = 4;
    });
    rt.exec("summary = tag.name .. '@' .. tag.layer .. ':' .. tostring(tag.visible)", "=test")
        .unwrap();
    assert_eq!(rt.global::<String>("summary").unwrap(), "Mira@4:true");
}

#[test]
fn defaults_come_from_native_default() {
    let rt = engine_runtime();
    rt.exec("c = Color.new(); sum = c.r + c.g + c.b + c.a", "=test").unwrap();
    assert_eq!(rt.global::<i32>("sum").unwrap(), 4 * 255);
}

#[test]
#[cfg(debug_assertions)]
fn contract_violations_fail_the_script() {
    let rt = engine_runtime();
    rt.exec("c = Color.new()", "@scripts/paint.lua").unwrap();
    for source in ["c.r = 'red'", "c.r = 1.5", "c.q = 3", "missing = c.q"] {
        assert!(
            matches!(
                rt.exec(source, "@scripts/paint.lua"),
                Err(BridgeError::Call { code: CallErrorCode::RuntimeError, .. })
            ),
            "{source}"
        );
    }
    let color = rt.usertype::<Color>("Color").unwrap();
    assert_eq!(read_global(&rt, &color, "c", |c| *c), Color::WHITE);
    assert_eq!(rt.stack().top(), 0);
}

#[test]
#[cfg(not(debug_assertions))]
fn contract_violations_are_skipped() {
    let rt = engine_runtime();
    rt.exec(
        "c = Color.new(); c.r = 'red'; c.r = 1.5; c.q = 3; missing = c.q",
        "@scripts/paint.lua",
    )
    .unwrap();
    let color = rt.usertype::<Color>("Color").unwrap();
    assert_eq!(read_global(&rt, &color, "c", |c| *c), Color::WHITE);
    rt.exec("is_nil = missing == nil", "=test").unwrap();
    assert!(rt.global::<bool>("is_nil").unwrap());
}

#[test]
fn duplicate_registration_applies_to_new_instances() {
    #[derive(Default)]
    struct Stats {
        hp: i32,
        mp: i32,
    }

    let mut rt = LuaRuntime::new().unwrap();
    let first = rt.register_type::<Stats>("Stats").unwrap();
    first.with_field("hp", |s| &mut s.hp);
    rt.exec("old = Stats.new(); old.hp = 10", "=test").unwrap();

    let second = rt.register_type::<Stats>("Stats").unwrap();
    second.with_field("mp", |s| &mut s.mp);
    rt.exec("new = Stats.new(); new.mp = 5", "=test").unwrap();
    assert!(!second.has_field("hp"));

    rt.stack().push_global("old").unwrap();
    assert!(first.is_instance(rt.stack(), -1));
    assert!(!second.is_instance(rt.stack(), -1));
    rt.stack().pop(1);

    assert_eq!(read_global(&rt, &first, "old", |s| s.hp), 10);
    assert_eq!(read_global(&rt, &second, "new", |s| (s.hp, s.mp)), (0, 5));
    rt.exec("same = getmetatable(new) == Stats and getmetatable(old) ~= Stats", "=test")
        .unwrap();
    assert!(rt.global::<bool>("same").unwrap());
    assert_eq!(rt.usertypes().len(), 1);
}

#[test]
fn fields_added_later_reach_existing_instances() {
    let rt = engine_runtime();
    rt.exec("early = Vec2.new(); early.x = 1", "=test").unwrap();
    let vec2 = rt.usertype::<Vec2>("Vec2").unwrap();
    vec2.with_field("len_hint", |v| &mut v.y);
    rt.exec("early.len_hint = 8", "=test").unwrap();
    assert_eq!(read_global(&rt, &vec2, "early", |v| v.y), 8.0);
}

#[test]
fn usertype_lookup_checks_native_type() {
    let rt = engine_runtime();
    assert!(rt.usertype::<Vec2>("Vec2").is_some());
    assert!(rt.usertype::<Color>("Vec2").is_none());
    assert!(rt.usertype::<Vec2>("Quaternion").is_none());
}

#[test]
fn instances_outlive_the_host_handles() {
    let rt = engine_runtime();
    {
        let vec2 = rt.usertype::<Vec2>("Vec2").unwrap();
        drop(vec2);
    }
    rt.exec("local v = Vec2.new(); v.x = 3; v.y = 4; len2 = v.x * v.x + v.y * v.y", "=test")
        .unwrap();
    assert_eq!(rt.global::<f64>("len2").unwrap(), 25.0);
}
