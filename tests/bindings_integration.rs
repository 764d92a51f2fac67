use std::rc::Rc;
use std::sync::{Mutex, Once};

use log::{Level, LevelFilter, Log, Metadata, Record};
use storytime::resources::input::{KeySource, KeyboardState};
use storytime::resources::lua_runtime::LuaRuntime;

struct Capture;

static LINES: Mutex<Vec<(Level, String, String)>> = Mutex::new(Vec::new());
static LOGGER: Capture = Capture;
static INIT: Once = Once::new();

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LINES.lock().unwrap().push((
            record.level(),
            record.target().to_string(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

fn init_logger() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Lines logged under the `lua` target that contain `marker`.
fn lua_lines(marker: &str) -> Vec<(Level, String)> {
    LINES
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, target, message)| target == "lua" && message.contains(marker))
        .map(|(level, _, message)| (*level, message.clone()))
        .collect()
}

#[test]
fn log_joins_arguments_and_tags_the_caller() {
    init_logger();
    let rt = LuaRuntime::new().unwrap();
    rt.exec(
        "local hp = 3\nlog.info('marker-join', hp, nil, true)",
        "@scripts/status.lua",
    )
    .unwrap();
    assert_eq!(
        lua_lines("marker-join"),
        [(Level::Info, "[status.lua:2] marker-join 3 nil true".to_string())]
    );
}

#[test]
fn log_levels_map_to_facade_levels() {
    init_logger();
    let rt = LuaRuntime::new().unwrap();
    rt.exec(
        "log.trace('marker-lvl') log.debug('marker-lvl') log.warn('marker-lvl') \
         log.error('marker-lvl') log.critical('marker-lvl')",
        "@scripts/levels.lua",
    )
    .unwrap();
    let levels: Vec<_> = lua_lines("marker-lvl").into_iter().map(|(l, _)| l).collect();
    assert_eq!(
        levels,
        [Level::Trace, Level::Debug, Level::Warn, Level::Error, Level::Error]
    );
    let critical = lua_lines("CRITICAL: marker-lvl");
    assert_eq!(critical, [(Level::Error, "[levels.lua:1] CRITICAL: marker-lvl".to_string())]);
}

#[test]
fn failed_call_logs_code_and_stack() {
    init_logger();
    let rt = LuaRuntime::new().unwrap();
    rt.exec(
        "function explode()\n  error('marker-boom')\nend",
        "@scripts/boom.lua",
    )
    .unwrap();
    assert!(rt.call_function("explode", ()).is_err());

    let lines = lua_lines("marker-boom");
    assert!(lines.iter().any(|(level, message)| *level == Level::Error
        && message.starts_with("protected call failed with LUA_ERRRUN")));
    let dump = LINES.lock().unwrap().iter().any(|(_, target, message)| {
        target == "lua" && message.contains("explode (global) at scripts/boom.lua:2")
            || target == "lua" && message.contains("- (-) at scripts/boom.lua:2")
    });
    assert!(dump, "stack dump should name the failing frame");
}

#[derive(Default)]
struct Gauge {
    n: i32,
}

fn gauge_runtime(type_name: &str) -> LuaRuntime {
    let mut rt = LuaRuntime::new().unwrap();
    let gauge = rt.register_type::<Gauge>(type_name).unwrap();
    gauge.with_field("n", |p| &mut p.n);
    rt
}

#[test]
#[cfg(debug_assertions)]
fn unknown_field_fails_with_call_site() {
    init_logger();
    let rt = gauge_runtime("MarkerMeter");
    assert!(
        rt.exec("local p = MarkerMeter.new()\np.nope = 1", "@scripts/gauge.lua")
            .is_err()
    );
    assert!(lua_lines("unknown field 'nope' on MarkerMeter").iter().any(
        |(level, message)| *level == Level::Error
            && message
                == "protected call failed with LUA_ERRRUN: \
                    scripts/gauge.lua:2: unknown field 'nope' on MarkerMeter"
    ));
}

#[test]
#[cfg(not(debug_assertions))]
fn unknown_field_is_logged_with_call_site() {
    init_logger();
    let rt = gauge_runtime("MarkerGauge");
    rt.exec("local p = MarkerGauge.new()\np.nope = 1", "@scripts/gauge.lua")
        .unwrap();
    assert_eq!(
        lua_lines("unknown field 'nope' on MarkerGauge"),
        [(Level::Error, "[gauge.lua:2] unknown field 'nope' on MarkerGauge".to_string())]
    );
}

#[test]
fn keyboard_reads_host_state() {
    let keys = Rc::new(KeyboardState::new());
    let mut rt = LuaRuntime::new().unwrap();
    rt.install_keyboard(keys.clone()).unwrap();

    rt.exec("function held() return Keyboard.is_pressed('LEFT') end", "=test")
        .unwrap();
    assert!(!rt.call_function_returning::<_, bool>("held", ()).unwrap());
    keys.press(263);
    assert!(keys.is_pressed(263));
    assert!(rt.call_function_returning::<_, bool>("held", ()).unwrap());
}

#[test]
fn reinstalling_keyboard_swaps_the_source() {
    let mut rt = LuaRuntime::new().unwrap();
    rt.install_keyboard(Rc::new(KeyboardState::new())).unwrap();
    rt.exec("local is_pressed = Keyboard.is_pressed\nfunction held() return is_pressed(Keyboard.keys.UP) end", "=test")
        .unwrap();

    let fresh = Rc::new(KeyboardState::new());
    fresh.press(265);
    rt.install_keyboard(fresh).unwrap();
    assert!(rt.call_function_returning::<_, bool>("held", ()).unwrap());
}
