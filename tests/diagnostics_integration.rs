use std::cell::RefCell;
use std::ffi::c_int;

use mlua::ffi;
use storytime::resources::lua_runtime::{CallStack, LuaRuntime, LuaStack, PrintConfig};

thread_local! {
    static CAPTURED: RefCell<Option<CallStack>> = const { RefCell::new(None) };
}

/// Records the three frames above itself.
unsafe extern "C-unwind" fn snapshot(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let trace = CallStack::capture_from(&stack, 1, 3);
    CAPTURED.with(|c| *c.borrow_mut() = Some(trace));
    0
}

const NESTED: &str = "\
function c()
  snapshot()
end
function b()
  c()
end
function a()
  b()
end
";

fn runtime_with_snapshot() -> LuaRuntime {
    let rt = LuaRuntime::new().unwrap();
    rt.stack().push_closure(snapshot, 0);
    rt.stack().set_global("snapshot").unwrap();
    rt.exec(NESTED, "@scripts/nested.lua").unwrap();
    rt
}

fn take_capture() -> CallStack {
    CAPTURED.with(|c| c.borrow_mut().take()).unwrap()
}

#[test]
fn capture_from_nested_calls_is_innermost_first() {
    let rt = runtime_with_snapshot();
    rt.call_function("a", ()).unwrap();
    let trace = take_capture();

    assert_eq!(trace.len(), 3);
    let names: Vec<_> = trace.iter().map(|e| e.name.as_deref()).collect();
    // `a` was entered from the host, so nothing names it.
    assert_eq!(names, [Some("c"), Some("b"), None]);
    let lines: Vec<_> = trace.iter().map(|e| e.current_line).collect();
    assert_eq!(lines, [Some(2), Some(5), Some(8)]);
    let tags: Vec<_> = trace.iter().map(|e| e.tag()).collect();
    assert_eq!(tags, ["nested.lua:2", "nested.lua:5", "nested.lua:8"]);
    assert_eq!(trace.top_tag(), "nested.lua:2");
}

#[test]
fn capture_records_frame_details() {
    let rt = runtime_with_snapshot();
    rt.call_function("b", ()).unwrap();
    let trace = take_capture();

    // Entered at b, so only two frames exist above the snapshot.
    assert_eq!(trace.len(), 2);
    let c = &trace.entries()[0];
    assert_eq!(c.name_kind.as_deref(), Some("global"));
    assert_eq!(c.what, "Lua");
    assert_eq!(c.short_source, "scripts/nested.lua");
    assert_eq!(c.line_range, Some((1, 3)));
    assert_eq!(c.parameter_count, 0);
    assert!(!c.is_variadic);
    assert!(!c.is_tail_call);
}

#[test]
fn render_and_json_describe_every_frame() {
    let rt = runtime_with_snapshot();
    rt.call_function("a", ()).unwrap();
    let trace = take_capture();

    let rendered = trace.render(PrintConfig::default());
    assert_eq!(
        rendered,
        "#0 c (global) at scripts/nested.lua:2\n\
         #1 b (global) at scripts/nested.lua:5\n\
         #2 - (-) at scripts/nested.lua:8"
    );
    let verbose = trace.render(PrintConfig { verbose: true });
    assert!(verbose.lines().all(|line| line.contains("[Lua] params=0")));

    let json = trace.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    assert_eq!(parsed[1]["name"], "b");
    assert!(parsed[2]["name"].is_null());
}

#[test]
fn capture_outside_any_call_is_empty() {
    let rt = LuaRuntime::new().unwrap();
    let trace = CallStack::capture(rt.stack(), 8);
    assert!(trace.is_empty());
    assert_eq!(trace.top_tag(), "");
    assert_eq!(trace.render(PrintConfig::default()), "");
}
