//! Script session integration tests
//!
//! Drives sessions through the public bridge API: binding, events, error
//! reporting, cancellation, interpreter reuse and the preloaded helpers.

use arc_macro::capabilities::actions::{ActionInfo, LimitBreakStatus};
use arc_macro::capabilities::*;
use arc_macro::core::config::BridgeConfig;
use arc_macro::runtime::*;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Test module with a failing host function and a counting property
struct ProbeModule {
    ticks: Arc<AtomicI64>,
}

impl CapabilityModule for ProbeModule {
    fn name(&self) -> &'static str {
        "Probe"
    }

    fn functions(&self) -> Vec<FunctionBinding> {
        vec![
            FunctionBinding::new("Fail", Arity::exact(0), |_, ()| {
                Err::<(), _>(mlua::Error::external("device offline"))
            }),
            FunctionBinding::new("Echo", Arity::exact(1), |_, value: String| Ok(value)),
        ]
    }

    fn properties(&self) -> Vec<PropertyBinding> {
        let ticks = Arc::clone(&self.ticks);
        vec![PropertyBinding::new("Ticks", move |_| {
            Ok(ticks.fetch_add(1, Ordering::SeqCst))
        })]
    }
}

struct IdleHost;

impl ActionHost for IdleHost {
    fn use_action(&self, _action_type: ActionType, _action_id: u32) -> bool {
        true
    }

    fn teleport(&self, _destination_id: u32) -> bool {
        true
    }

    fn cancel_cast(&self) {}

    fn limit_break(&self) -> LimitBreakStatus {
        LimitBreakStatus::default()
    }

    fn action_info(&self, _action_id: u32) -> Option<ActionInfo> {
        None
    }
}

fn registry() -> Arc<ModuleRegistry> {
    let mut modules = ModuleRegistry::new();
    modules
        .register(&ProbeModule {
            ticks: Arc::new(AtomicI64::new(0)),
        })
        .unwrap();
    modules
        .register(&ActionsModule::new(Arc::new(IdleHost)))
        .unwrap();
    Arc::new(modules)
}

fn bridge_with(store: InMemoryMacroStore, config: &BridgeConfig) -> ScriptRuntimeBridge {
    ScriptRuntimeBridge::new(registry(), Arc::new(store), config)
}

fn bridge() -> ScriptRuntimeBridge {
    bridge_with(InMemoryMacroStore::new(), &BridgeConfig::default())
}

fn global<T: mlua::FromLua>(session: &ScriptSession, name: &str) -> T {
    session.interpreter().globals().get(name).unwrap()
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_event_table_fully_replaced() {
    let mut session = bridge().prepare_session("events").unwrap();

    session
        .deliver_event(TriggerEvent::new(
            TriggerEventType::OnConditionChange,
            100,
            serde_json::json!({ "a": 1, "b": "two" }),
        ))
        .unwrap();
    let (a, b): (i64, String) = session
        .interpreter()
        .load("return TriggerData.a, TriggerData.b")
        .eval()
        .unwrap();
    assert_eq!((a, b), (1, "two".to_string()));

    session
        .deliver_event(TriggerEvent::new(
            TriggerEventType::OnChatMessage,
            200,
            serde_json::json!("x"),
        ))
        .unwrap();
    let (a, data, kind, timestamp): (Option<i64>, String, String, i64) = session
        .interpreter()
        .load("return TriggerData.a, TriggerData.data, TriggerData.eventType, TriggerData.timestamp")
        .eval()
        .unwrap();
    assert_eq!(a, None);
    assert_eq!(data, "x");
    assert_eq!(kind, "OnChatMessage");
    assert_eq!(timestamp, 200);
}

#[test]
fn test_reserved_payload_keys_ignored() {
    let mut session = bridge().prepare_session("events").unwrap();
    session
        .deliver_event(TriggerEvent::new(
            TriggerEventType::OnAddonEvent,
            5,
            serde_json::json!({ "eventType": "spoofed", "timestamp": 0, "addon": "Shop" }),
        ))
        .unwrap();

    let (kind, timestamp, addon): (String, i64, String) = session
        .interpreter()
        .load("return TriggerData.eventType, TriggerData.timestamp, TriggerData.addon")
        .eval()
        .unwrap();
    assert_eq!(kind, "OnAddonEvent");
    assert_eq!(timestamp, 5);
    assert_eq!(addon, "Shop");
}

#[test]
fn test_sessions_do_not_share_events() {
    let bridge = bridge();
    let mut first = bridge.prepare_session("first").unwrap();
    let second = bridge.prepare_session("second").unwrap();

    first
        .deliver_event(TriggerEvent::now(
            TriggerEventType::OnTargetChange,
            serde_json::json!({ "target": "Dummy" }),
        ))
        .unwrap();

    let target: Option<String> = second
        .interpreter()
        .load("return TriggerData.target")
        .eval()
        .unwrap();
    assert_eq!(target, None);
    assert!(second.trigger().is_none());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_host_error_located_in_user_frame() {
    let mut session = bridge().prepare_session("probe").unwrap();

    let outcome = session.start("local x = 1\nProbe.Fail()").unwrap();

    let StepOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.starts_with("Error at probe:2"), "{}", message);
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.last_error(), Some(message.as_str()));
}

#[test]
fn test_runtime_error_message_kept() {
    let mut session = bridge().prepare_session("oops").unwrap();
    let outcome = session.start("local t = nil\nreturn t.field").unwrap();

    let StepOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("oops:2"), "{}", message);
}

#[test]
fn test_broken_location_lookup_gives_generic_message() {
    let mut session = bridge().prepare_session("probe").unwrap();
    let outcome = session.start("string.format = nil\nProbe.Fail()").unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Failed(GENERIC_ERROR_MESSAGE.to_string())
    );
}

#[test]
fn test_arity_checked() {
    let mut session = bridge().prepare_session("arity").unwrap();
    let outcome = session.start("Probe.Echo()").unwrap();
    let StepOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("Probe.Echo expects 1 argument(s), got 0"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_cancel_exactly_once() {
    let mut session = bridge().prepare_session("loop").unwrap();
    let outcome = session.start("while true do arc.wait(1) end").unwrap();
    assert_eq!(outcome, StepOutcome::Suspended { wait_seconds: 1.0 });

    assert!(session.cancel());
    assert!(!session.cancel());
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(session.is_torn_down());
    assert!(session.resume().is_err());
}

#[test]
fn test_recycled_interpreter_is_clean() {
    let store = InMemoryMacroStore::new();
    store.insert("util", "return { answer = 42 }");
    let bridge = bridge_with(store, &BridgeConfig::default());

    let mut session = bridge.prepare_session("first").unwrap();
    session.start("local util = require('util')\narc.wait(1)").unwrap();
    let lua = session.into_interpreter();

    let globals = lua.globals();
    for name in [
        "Probe",
        "Actions",
        "ActionType",
        "arc",
        "f",
        "TriggerData",
        "__arc_get_macro_text",
    ] {
        let value: mlua::Value = globals.get(name).unwrap();
        assert!(value.is_nil(), "{} survived teardown", name);
    }
    let (searchers, loaded, stock): (i64, bool, bool) = lua
        .load(
            "return #package.searchers, package.loaded.util ~= nil, \
             type(print) == 'function' and type(debug) == 'table'",
        )
        .eval()
        .unwrap();
    assert_eq!(searchers, 4);
    assert!(!loaded);
    assert!(stock, "standard globals not restored");

    let mut session = bridge.recycle_session("second", lua);
    session.bind().unwrap();
    let outcome = session
        .start("result = Probe.Echo('again') .. require('util').answer")
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(global::<String>(&session, "result"), "again42");
}

#[test]
fn test_user_state_does_not_survive_recycling() {
    let bridge = bridge();
    let mut session = bridge.prepare_session("first").unwrap();
    let outcome = session
        .start(
            "secret = 'leak'\n\
             string.evil = function() return true end\n\
             table.concat = nil\n\
             setmetatable(_G, { __index = function() return 'fallback' end })\n\
             arc.wait(1)",
        )
        .unwrap();
    assert!(matches!(outcome, StepOutcome::Suspended { .. }));

    let mut session = bridge.recycle_session("second", session.into_interpreter());
    session.bind().unwrap();
    let outcome = session
        .start(
            "seen = tostring(secret) .. ':' .. tostring(string.evil ~= nil)\n\
             joined = table.concat({ 'a', 'b' }, ',')",
        )
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(global::<String>(&session, "seen"), "nil:false");
    assert_eq!(global::<String>(&session, "joined"), "a,b");
}

#[test]
fn test_scripts_cannot_reach_debug_or_native_loaders() {
    let mut session = bridge().prepare_session("sandboxed").unwrap();
    let outcome = session
        .start(
            "hidden = debug == nil and package.loaded.debug == nil \
               and package.loadlib == nil and package.cpath == ''\n\
             required = pcall(require, 'debug')\n\
             binary = load(string.dump(function() return 1 end))",
        )
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert!(global::<bool>(&session, "hidden"));
    assert!(!global::<bool>(&session, "required"));
    assert!(global::<mlua::Value>(&session, "binary").is_nil());
}

#[test]
fn test_recycled_session_rebinds_once() {
    let bridge = bridge();
    let session = bridge.prepare_session("one").unwrap();
    let lua = session.into_interpreter();
    let mut session = bridge.recycle_session("two", lua);
    session.bind().unwrap();
    assert!(session.bind().is_err());

    let mount: i64 = session
        .interpreter()
        .load("return ActionType.Mount")
        .eval()
        .unwrap();
    assert_eq!(mount, 13);
}

// ============================================================================
// Helpers
// ============================================================================

#[test]
fn test_require_stored_macro() {
    let store = InMemoryMacroStore::new();
    store.insert(
        "math_helpers",
        "--[[metadata\nauthor: test\n--[[end-metadata]]\nreturn { double = function(x) return x * 2 end }",
    );
    let mut session = bridge_with(store, &BridgeConfig::default())
        .prepare_session("main")
        .unwrap();

    let outcome = session
        .start("local helpers = require('math_helpers')\nresult = helpers.double(21)")
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(global::<i64>(&session, "result"), 42);
}

#[test]
fn test_macro_text_accessor() {
    let store = InMemoryMacroStore::new();
    store.insert("stored", "return 1");
    let session = bridge_with(store, &BridgeConfig::default())
        .prepare_session("main")
        .unwrap();

    let (found, missing): (String, bool) = session
        .interpreter()
        .load("return __arc_get_macro_text('stored'), __arc_get_macro_text('nope') == nil")
        .eval()
        .unwrap();
    assert_eq!(found, "return 1");
    assert!(missing);
}

#[test]
fn test_require_from_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("helper.lua"), "return { value = 'from disk' }").unwrap();

    let config = BridgeConfig {
        require_paths: vec![dir.path().join("missing"), dir.path().to_path_buf()],
        ..BridgeConfig::default()
    };
    let bridge = bridge_with(InMemoryMacroStore::new(), &config);
    assert_eq!(bridge.require_paths().len(), 1);

    let mut session = bridge.prepare_session("main").unwrap();
    let outcome = session
        .start("result = require('helper').value\ncount = #arc.require.paths")
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(global::<String>(&session, "result"), "from disk");
    assert_eq!(global::<i64>(&session, "count"), 1);
}

#[test]
fn test_require_unknown_module_fails() {
    let mut session = bridge().prepare_session("main").unwrap();
    let outcome = session.start("require('nowhere')").unwrap();
    let StepOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("nowhere"), "{}", message);
}

#[test]
fn test_fstring_uses_locals_and_globals() {
    let mut session = bridge().prepare_session("fmt").unwrap();
    let outcome = session
        .start(
            "planet = 'Earth'\n\
             local name = 'Ada'\n\
             local n = 3\n\
             greeting = f('{name} has {n * 2} items on {planet}, {missing}')",
        )
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(
        global::<String>(&session, "greeting"),
        "Ada has 6 items on Earth, nil"
    );
}

#[test]
fn test_properties_recomputed() {
    let mut session = bridge().prepare_session("ticks").unwrap();
    let outcome = session
        .start("first = Probe.Ticks\nsecond = Probe.Ticks")
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(
        global::<i64>(&session, "second"),
        global::<i64>(&session, "first") + 1
    );
}

#[test]
fn test_module_members_read_only() {
    for script in [
        "ActionType.Item = 3",
        "ActionType.Sideways = 4",
        "Probe.Echo = nil",
        "Probe.Echo = function() return 99 end",
        "Probe.Ticks = 5",
        "Probe.Injected = 5",
        "rawset(Probe, 'Echo', print)",
        "setmetatable(Probe, nil)",
    ] {
        let mut session = bridge().prepare_session("writer").unwrap();
        let outcome = session.start(script).unwrap();
        assert!(
            matches!(outcome, StepOutcome::Failed(_)),
            "{} was allowed: {:?}",
            script,
            outcome
        );
    }

    let mut session = bridge().prepare_session("reader").unwrap();
    let outcome = session
        .start("pcall(function() Probe.Echo = nil end)\nresult = Probe.Echo('still here')")
        .unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(global::<String>(&session, "result"), "still here");
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_print_goes_to_log() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut session = bridge().prepare_session("talker").unwrap();
        let outcome = session.start("print('hello', 42, nil)").unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
    });

    let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("hello\t42\tnil"), "{}", output);
    assert!(output.contains("arc_macro::script"), "{}", output);
}
