use crate::host::{screen, ActorId, HostSnapshot};
use crate::options::OptionValue;
use crate::scripting::{Phase, ScriptError, ScriptHost};

fn snap(screen_id: i32, level_time: i64, session_time: i64, actor: u64) -> HostSnapshot {
    HostSnapshot {
        screen: screen_id,
        level_time,
        session_time,
        actor: Some(ActorId(actor)),
    }
}

fn host_with(code: &str) -> ScriptHost {
    ScriptHost::new(code, "test.lua").expect("create host")
}

fn texts(host: &ScriptHost) -> Vec<String> {
    host.messages().into_iter().map(|m| m.text).collect()
}

#[test]
fn timeout_fires_exactly_once_at_its_deadline() {
    let mut host = host_with("register_timeout(function() message('fired') end, 5)");
    // Registration happens on the first tick's reload, at level_time 100.
    for t in 100..=104 {
        host.tick(snap(screen::LEVEL, t, t, 1)).expect("tick");
    }
    assert!(texts(&host).is_empty());

    host.tick(snap(screen::LEVEL, 105, 105, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["fired"]);
    assert_eq!(host.callback_count(), 0, "timeout removed after firing");

    host.tick(snap(screen::LEVEL, 106, 106, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["fired"], "no second fire");
}

#[test]
fn interval_fires_once_per_satisfying_tick() {
    let mut host = host_with("register_interval(function() message('beat') end, 5)");
    for t in 100..=110 {
        host.tick(snap(screen::LEVEL, t, t, 1)).expect("tick");
    }
    // Eligible on the registration tick (last_fired starts at -1), then
    // every 5 frames of the level clock.
    assert_eq!(texts(&host), vec!["beat", "beat", "beat"]);
    assert_eq!(host.callback_count(), 1);
}

#[test]
fn cancel_is_applied_at_the_safe_point_and_is_idempotent() {
    let mut host = host_with(
        r#"
local id = register_interval(function() message('beat') end, 2)
on_frame = function()
  if state.level_time == 103 then
    cancel(id)
    cancel(id)
    cancel(9999)
  end
end
"#,
    );
    for t in 100..=106 {
        host.tick(snap(screen::LEVEL, t, t, 1)).expect("tick");
    }
    // Fires at 100 and 102; the cancel buffered by on_frame at 103 lands in
    // the same tick's cancellation pass, so 104 and 106 stay silent. The
    // duplicate and unknown ids are no-ops.
    assert_eq!(texts(&host), vec!["beat", "beat"]);
    assert_eq!(host.callback_count(), 0);
}

#[test]
fn screen_transition_clears_level_callbacks_and_orders_slots() {
    let mut host = host_with(
        r#"
on_screen = function() message('screen') end
on_death = function() message('death') end
register_interval(function() message('beat') end, 1)
"#,
    );
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");
    host.tick(snap(screen::LEVEL, 101, 101, 1)).expect("tick");
    host.tick(snap(screen::DEATH, 102, 102, 1)).expect("tick");
    host.tick(snap(screen::DEATH, 103, 103, 1)).expect("tick");

    // The interval dies with the screen change before it could fire there,
    // and on_screen precedes on_death within the transition tick. The tick
    // after the transition fires neither slot again.
    assert_eq!(texts(&host), vec!["beat", "beat", "screen", "death"]);
    assert_eq!(host.callback_count(), 0);
}

#[test]
fn reload_rebuilds_callbacks_options_and_slots_but_keeps_messages() {
    let mut host = host_with(
        r#"
message('hello')
register_interval(function() message('old') end, 1)
register_option_int('speed', 'Run speed', 4, 1, 10)
on_frame = function() message('old frame') end
"#,
    );
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");
    assert_eq!(host.callback_count(), 1);
    assert_eq!(host.options().len(), 1);

    host.set_source("register_option_bool('ghost', 'Ghost mode', true)");
    assert_eq!(host.phase(), Phase::Dirty);
    host.tick(snap(screen::LEVEL, 101, 101, 1)).expect("tick");

    // No 'old' and no 'old frame' this tick: the interval and the slot died
    // with the reload. The log itself survives.
    assert_eq!(texts(&host), vec!["hello", "old"]);
    assert_eq!(host.callback_count(), 0);
    let options = host.options();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].name, "ghost");
    assert_eq!(options[0].value, OptionValue::Bool { value: true });
    assert_eq!(host.phase(), Phase::Clean);
}

#[test]
fn message_log_keeps_the_newest_twenty() {
    let mut host = host_with("for i = 1, 25 do message('m' .. i) end");
    host.tick(snap(screen::LEVEL, 0, 0, 1)).expect("tick");
    let texts = texts(&host);
    assert_eq!(texts.len(), 20);
    assert_eq!(texts.first().map(String::as_str), Some("m6"));
    assert_eq!(texts.last().map(String::as_str), Some("m25"));
    assert_eq!(host.message_total(), 25);
}

#[test]
fn compile_failure_freezes_until_the_source_changes() {
    let mut host = host_with("this is not lua");
    let err = host
        .tick(snap(screen::LEVEL, 0, 0, 1))
        .expect_err("compile should fail");
    assert!(matches!(err, ScriptError::Compile(_)));
    assert_eq!(host.phase(), Phase::Errored);
    assert!(host.result().starts_with("compile error"));

    // Frozen: further ticks are no-ops, not repeated failures.
    host.tick(snap(screen::LEVEL, 1, 1, 1)).expect("frozen tick");

    host.set_source("message('ok')");
    host.tick(snap(screen::LEVEL, 2, 2, 1)).expect("recompile");
    assert_eq!(host.phase(), Phase::Clean);
    assert_eq!(host.result(), "OK");
    assert_eq!(texts(&host), vec!["ok"]);
}

#[test]
fn runtime_failure_keeps_registries_and_skips_the_commit() {
    let mut host = host_with(
        r#"
deaths = 0
on_screen = function() message('screen') end
on_death = function()
  deaths = deaths + 1
  if deaths == 1 then error('boom') end
  message('death ' .. deaths)
end
register_global_interval(function() message('pulse') end, 1000)
"#,
    );
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");

    let err = host
        .tick(snap(screen::DEATH, 101, 101, 1))
        .expect_err("on_death should raise");
    assert!(matches!(err, ScriptError::Runtime(_)));
    assert_eq!(host.phase(), Phase::Errored);
    assert_eq!(host.callback_count(), 1, "registry survives the failure");
    assert!(matches!(host.last_error(), Some(ScriptError::Runtime(_))));

    // Frozen tick does nothing.
    host.tick(snap(screen::DEATH, 102, 102, 1)).expect("frozen");
    assert_eq!(texts(&host), vec!["screen"]);

    // Host intervention: the baseline was never committed, so re-enabling
    // replays the death transition against the old snapshot.
    host.set_enabled(true);
    assert_eq!(host.phase(), Phase::Clean);
    host.tick(snap(screen::DEATH, 103, 103, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["screen", "screen", "death 2"]);

    host.tick(snap(screen::DEATH, 104, 104, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["screen", "screen", "death 2"]);
}

#[test]
fn options_are_mirrored_into_the_script_table() {
    let mut host = host_with(
        r#"
register_option_int('speed', 'Run speed', 4, 1, 10)
register_option_bool('ghost', 'Ghost mode', false)
on_frame = function() message('speed=' .. options.speed) end
"#,
    );
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");
    host.tick(snap(screen::LEVEL, 101, 101, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["speed=4"]);

    let options = host.options();
    assert_eq!(options.len(), 2);
    assert_eq!(
        options[0].value,
        OptionValue::Int {
            value: 4,
            min: 1,
            max: 10
        }
    );
    assert_eq!(options[1].value, OptionValue::Bool { value: false });
    assert_eq!(options[1].desc, "Ghost mode");
}

#[test]
fn declaring_options_outside_a_reload_is_a_runtime_failure() {
    let mut host = host_with("on_frame = function() register_option_int('x', 'x', 1, 0, 2) end");
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");
    let err = host
        .tick(snap(screen::LEVEL, 101, 101, 1))
        .expect_err("runtime declaration should fail");
    assert!(matches!(err, ScriptError::Runtime(_)));
    assert_eq!(host.phase(), Phase::Errored);
}

#[test]
fn session_global_entries_survive_screen_transitions() {
    let mut host = host_with(
        r#"
register_screen_callback(function() message('sc') end, ON.SCREEN)
register_global_interval(function() message('g') end, 3)
"#,
    );
    host.tick(snap(screen::CAMP, 0, 200, 1)).expect("tick");
    host.tick(snap(screen::LEVEL, 0, 201, 1)).expect("tick");
    host.tick(snap(screen::LEVEL, 1, 202, 1)).expect("tick");
    host.tick(snap(screen::DEATH, 2, 203, 1)).expect("tick");

    // The global interval beats on the session clock regardless of screen;
    // the SCREEN sentinel fires on each raw screen change. Both outlive the
    // level-table clears at 201 and 203.
    assert_eq!(texts(&host), vec!["g", "sc", "sc", "g"]);
    assert_eq!(host.callback_count(), 2);
}

#[test]
fn frame_sentinel_fires_every_tick() {
    let mut host = host_with("register_screen_callback(function() message('f') end, ON.FRAME)");
    host.tick(snap(screen::MENU, 0, 0, 1)).expect("tick");
    host.tick(snap(screen::MENU, 0, 1, 1)).expect("tick");
    host.tick(snap(screen::MENU, 0, 2, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["f", "f", "f"]);
}

#[test]
fn level_sentinel_fires_on_entry_and_on_actor_reset() {
    let mut host = host_with("register_screen_callback(function() message('lvl') end, ON.LEVEL)");
    host.tick(snap(screen::LEVEL, 50, 500, 1)).expect("tick");
    // Instant restart: same screen, fresh actor.
    host.tick(snap(screen::LEVEL, 0, 501, 2)).expect("tick");
    host.tick(snap(screen::LEVEL, 1, 502, 2)).expect("tick");
    host.tick(snap(screen::TRANSITION, 2, 503, 2)).expect("tick");
    // Ordinary entry from the transition screen.
    host.tick(snap(screen::LEVEL, 0, 504, 2)).expect("tick");
    assert_eq!(texts(&host), vec!["lvl", "lvl"]);
}

#[test]
fn level_clock_regression_renormalizes_pending_timeouts() {
    let mut host = host_with("register_timeout(function() message('late') end, 10)");
    host.tick(snap(screen::LEVEL, 100, 1000, 1)).expect("tick");
    // The level clock falls back without a screen or actor change; the
    // timeout keeps its remaining 10 frames instead of firing or vanishing.
    host.tick(snap(screen::LEVEL, 3, 1001, 1)).expect("tick");
    for t in 4..=12 {
        host.tick(snap(screen::LEVEL, t, 1002 + t, 1)).expect("tick");
        assert!(texts(&host).is_empty());
    }
    host.tick(snap(screen::LEVEL, 13, 1020, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["late"]);
    assert_eq!(host.callback_count(), 0);
}

#[test]
fn global_timeout_runs_on_the_session_clock_across_level_resets() {
    let mut host = host_with("register_global_timeout(function() message('gt') end, 5)");
    host.tick(snap(screen::LEVEL, 100, 200, 1)).expect("tick");
    // Level reset clears the level table; the global timeout is unaffected.
    host.tick(snap(screen::LEVEL, 0, 201, 2)).expect("tick");
    host.tick(snap(screen::LEVEL, 1, 202, 2)).expect("tick");
    host.tick(snap(screen::LEVEL, 2, 203, 2)).expect("tick");
    host.tick(snap(screen::LEVEL, 3, 204, 2)).expect("tick");
    assert!(texts(&host).is_empty());
    host.tick(snap(screen::LEVEL, 4, 205, 2)).expect("tick");
    assert_eq!(texts(&host), vec!["gt"]);
}

#[test]
fn meta_is_read_after_reload_with_fallbacks() {
    let mut host = host_with(
        r#"
meta.name = 'Pacer'
meta.version = '1.2'
meta.author = 'dev'
"#,
    );
    host.tick(snap(screen::MENU, 0, 0, 1)).expect("tick");
    assert_eq!(host.meta().name, "Pacer");
    assert_eq!(host.meta().version, "1.2");
    assert_eq!(host.meta().author, "dev");
    assert_eq!(host.meta().description, "");

    let mut bare = host_with("");
    bare.tick(snap(screen::MENU, 0, 0, 1)).expect("tick");
    assert_eq!(bare.meta().name, "test.lua");
    assert_eq!(bare.meta().author, "Anonymous");
}

#[test]
fn non_function_slot_bindings_are_ignored() {
    let mut host = host_with("on_frame = 5");
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");
    host.tick(snap(screen::LEVEL, 101, 101, 1)).expect("tick");
    assert!(texts(&host).is_empty());
}

#[test]
fn disabled_script_does_not_even_recompile() {
    let mut host = host_with("message('side effect')");
    host.set_enabled(false);
    host.tick(snap(screen::LEVEL, 100, 100, 1)).expect("tick");
    assert!(texts(&host).is_empty());
    assert_eq!(host.phase(), Phase::Dirty);

    host.set_enabled(true);
    host.tick(snap(screen::LEVEL, 101, 101, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["side effect"]);
}

#[test]
fn handlers_can_register_new_callbacks_mid_tick() {
    let mut host = host_with(
        r#"
on_level = function()
  register_timeout(function() message('armed') end, 2)
end
"#,
    );
    host.tick(snap(screen::TRANSITION, 0, 100, 1)).expect("tick");
    host.tick(snap(screen::LEVEL, 0, 101, 1)).expect("tick");
    assert_eq!(host.callback_count(), 1);
    host.tick(snap(screen::LEVEL, 1, 102, 1)).expect("tick");
    assert!(texts(&host).is_empty());
    host.tick(snap(screen::LEVEL, 2, 103, 1)).expect("tick");
    assert_eq!(texts(&host), vec!["armed"]);
    assert_eq!(host.callback_count(), 0);
}
