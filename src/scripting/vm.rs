use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Function, Lua, LuaSerdeExt, Table, Value};
use serde::Serialize;
use tracing::{info, warn};

use crate::callbacks::{CallbackId, CallbackKind, CallbackRegistry, ClockDomain};
use crate::host::{HostSnapshot, SCREEN_TABLE};
use crate::messages::{Message, MessageLog};
use crate::options::{OptionEntry, OptionRegistry, OptionValue};
use crate::scripting::{Phase, ScriptError, ScriptMeta, HANDLER_SLOTS};
use crate::snapshot::{diff, TickDiff, TrackedState};

/// State reachable from both the host-facing surface and the Lua-facing
/// closures. Everything runs on one thread; the `RefCell` borrows are scoped
/// so no borrow is held across a Lua call.
#[derive(Default)]
struct Shared {
    callbacks: CallbackRegistry,
    options: OptionRegistry,
    messages: MessageLog,
    /// Baseline for transition detection; `None` until the first tick.
    prev: Option<TrackedState>,
    /// Snapshot of the tick in progress; read by registration closures for
    /// deadline arithmetic.
    now: HostSnapshot,
    /// Options may only be declared while the body is (re)executing.
    loading: bool,
}

/// The `state` global mirrored to scripts at the start of every tick.
#[derive(Serialize)]
struct StateView {
    screen: i32,
    screen_last: i32,
    level_time: i64,
    session_time: i64,
}

fn rt(err: mlua::Error) -> ScriptError {
    ScriptError::Runtime(err.to_string())
}

/// Hosts one user script: owns the Lua state, the callback and option
/// registries, the message log, and the lifecycle state machine. The host
/// drives it with [`ScriptHost::tick`] once per frame; the script and every
/// fired handler run synchronously to completion inside that call.
pub struct ScriptHost {
    lua: Lua,
    code: String,
    meta: ScriptMeta,
    enabled: bool,
    phase: Phase,
    /// Host-displayable outcome of the last reload/tick: "OK" or the error.
    result: String,
    last_error: Option<ScriptError>,
    shared: Rc<RefCell<Shared>>,
}

impl ScriptHost {
    pub fn new(code: impl Into<String>, file: impl Into<String>) -> mlua::Result<Self> {
        let file = file.into();
        let host = Self {
            lua: Lua::new(),
            code: code.into(),
            meta: ScriptMeta {
                name: file.clone(),
                file,
                ..ScriptMeta::default()
            },
            enabled: true,
            phase: Phase::Dirty,
            result: String::new(),
            last_error: None,
            shared: Rc::new(RefCell::new(Shared::default())),
        };
        host.bind_api()?;
        Ok(host)
    }

    /// Replaces the backing source; the next tick recompiles from scratch.
    pub fn set_source(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.phase = Phase::Dirty;
    }

    /// Host-side enable toggle. Re-enabling an errored script clears the
    /// freeze without recompiling, resuming against the callback set the
    /// failure left behind.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled && self.phase == Phase::Errored {
            self.phase = Phase::Clean;
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// "OK", or the last failure rendered for host display.
    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn last_error(&self) -> Option<&ScriptError> {
        self.last_error.as_ref()
    }

    pub fn meta(&self) -> &ScriptMeta {
        &self.meta
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.borrow().messages.iter().cloned().collect()
    }

    /// Messages emitted over the whole run, including evicted ones.
    pub fn message_total(&self) -> u64 {
        self.shared.borrow().messages.total()
    }

    pub fn options(&self) -> Vec<OptionEntry> {
        self.shared.borrow().options.iter().cloned().collect()
    }

    /// Pending callbacks across both clock domains.
    pub fn callback_count(&self) -> usize {
        self.shared.borrow().callbacks.len()
    }

    /// Runs one host tick: recompile if the source changed, then diff the
    /// snapshot, dispatch whatever fired, and commit the new baseline.
    ///
    /// A failure freezes the script (subsequent ticks are no-ops) until the
    /// source changes or the host re-enables it; registry mutations applied
    /// before the failure stay applied and the snapshot is not committed.
    pub fn tick(&mut self, now: HostSnapshot) -> Result<(), ScriptError> {
        if !self.enabled || self.phase == Phase::Errored {
            return Ok(());
        }
        match self.run_tick(&now) {
            Ok(()) => {
                self.result = "OK".to_string();
                Ok(())
            }
            Err(err) => {
                warn!("[Stagehand scripts] '{}': {err}", self.meta.name);
                self.phase = Phase::Errored;
                self.result = err.to_string();
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn run_tick(&mut self, now: &HostSnapshot) -> Result<(), ScriptError> {
        self.shared.borrow_mut().now = *now;
        self.publish_state(now)?;
        if self.phase == Phase::Dirty {
            self.reload()?;
            self.phase = Phase::Clean;
            info!(
                "[Stagehand scripts] loaded '{}' {}",
                self.meta.name, self.meta.version
            );
        }
        let prev = {
            let sh = self.shared.borrow();
            sh.prev.unwrap_or_else(|| TrackedState::from(now))
        };
        let d = diff(&prev, now);
        self.dispatch(&prev, now, &d)?;
        let mut committed = prev;
        committed.commit(now);
        self.shared.borrow_mut().prev = Some(committed);
        Ok(())
    }

    /// Full reload: both callback tables, the options, and the handler
    /// slots are rebuilt from nothing before the body executes once.
    fn reload(&mut self) -> Result<(), ScriptError> {
        {
            let mut sh = self.shared.borrow_mut();
            sh.callbacks.clear_all();
            sh.options.clear();
            sh.loading = true;
        }
        let compiled = (|| -> mlua::Result<()> {
            let globals = self.lua.globals();
            for slot in HANDLER_SLOTS {
                globals.set(*slot, Value::Nil)?;
            }
            globals.set("meta", self.lua.create_table()?)?;
            globals.set("options", self.lua.create_table()?)?;
            self.lua
                .load(self.code.as_str())
                .set_name(self.meta.file.as_str())
                .exec()
        })();
        self.shared.borrow_mut().loading = false;
        self.lua.expire_registry_values();
        compiled.map_err(|e| ScriptError::Compile(e.to_string()))?;
        self.read_meta();
        Ok(())
    }

    fn read_meta(&mut self) {
        let table = self
            .lua
            .globals()
            .get::<Option<Table>>("meta")
            .ok()
            .flatten();
        let field = |key: &str| -> Option<String> {
            table
                .as_ref()
                .and_then(|t| t.get::<Option<String>>(key).ok().flatten())
        };
        self.meta.name = field("name").unwrap_or_else(|| self.meta.file.clone());
        self.meta.version = field("version").unwrap_or_default();
        self.meta.description = field("description").unwrap_or_default();
        self.meta.author = field("author").unwrap_or_else(|| "Anonymous".to_string());
    }

    /// Refreshes the script-visible `state` and `players` globals from the
    /// current snapshot. Handlers therefore see the tick being dispatched,
    /// while `state.screen_last` still names the committed baseline.
    fn publish_state(&self, now: &HostSnapshot) -> Result<(), ScriptError> {
        let screen_last = {
            let sh = self.shared.borrow();
            sh.prev.map(|p| p.screen).unwrap_or(now.screen)
        };
        let globals = self.lua.globals();
        let state = self
            .lua
            .to_value(&StateView {
                screen: now.screen,
                screen_last,
                level_time: now.level_time,
                session_time: now.session_time,
            })
            .map_err(rt)?;
        globals.set("state", state).map_err(rt)?;
        let players = self.lua.create_table().map_err(rt)?;
        if let Some(actor) = now.actor {
            players.set(1, actor.0).map_err(rt)?;
        }
        globals.set("players", players).map_err(rt)?;
        Ok(())
    }

    /// The per-tick dispatch order. A handler failure propagates immediately
    /// and aborts the remainder of the tick.
    fn dispatch(
        &self,
        prev: &TrackedState,
        now: &HostSnapshot,
        d: &TickDiff,
    ) -> Result<(), ScriptError> {
        // Level clock went backwards without the table being cleared below:
        // renormalize surviving level-local entries first, so registrations
        // made later this tick are never double-shifted.
        if now.level_time < prev.level_time {
            self.shared
                .borrow_mut()
                .callbacks
                .rebase_level_clock(now.level_time, prev.level_time);
        }

        // 1. Screen change or session reset: the level-local table dies and
        //    the screen slot fires.
        if d.screen_or_actor_changed() {
            self.shared.borrow_mut().callbacks.clear_level();
            self.call_slot("on_screen")?;
        }

        // 2. Frame clock advanced.
        if d.level_time_advanced {
            self.call_slot("on_frame")?;
        }

        // 3. At most one lifecycle slot; the screens are mutually exclusive.
        if d.entered_camp {
            self.call_slot("on_camp")?;
        } else if d.entered_level {
            self.call_slot("on_level")?;
        } else if d.entered_transition {
            self.call_slot("on_transition")?;
        } else if d.entered_death {
            self.call_slot("on_death")?;
        } else if d.entered_win {
            self.call_slot("on_win")?;
        }

        // 4. Cancellations buffered since the last safe point.
        self.shared.borrow_mut().callbacks.apply_cancels();
        self.lua.expire_registry_values();

        // 5./6. The two timer tables, each driven by its own clock.
        self.run_table(ClockDomain::Session, now.session_time, now, d)?;
        self.run_table(ClockDomain::Level, now.level_time, now, d)?;
        Ok(())
    }

    /// Fires a lifecycle slot if the script currently binds a function to
    /// it. Non-function bindings are ignored.
    fn call_slot(&self, name: &str) -> Result<(), ScriptError> {
        let slot = self
            .lua
            .globals()
            .get::<Option<Function>>(name)
            .ok()
            .flatten();
        if let Some(handler) = slot {
            handler.call::<()>(()).map_err(rt)?;
        }
        Ok(())
    }

    /// Runs every due entry of one table. The due set is collected up front
    /// so handlers may register new callbacks freely; those are first
    /// considered on the next pass. `last_fired` updates and timeout
    /// removals are applied per entry, after its handler returned, so a
    /// failure keeps earlier updates and loses none.
    fn run_table(
        &self,
        domain: ClockDomain,
        clock: i64,
        now: &HostSnapshot,
        d: &TickDiff,
    ) -> Result<(), ScriptError> {
        let due = {
            let sh = self.shared.borrow();
            sh.callbacks.due_ids(domain, clock, now.screen, d)
        };
        for id in due {
            let (handler, is_timeout) = {
                let sh = self.shared.borrow();
                match sh.callbacks.get(domain, id) {
                    Some(entry) => {
                        let handler = self
                            .lua
                            .registry_value::<Function>(&entry.handler)
                            .map_err(rt)?;
                        (handler, matches!(entry.kind, CallbackKind::Timeout { .. }))
                    }
                    None => continue,
                }
            };
            handler.call::<()>(()).map_err(rt)?;
            let mut sh = self.shared.borrow_mut();
            if is_timeout {
                sh.callbacks.remove(domain, id);
            } else {
                sh.callbacks.touch(domain, id, clock);
            }
        }
        Ok(())
    }

    /// Installs the scripting surface: registration and cancellation,
    /// options, the message log, and the static `ON` table. Called once at
    /// construction; reload only resets the script-owned globals.
    fn bind_api(&self) -> mlua::Result<()> {
        let lua = &self.lua;
        let globals = lua.globals();

        let on = lua.create_table()?;
        for (name, id) in SCREEN_TABLE {
            on.set(*name, *id)?;
        }
        globals.set("ON", on)?;
        globals.set("meta", lua.create_table()?)?;
        globals.set("options", lua.create_table()?)?;
        globals.set("state", lua.create_table()?)?;
        globals.set("players", lua.create_table()?)?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "message",
            lua.create_function(move |_, text: String| {
                shared.borrow_mut().messages.push(text);
                Ok(())
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_interval",
            lua.create_function(move |lua, (cb, period): (Function, i64)| {
                let handler = lua.create_registry_value(cb)?;
                let id = shared.borrow_mut().callbacks.register(
                    ClockDomain::Level,
                    CallbackKind::Interval {
                        period,
                        last_fired: -1,
                    },
                    handler,
                );
                Ok(id.0)
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_timeout",
            lua.create_function(move |lua, (cb, delay): (Function, i64)| {
                let handler = lua.create_registry_value(cb)?;
                let mut sh = shared.borrow_mut();
                let deadline = sh.now.level_time + delay;
                let id = sh.callbacks.register(
                    ClockDomain::Level,
                    CallbackKind::Timeout { deadline },
                    handler,
                );
                Ok(id.0)
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_global_interval",
            lua.create_function(move |lua, (cb, period): (Function, i64)| {
                let handler = lua.create_registry_value(cb)?;
                let id = shared.borrow_mut().callbacks.register(
                    ClockDomain::Session,
                    CallbackKind::Interval {
                        period,
                        last_fired: -1,
                    },
                    handler,
                );
                Ok(id.0)
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_global_timeout",
            lua.create_function(move |lua, (cb, delay): (Function, i64)| {
                let handler = lua.create_registry_value(cb)?;
                let mut sh = shared.borrow_mut();
                let deadline = sh.now.session_time + delay;
                let id = sh.callbacks.register(
                    ClockDomain::Session,
                    CallbackKind::Timeout { deadline },
                    handler,
                );
                Ok(id.0)
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_screen_callback",
            lua.create_function(move |lua, (cb, screen_id): (Function, i32)| {
                let handler = lua.create_registry_value(cb)?;
                let id = shared.borrow_mut().callbacks.register(
                    ClockDomain::Session,
                    CallbackKind::Screen {
                        screen_id,
                        last_fired: -1,
                    },
                    handler,
                );
                Ok(id.0)
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "cancel",
            lua.create_function(move |_, id: u64| {
                shared.borrow_mut().callbacks.cancel(CallbackId(id));
                Ok(())
            })?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_option_int",
            lua.create_function(
                move |lua, (name, desc, value, min, max): (String, String, i64, i64, i64)| {
                    let mut sh = shared.borrow_mut();
                    if !sh.loading {
                        return Err(mlua::Error::RuntimeError(
                            "register_option_int is only available while the script is loading"
                                .into(),
                        ));
                    }
                    sh.options
                        .declare(&name, &desc, OptionValue::Int { value, min, max });
                    drop(sh);
                    let mirror: Table = lua.globals().get("options")?;
                    mirror.set(name, value)?;
                    Ok(())
                },
            )?,
        )?;

        let shared = Rc::clone(&self.shared);
        globals.set(
            "register_option_bool",
            lua.create_function(move |lua, (name, desc, value): (String, String, bool)| {
                let mut sh = shared.borrow_mut();
                if !sh.loading {
                    return Err(mlua::Error::RuntimeError(
                        "register_option_bool is only available while the script is loading".into(),
                    ));
                }
                sh.options.declare(&name, &desc, OptionValue::Bool { value });
                drop(sh);
                let mirror: Table = lua.globals().get("options")?;
                mirror.set(name, value)?;
                Ok(())
            })?,
        )?;

        Ok(())
    }
}
