use crate::host::{screen, ActorId, HostSnapshot};

/// The last host snapshot that completed dispatch; the baseline for the next
/// tick's diff. Mutated only through [`TrackedState::commit`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackedState {
    pub screen: i32,
    pub level_time: i64,
    pub session_time: i64,
    pub actor: Option<ActorId>,
}

impl From<&HostSnapshot> for TrackedState {
    fn from(snap: &HostSnapshot) -> Self {
        Self {
            screen: snap.screen,
            level_time: snap.level_time,
            session_time: snap.session_time,
            actor: snap.actor,
        }
    }
}

impl TrackedState {
    /// Replaces the baseline with the snapshot whose dispatch just finished.
    /// Must run exactly once per tick, after all dispatch. An absent actor
    /// never clears the tracked identity, so an actor that disappears for a
    /// few ticks and returns unchanged does not read as a session reset.
    pub fn commit(&mut self, cur: &HostSnapshot) {
        self.screen = cur.screen;
        self.level_time = cur.level_time;
        self.session_time = cur.session_time;
        if let Some(actor) = cur.actor {
            self.actor = Some(actor);
        }
    }
}

/// Edge flags for one tick, computed from (previous, current) before any
/// handler runs. The `entered_*` flags are edge-triggered: true only on the
/// tick the screen became that screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickDiff {
    pub screen_changed: bool,
    pub actor_changed: bool,
    pub level_time_advanced: bool,
    pub entered_camp: bool,
    pub entered_level: bool,
    pub entered_transition: bool,
    pub entered_death: bool,
    pub entered_win: bool,
}

impl TickDiff {
    /// True when the level-local callback table must be cleared and the
    /// `screen` slot fired: a raw screen change, or a session reset detected
    /// through the actor identity alone.
    pub fn screen_or_actor_changed(&self) -> bool {
        self.screen_changed || self.actor_changed
    }
}

/// Pure transition detection, independent of dispatch.
pub fn diff(prev: &TrackedState, cur: &HostSnapshot) -> TickDiff {
    let screen_changed = cur.screen != prev.screen;
    let actor_changed = match cur.actor {
        Some(actor) => prev.actor != Some(actor),
        None => false,
    };
    let entered = |id: i32| cur.screen == id && prev.screen != id;
    TickDiff {
        screen_changed,
        actor_changed,
        level_time_advanced: cur.level_time > prev.level_time,
        entered_camp: entered(screen::CAMP),
        // The level screen also re-enters when the screen never changed but
        // the run restarted under a fresh actor.
        entered_level: cur.screen == screen::LEVEL
            && (prev.screen != screen::LEVEL || actor_changed),
        entered_transition: entered(screen::TRANSITION),
        entered_death: entered(screen::DEATH),
        // Two distinct terminal screens both count as a win.
        entered_win: entered(screen::WIN) || entered(screen::CONSTELLATION),
    }
}
