use std::collections::BTreeMap;

use mlua::RegistryKey;

use crate::host::screen;
use crate::snapshot::TickDiff;

/// Handle returned to the script at registration time. Ids are strictly
/// increasing, never reused within a process run, and unique across both
/// clock domains.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CallbackId(pub u64);

/// Which clock drives a table. Level-local entries die with the level;
/// session-global entries survive screen transitions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockDomain {
    Level,
    Session,
}

/// Scheduling variant of a registered callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    /// Fires whenever the driving clock has advanced at least `period` past
    /// `last_fired`. Starts at -1 so a fresh interval is eligible on the
    /// tick it was registered.
    Interval { period: i64, last_fired: i64 },
    /// Fires once when the driving clock reaches `deadline`, then is removed.
    Timeout { deadline: i64 },
    /// Fires on qualifying transitions onto `screen_id`; the reserved
    /// `screen::FRAME` and `screen::SCREEN` sentinels mean every tick and
    /// every screen change.
    Screen { screen_id: i32, last_fired: i64 },
}

impl CallbackKind {
    /// Whether this entry fires this tick, given the table's driving clock
    /// and the tick's transition flags.
    pub fn due(&self, clock: i64, cur_screen: i32, d: &TickDiff) -> bool {
        match *self {
            CallbackKind::Interval { period, last_fired } => clock >= last_fired + period,
            CallbackKind::Timeout { deadline } => clock >= deadline,
            CallbackKind::Screen { screen_id, .. } => {
                (screen_id == cur_screen && d.screen_changed)
                    || (screen_id == screen::LEVEL && d.entered_level)
                    || screen_id == screen::FRAME
                    || (screen_id == screen::SCREEN && d.screen_changed)
            }
        }
    }
}

pub struct CallbackEntry {
    pub kind: CallbackKind,
    /// The Lua handler, held through the VM registry so the table owns no
    /// VM lifetime.
    pub handler: RegistryKey,
}

/// The two pending-callback tables. Cancellations are buffered and applied
/// in a distinct pass so the dispatcher never mutates a table it is
/// deciding over.
#[derive(Default)]
pub struct CallbackRegistry {
    level: BTreeMap<CallbackId, CallbackEntry>,
    session: BTreeMap<CallbackId, CallbackEntry>,
    next_id: u64,
    pending_cancels: Vec<CallbackId>,
}

impl CallbackRegistry {
    pub fn register(
        &mut self,
        domain: ClockDomain,
        kind: CallbackKind,
        handler: RegistryKey,
    ) -> CallbackId {
        debug_assert!(
            !matches!(kind, CallbackKind::Screen { .. }) || domain == ClockDomain::Session,
            "screen callbacks are session-global only"
        );
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.table_mut(domain).insert(id, CallbackEntry { kind, handler });
        id
    }

    /// Buffers a cancellation; applied by [`CallbackRegistry::apply_cancels`].
    /// Unknown ids are accepted and ignored there.
    pub fn cancel(&mut self, id: CallbackId) {
        self.pending_cancels.push(id);
    }

    /// Applies buffered cancellations against both tables. Idempotent per id.
    pub fn apply_cancels(&mut self) {
        for id in std::mem::take(&mut self.pending_cancels) {
            self.level.remove(&id);
            self.session.remove(&id);
        }
    }

    /// Drops every level-local entry (screen transition / session reset).
    pub fn clear_level(&mut self) {
        self.level.clear();
    }

    /// Drops everything, including buffered cancellations (script reload).
    pub fn clear_all(&mut self) {
        self.level.clear();
        self.session.clear();
        self.pending_cancels.clear();
    }

    /// Renormalizes level-local entries after the level clock went backwards:
    /// intervals restart their period from the new clock, timeouts keep the
    /// delay they had remaining under the old clock.
    pub fn rebase_level_clock(&mut self, now: i64, old_now: i64) {
        for entry in self.level.values_mut() {
            match &mut entry.kind {
                CallbackKind::Interval { last_fired, .. } => *last_fired = now,
                CallbackKind::Timeout { deadline } => {
                    *deadline = now + (*deadline - old_now).max(0);
                }
                CallbackKind::Screen { .. } => {}
            }
        }
    }

    /// Ids due this tick in a table, in registration order. Collected before
    /// invocation so handlers can register callbacks without mutating a
    /// table mid-iteration.
    pub fn due_ids(
        &self,
        domain: ClockDomain,
        clock: i64,
        cur_screen: i32,
        d: &TickDiff,
    ) -> Vec<CallbackId> {
        self.table(domain)
            .iter()
            .filter(|(_, entry)| entry.kind.due(clock, cur_screen, d))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn get(&self, domain: ClockDomain, id: CallbackId) -> Option<&CallbackEntry> {
        self.table(domain).get(&id)
    }

    pub fn remove(&mut self, domain: ClockDomain, id: CallbackId) -> Option<CallbackEntry> {
        self.table_mut(domain).remove(&id)
    }

    /// Records a fire on an interval or screen entry.
    pub fn touch(&mut self, domain: ClockDomain, id: CallbackId, clock: i64) {
        if let Some(entry) = self.table_mut(domain).get_mut(&id) {
            match &mut entry.kind {
                CallbackKind::Interval { last_fired, .. }
                | CallbackKind::Screen { last_fired, .. } => *last_fired = clock,
                CallbackKind::Timeout { .. } => {}
            }
        }
    }

    pub fn contains(&self, id: CallbackId) -> bool {
        self.level.contains_key(&id) || self.session.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.level.len() + self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.level.is_empty() && self.session.is_empty()
    }

    fn table(&self, domain: ClockDomain) -> &BTreeMap<CallbackId, CallbackEntry> {
        match domain {
            ClockDomain::Level => &self.level,
            ClockDomain::Session => &self.session,
        }
    }

    fn table_mut(&mut self, domain: ClockDomain) -> &mut BTreeMap<CallbackId, CallbackEntry> {
        match domain {
            ClockDomain::Level => &mut self.level,
            ClockDomain::Session => &mut self.session,
        }
    }
}
