use serde::{Deserialize, Serialize};

/// Identity of the primary tracked actor, opaque to this crate. The host
/// hands out a fresh id for every spawned actor, so comparing identities
/// across ticks detects session resets that never change the screen.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ActorId(pub u64);

/// Host state sampled once per tick, owned by the host and read-only here.
///
/// `level_time` resets whenever a level or session restarts; `session_time`
/// only resets on a full session restart. Both are frame counters.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub screen: i32,
    pub level_time: i64,
    pub session_time: i64,
    /// Zero-or-one primary actor; empty between sessions.
    pub actor: Option<ActorId>,
}

/// Screen ids used by the host, plus the two reserved sentinels accepted by
/// `register_screen_callback` (`FRAME` = every tick, `SCREEN` = every screen
/// change). Scripts see the same table as the `ON` global.
pub mod screen {
    pub const LOGO: i32 = 0;
    pub const INTRO: i32 = 1;
    pub const PROLOGUE: i32 = 2;
    pub const TITLE: i32 = 3;
    pub const MENU: i32 = 4;
    pub const OPTIONS: i32 = 5;
    pub const LEADERBOARD: i32 = 7;
    pub const SEED_INPUT: i32 = 8;
    pub const CHARACTER_SELECT: i32 = 9;
    pub const TEAM_SELECT: i32 = 10;
    pub const CAMP: i32 = 11;
    pub const LEVEL: i32 = 12;
    pub const TRANSITION: i32 = 13;
    pub const DEATH: i32 = 14;
    pub const SPACESHIP: i32 = 15;
    pub const WIN: i32 = 16;
    pub const CREDITS: i32 = 17;
    pub const SCORES: i32 = 18;
    pub const CONSTELLATION: i32 = 19;
    pub const RECAP: i32 = 20;

    pub const FRAME: i32 = 100;
    pub const SCREEN: i32 = 101;
}

/// Name/id pairs published to scripts as the `ON` table.
pub(crate) const SCREEN_TABLE: &[(&str, i32)] = &[
    ("LOGO", screen::LOGO),
    ("INTRO", screen::INTRO),
    ("PROLOGUE", screen::PROLOGUE),
    ("TITLE", screen::TITLE),
    ("MENU", screen::MENU),
    ("OPTIONS", screen::OPTIONS),
    ("LEADERBOARD", screen::LEADERBOARD),
    ("SEED_INPUT", screen::SEED_INPUT),
    ("CHARACTER_SELECT", screen::CHARACTER_SELECT),
    ("TEAM_SELECT", screen::TEAM_SELECT),
    ("CAMP", screen::CAMP),
    ("LEVEL", screen::LEVEL),
    ("TRANSITION", screen::TRANSITION),
    ("DEATH", screen::DEATH),
    ("SPACESHIP", screen::SPACESHIP),
    ("WIN", screen::WIN),
    ("CREDITS", screen::CREDITS),
    ("SCORES", screen::SCORES),
    ("CONSTELLATION", screen::CONSTELLATION),
    ("RECAP", screen::RECAP),
    ("FRAME", screen::FRAME),
    ("SCREEN", screen::SCREEN),
];
