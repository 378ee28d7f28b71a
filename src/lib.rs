//! Live Lua script hosting for a fixed-cadence host process.
//!
//! User scripts register timers and lifecycle handlers; the host calls
//! [`ScriptHost::tick`] once per frame with a fresh [`HostSnapshot`], and the
//! scheduler decides which handlers run, in what order, exactly once — with
//! hot-reload and cancellation safety.

pub mod callbacks;
pub mod host;
pub mod messages;
pub mod options;
pub mod scripting;
pub mod snapshot;
pub mod watcher;

pub use host::{ActorId, HostSnapshot};
pub use messages::Message;
pub use options::{OptionEntry, OptionValue};
pub use scripting::{Phase, ScriptError, ScriptHost, ScriptMeta};
pub use watcher::{ScriptWatcher, SourceChange};
