pub mod vm;

#[cfg(test)]
mod tests;

use serde::Serialize;
use thiserror::Error;

/// The seven lifecycle handler slots, re-bound from script globals on every
/// reload and read fresh each tick.
pub(crate) const HANDLER_SLOTS: &[&str] = &[
    "on_frame",
    "on_camp",
    "on_level",
    "on_transition",
    "on_death",
    "on_win",
    "on_screen",
];

/// Why a reload or a tick failed. Stored on the controller and surfaced to
/// the host verbatim; never escapes `tick` as a panic.
#[derive(Clone, Debug, Error, Serialize)]
pub enum ScriptError {
    /// The script body failed to parse or execute at (re)load time.
    #[error("compile error: {0}")]
    Compile(String),
    /// A fired handler raised during dispatch.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Lifecycle phase of an enabled script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Source changed, not yet recompiled.
    Dirty,
    /// Compiled and dispatching normally.
    Clean,
    /// Last reload or tick failed; ticks are skipped until the source
    /// changes or the host re-enables the script.
    Errored,
}

/// Script-declared metadata, read from the `meta` global after each
/// successful reload.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScriptMeta {
    /// File the source came from; also the fallback display name.
    pub file: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

pub use vm::ScriptHost;
