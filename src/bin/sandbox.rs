use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stagehand::host::screen;
use stagehand::{ActorId, HostSnapshot, Phase, ScriptHost, ScriptWatcher};

/// Drives a script against a synthetic host at a fixed frame cadence, with
/// hot reload on file change. Messages the script emits are echoed to
/// stdout.
#[derive(Parser)]
#[command(name = "sandbox", version, about, long_about = None)]
struct Cli {
    /// Script to host
    script: PathBuf,

    /// Frames per second of the synthetic host clock
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Screen id the synthetic host sits on
    #[arg(long, default_value_t = screen::LEVEL)]
    screen: i32,

    /// Stop after this many frames (runs until interrupted when omitted)
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.script)?;
    let file = cli
        .script
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("script.lua")
        .to_string();
    let mut host = ScriptHost::new(source, file)?;

    let watcher = match ScriptWatcher::new(&cli.script) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("[sandbox] hot reload unavailable: {e}");
            None
        }
    };

    let frame_time = Duration::from_secs(1) / cli.fps.max(1);
    let mut level_time: i64 = 0;
    let mut session_time: i64 = 0;
    let mut printed: u64 = 0;
    let mut frame: u64 = 0;

    loop {
        if let Some(change) = watcher.as_ref().and_then(|w| w.poll()) {
            info!("[sandbox] source changed, reloading");
            host.set_source(change.source);
        }

        let was_dirty = host.phase() == Phase::Dirty;
        let snapshot = HostSnapshot {
            screen: cli.screen,
            level_time,
            session_time,
            actor: Some(ActorId(1)),
        };
        if let Err(err) = host.tick(snapshot) {
            warn!("[sandbox] {err}");
        }
        if was_dirty && host.phase() == Phase::Clean {
            let meta = host.meta();
            info!("[sandbox] running '{}' by {}", meta.name, meta.author);
            if !host.options().is_empty() {
                info!(
                    "[sandbox] options: {}",
                    serde_json::to_string(&host.options())?
                );
            }
        }

        // Echo messages emitted since the last frame.
        let total = host.message_total();
        if total > printed {
            let fresh = (total - printed).min(host.messages().len() as u64) as usize;
            for message in host.messages().iter().rev().take(fresh).rev() {
                println!("{} {}", message.at.format("%H:%M:%S%.3f"), message.text);
            }
            printed = total;
        }

        level_time += 1;
        session_time += 1;
        frame += 1;
        if let Some(limit) = cli.frames {
            if frame >= limit {
                break;
            }
        }
        thread::sleep(frame_time);
    }

    Ok(())
}
