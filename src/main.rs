//! tn5250: line-mode 5250 terminal
//!
//! Usage: `tn5250 [+opt] [-opt] [key=value]... host[:port]`
//!
//! A host of `debug:<file>` replays a trace written with `RUST_LOG=trace`
//! instead of connecting. `+pause` then waits for a line of input before
//! each replayed record.

use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};

use tn5250_engine::ebcdic::CharMap;
use tn5250_engine::lib5250::{DebugStream, TelnetStream, Transport};
use tn5250_engine::terminal::Terminal;
use tn5250_engine::{Display, LineTerminal, Session, SessionConfig};

const DEBUG_PREFIX: &str = "debug:";

fn usage() -> ! {
    eprintln!("usage: tn5250 [+opt] [-opt] [key=value]... host[:port]");
    eprintln!("       tn5250 [+pause] debug:<tracefile>");
    std::process::exit(2);
}

/// Command line settings over those from an optional `config=<file>`.
fn load_config() -> Result<SessionConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        usage();
    }
    let config = SessionConfig::parse_args(&args);
    let Some(path) = config.get_string("config").map(str::to_string) else {
        return Ok(config);
    };

    let mut merged = SessionConfig::load_from_file(&path).with_context(|| format!("loading {path}"))?;
    merged.apply_args(&args);
    Ok(merged)
}

fn display_for(config: &SessionConfig) -> Result<Display> {
    let map = CharMap::new(config.char_map()).context("choosing character map")?;
    Ok(Display::with_char_map(map))
}

/// Run the session loop on a blocking thread. Ctrl-C raises the shutdown
/// flag and the loop exits at its next pass.
async fn run<T>(mut session: Session<T>) -> Result<()>
where
    T: Transport + Send + 'static,
{
    let shutdown = session.shutdown_handle();
    let mut task = tokio::task::spawn_blocking(move || {
        let result = session.main_loop();
        session.transport_mut().disconnect();
        result
    });

    let result = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted, shutting down");
            shutdown.store(true, Ordering::Relaxed);
            task.await
        }
    };
    match result.context("session thread panicked")? {
        Ok(()) => Ok(()),
        Err(e) if e.is_disconnect() => {
            log::warn!("{}", e);
            Ok(())
        }
        Err(e) => Err(e).context("session failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = load_config()?;
    let mut display = display_for(&config)?;
    let host = config.get_string("host").unwrap_or_default().to_string();

    if let Some(path) = host.strip_prefix(DEBUG_PREFIX) {
        if path.is_empty() {
            bail!("no trace file after {DEBUG_PREFIX}");
        }
        let stream = DebugStream::open(path).with_context(|| format!("opening trace {path}"))?;
        let inner: Box<dyn Terminal> = Box::new(LineTerminal::new());
        display.set_terminal(Box::new(stream.terminal(Some(inner), config.get_bool("pause"))));
        log::info!("replaying {}", path);
        return run(Session::new(stream, display, &config)).await;
    }

    let cfg = config.clone();
    let stream = tokio::task::spawn_blocking(move || TelnetStream::connect(&cfg))
        .await?
        .with_context(|| format!("connecting to {host}"))?;
    display.set_terminal(Box::new(LineTerminal::new()));
    run(Session::new(stream, display, &config)).await
}
