//! Controller runtime: the socket-driven event loop and the replay mode.
//!
//! The live loop polls IPC clients, dispatches the calloop sources,
//! releases throttled light commands, and logs a periodic status line.
//! Replay feeds a file of messages through the same dispatcher.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::EventLoop;
use tracing::info;

use crate::ipc::{self, IpcServer};
use crate::state::{ControllerConfig, ControllerState};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Event loop configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Socket path override (default: `$XDG_RUNTIME_DIR/handlight-ipc.sock`).
    pub socket_path: Option<PathBuf>,
    /// Log all IPC messages.
    pub trace: bool,
    /// Exit after N seconds (for CI).
    pub exit_after: Option<u64>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            trace: false,
            exit_after: None,
            poll_interval_ms: 16,
        }
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run the controller until a signal arrives or the exit timer fires.
pub fn run(
    config: ControllerConfig,
    runtime: RuntimeConfig,
    lights: &[crate::geometry::Vec3],
) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<ControllerState>::try_new()?;
    let mut state = ControllerState::new(config);
    for position in lights {
        state.add_light(*position);
    }
    state.drain_events();

    state.ipc_server.ipc_trace = runtime.trace;
    let ipc_path = runtime
        .socket_path
        .unwrap_or_else(IpcServer::default_socket_path);
    state.ipc_server.socket_path = ipc_path.clone();
    ipc::IpcServer::bind(&ipc_path, &event_loop.handle())?;

    install_signal_handlers();

    let start_time = Instant::now();
    let exit_duration = runtime.exit_after.map(Duration::from_secs);
    let mut last_status_log = Instant::now();
    let status_interval = Duration::from_secs(60);
    let poll_interval = Duration::from_millis(runtime.poll_interval_ms);
    info!(
        "Controller initialized (poll interval: {}ms), entering event loop",
        runtime.poll_interval_ms
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= status_interval {
            info!(
                "Status: {} light(s), {} IPC client(s), {} frame(s), mode {}",
                state.lights.len(),
                state.ipc_server.clients.len(),
                state.frames_processed,
                state.gesture.state().as_str(),
            );
            last_status_log = Instant::now();
        }

        ipc::IpcServer::poll_clients(&mut state);

        // Throttled light commands are released even when no frames arrive
        let now = state.frame_clock_ms();
        state.poll_bridge(now);
        ipc::IpcServer::broadcast_pending(&mut state);

        event_loop.dispatch(Some(poll_interval), &mut state)?;
    }

    let _ = std::fs::remove_file(&state.ipc_server.socket_path);

    info!(
        "Controller shutting down ({} light(s), {} IPC client(s))",
        state.lights.len(),
        state.ipc_server.clients.len()
    );
    Ok(())
}

// ── Replay ─────────────────────────────────────────────────

/// Feed one message per line through the dispatcher, writing each
/// response followed by the events it produced. Blank lines and lines
/// starting with `;` are skipped. Pending light commands are flushed at
/// end of input.
pub fn replay<R: BufRead, W: Write>(
    state: &mut ControllerState,
    input: R,
    out: &mut W,
) -> anyhow::Result<usize> {
    let mut count = 0;
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        count += 1;
        if let Some(resp) = ipc::dispatch::handle_trusted(state, line) {
            writeln!(out, "{}", resp)?;
        }
        for event in state.drain_events() {
            writeln!(out, "{}", event)?;
        }
    }

    state.poll_bridge(f64::INFINITY);
    for event in state.drain_events() {
        writeln!(out, "{}", event)?;
    }
    info!(messages = count, "replay finished");
    Ok(count)
}

/// Replay a file to stdout.
pub fn replay_file(
    config: ControllerConfig,
    path: &Path,
    lights: &[crate::geometry::Vec3],
) -> anyhow::Result<()> {
    let file = std::fs::File::open(path)?;
    let mut state = ControllerState::new(config);
    for position in lights {
        state.add_light(*position);
    }
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for event in state.drain_events() {
        writeln!(out, "{}", event)?;
    }
    replay(&mut state, BufReader::new(file), &mut out)?;
    out.flush()?;
    Ok(())
}
