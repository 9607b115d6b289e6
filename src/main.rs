//! handlight: gesture-driven smart light controller.
//!
//! Listens for hand tracker and depth frames on a Unix socket and turns
//! hand poses into light commands.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use handlight::depth::MAX_SEARCH_RADIUS;
use handlight::geometry::Vec3;
use handlight::runtime::{self, RuntimeConfig};
use handlight::state::ControllerConfig;

#[derive(Parser, Debug)]
#[command(name = "handlight", about = "Hand-pose gesture control for smart lights")]
struct Cli {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/handlight-ipc.sock)
    #[arg(long)]
    ipc_socket: Option<String>,

    /// Log all IPC messages to stderr
    #[arg(long)]
    ipc_trace: bool,

    /// Exit after N seconds (testing)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Feed messages from FILE (one per line) and print results instead of listening
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Minimum tracker confidence for a frame to be classified
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Half-size of the depth search window in pixels
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=MAX_SEARCH_RADIUS))]
    search_radius: Option<i64>,

    /// Raw depth sample to distance factor
    #[arg(long)]
    depth_scale: Option<f32>,

    /// Drag span as a multiple of the hand height
    #[arg(long)]
    drag_multiplier: Option<f32>,

    /// Minimum interval between light bridge requests (ms)
    #[arg(long)]
    bridge_interval_ms: Option<f64>,

    /// Pre-register a light at X,Y,Z (repeatable)
    #[arg(long = "light", value_name = "X,Y,Z", value_parser = parse_position)]
    lights: Vec<Vec3>,

    /// Event loop poll interval (ms)
    #[arg(long, default_value_t = 16)]
    poll_interval_ms: u64,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn parse_position(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid coordinate in {s:?}: {e}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected X,Y,Z, got {s:?}")),
    }
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        let mut config = ControllerConfig::default();
        if let Some(c) = self.min_confidence {
            config.tracking.min_confidence = c;
            config.depth.min_confidence = c;
        }
        if let Some(r) = self.search_radius {
            config.depth.search_radius = r;
        }
        if let Some(s) = self.depth_scale {
            config.depth.scale = s;
        }
        if let Some(m) = self.drag_multiplier {
            config.control.drag_multiplier = m;
        }
        if let Some(ms) = self.bridge_interval_ms {
            config.bridge.min_interval_ms = ms;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("handlight {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Logs go to stderr so replay output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handlight=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("handlight v{} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.controller_config();

    if let Some(path) = &cli.replay {
        info!(?path, "replaying");
        return runtime::replay_file(config, path, &cli.lights);
    }

    runtime::run(
        config,
        RuntimeConfig {
            socket_path: cli.ipc_socket.map(PathBuf::from),
            trace: cli.ipc_trace,
            exit_after: cli.exit_after,
            poll_interval_ms: cli.poll_interval_ms,
        },
        &cli.lights,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("1,2.5,-3").unwrap(), Vec3::new(1.0, 2.5, -3.0));
        assert!(parse_position("1,2").is_err());
        assert!(parse_position("a,b,c").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "handlight",
            "--search-radius",
            "10",
            "--light",
            "0,0,2",
            "--light",
            "1,0,2",
        ]);
        assert_eq!(cli.controller_config().depth.search_radius, 10);
        assert_eq!(cli.lights.len(), 2);
    }

    #[test]
    fn test_search_radius_bounded() {
        assert!(Cli::try_parse_from(["handlight", "--search-radius", "10001"]).is_err());
        assert!(Cli::try_parse_from(["handlight", "--search-radius", "10000"]).is_ok());
    }
}
