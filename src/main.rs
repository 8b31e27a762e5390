//! # EVC Monitor Application Entry Point
//!
//! This binary polls a SolaX EV charger and prints its readings to the terminal.
//!
//! ```text
//! evc-monitor [--config <path>] [--once]
//! ```
//!
//! - `--config <path>`: configuration file (default `evc-config.toml`)
//! - `--once`: fetch once, print the table and exit; fails if the charger is unreachable
//!
//! Without `--once` the monitor refreshes on the configured interval and prints the
//! table after every successful update until interrupted with Ctrl-C.
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use anyhow::Context;
use evc_core_lib::config::{Config, DEFAULT_CONFIG_PATH};
use evc_core_lib::poller::{spawn_poller, FirstTick};
use evc_core_lib::renderer::draw_ascii;
use evc_core_lib::sensor::{build_sensors, readings, Sensor};
use evc_core_lib::{CoreState, UpdateCore};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line options
struct Args {
    config_path: PathBuf,
    once: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        let mut once = false;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--once" => once = true,
                "--config" => {
                    config_path = args
                        .next()
                        .map(PathBuf::from)
                        .context("--config requires a path")?;
                }
                other => anyhow::bail!("unknown argument: {other}"),
            }
        }

        Ok(Self { config_path, once })
    }
}

fn print_state(sensors: &[Sensor], state: &CoreState) {
    draw_ascii(&readings(sensors, state), state.last_success());
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse()?;
    let config = Config::load_from_path(&args.config_path)
        .with_context(|| format!("cannot load {}", args.config_path.display()))?;

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.once))
}

async fn run(config: Config, once: bool) -> anyhow::Result<()> {
    let schema = config.schema.build().context("invalid schema")?;
    let core = UpdateCore::with_http(config.device.clone(), schema)
        .context("cannot create HTTP transport")?;
    let sensors = build_sensors(core.schema(), &config.device.host);

    // Populate readings before anything is shown
    if let Err(err) = core.refresh().await {
        if once {
            return Err(err).context(format!("cannot read {}", config.device.host));
        }
        warn!("initial refresh failed, will retry on schedule: {err}");
    }

    print_state(&sensors, &core.state());
    if once {
        return Ok(());
    }

    let printer = {
        let view = core.clone();
        let sensors = sensors.clone();
        core.on_update(move |_| print_state(&sensors, &view.state()))
    };

    let poller = spawn_poller(
        core.clone(),
        config.device.poll_interval(),
        FirstTick::AfterPeriod,
    );
    info!(
        host = %config.device.host,
        interval_s = config.device.poll_interval_seconds,
        readings = sensors.len(),
        "monitoring charger"
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;

    info!("shutting down");
    poller.shutdown().await;
    printer.abort();
    Ok(())
}
