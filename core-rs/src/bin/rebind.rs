//! rebind - restart a command on file changes behind stable TCP forwarders
//!
//! ```text
//! rebind --addr-env APP_ADDR:8080 --regex '\.go$' -- go run .
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rebind_core::config::{parse_duration, AddrBinding, FileConfig, SupervisorConfig};
use rebind_core::logging;
use rebind_core::port::{ForwarderRegistry, PortAllocator};
use rebind_core::process::{Supervisor, SystemLifecycle};
use rebind_core::watch::{ChangeWatcher, Debouncer, RestartSignal, DEFAULT_QUEUE_CAPACITY};

#[derive(Parser, Debug)]
#[command(name = "rebind")]
#[command(version)]
#[command(about = "Restart a command on file changes; keep its ports stable", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Use polling instead of events
    #[arg(long)]
    poll: bool,

    /// Polling interval when polling (e.g. 500ms, 1s)
    #[arg(long, value_parser = duration_arg)]
    poll_interval: Option<Duration>,

    /// Directory to watch
    #[arg(long)]
    watch: Option<PathBuf>,

    /// Regular expression of filenames to watch
    #[arg(long)]
    regex: Option<String>,

    /// Regular expression of filenames to ignore
    #[arg(long)]
    ignore: Option<String>,

    /// Envs to forward addresses on, e.g. ADDR:8080 (comma separated or repeated)
    #[arg(long = "addr-env", value_delimiter = ',')]
    addr_env: Vec<AddrBinding>,

    /// First port to allocate for forwarding
    #[arg(long)]
    port_min: Option<u16>,

    /// End of the forwarding range (exclusive)
    #[arg(long)]
    port_max: Option<u16>,

    /// Amount of time to debounce events by (e.g. 2s, 500ms, 1m30s)
    #[arg(long, value_parser = duration_arg)]
    debounce: Option<Duration>,

    /// YAML config file; flags override its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Command to run, with its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn duration_arg(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Defaults, then the config file, then flags
fn resolve_config(cli: Cli) -> Result<SupervisorConfig> {
    let mut config = SupervisorConfig::default();

    if let Some(path) = &cli.config {
        let file = FileConfig::load(path)
            .with_context(|| format!("Could not load config file {}", path.display()))?;
        config.merge_file(file)?;
    }

    if cli.verbose {
        config.verbose = true;
    }
    if cli.poll {
        config.poll = true;
    }
    if let Some(interval) = cli.poll_interval {
        config.poll_interval = interval;
    }
    if let Some(watch) = cli.watch {
        config.watch_dir = watch;
    }
    if let Some(regex) = cli.regex {
        config.include = regex;
    }
    if let Some(ignore) = cli.ignore {
        config.ignore = ignore;
    }
    if !cli.addr_env.is_empty() {
        config.bindings = cli.addr_env;
    }
    if let Some(port_min) = cli.port_min {
        config.port_min = port_min;
    }
    if let Some(port_max) = cli.port_max {
        config.port_max = port_max;
    }
    if let Some(debounce) = cli.debounce {
        config.debounce = debounce;
    }
    if !cli.command.is_empty() {
        config.command = cli.command;
    }

    Ok(config)
}

async fn run(config: SupervisorConfig) -> Result<()> {
    config.validate()?;
    let command = config.command_spec()?;

    // Public listeners live for the whole run
    let allocator = Arc::new(PortAllocator::new(config.port_range()?));
    let forwarders = Arc::new(
        ForwarderRegistry::bind_all(&config.bindings, allocator)
            .await
            .context("Could not bind public ports")?,
    );
    let _accept_loops = forwarders.spawn_all();
    for forwarder in forwarders.iter() {
        info!(
            "[Forwarder] {} -> :{}",
            forwarder.env_name(),
            forwarder.source_port()
        );
    }

    let (change_tx, change_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
    let (restart_tx, restart_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);

    let watcher = ChangeWatcher::new(&config.watch_dir, config.path_filter()?)
        .with_polling(config.poll)
        .with_poll_interval(config.poll_interval);
    let _watch_thread = watcher.start(change_tx)?;

    tokio::spawn(Debouncer::new(config.debounce).run(change_rx, restart_tx.clone()));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            warn!("[Supervisor] Interrupted, stopping child...");
            shutdown.store(true, Ordering::SeqCst);
            // A full queue already guarantees a wakeup
            let _ = restart_tx.try_send(RestartSignal);
        })
        .context("Could not install Ctrl+C handler")?;
    }

    debug!("[Supervisor] Command: {}", command);
    let mut supervisor =
        Supervisor::new(SystemLifecycle, command, forwarders).with_shutdown(shutdown);

    tokio::task::spawn_blocking(move || supervisor.run(restart_rx))
        .await
        .context("Supervisor thread panicked")??;

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(e) => {
            logging::init(verbose);
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    logging::init(config.verbose);

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
