//! # Bold Motion
//!
//! Runs the 8 ms motion loop against a CM730 (or the simulated bus) with a
//! ~30 Hz decision loop on the main thread feeding the scheduler.
//!
//! `--ping` and `--query-static` talk to the bus directly and exit without
//! starting the loop.

use bold_cm730::{BulkRead, Cm730, LinkRegistry, SerialLink};
use bold_common::config::{ConfigError, LogLevel, RobotConfig};
use bold_common::consts::{CM730_ID, DECISION_PERIOD_MS, DEFAULT_CONFIG_PATH};
use bold_common::hardware::config::LinkKind;
use bold_common::joint::JointId;
use bold_motion::cycle::StepTimer;
use bold_motion::module::HeadSweep;
use bold_motion::state::StaticHardwareState;
use bold_motion::{
    ModuleRegistry, MotionLoop, MotionRequest, ObserverThread, Priority, Scheduler,
    SectionRequest, StateStore,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Bold Motion - humanoid motion loop and task scheduler
#[derive(Parser, Debug)]
#[command(name = "bold_motion")]
#[command(version)]
#[command(about = "8 ms CM730/MX28 motion loop with per-section task scheduling")]
struct Args {
    /// Robot configuration TOML.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the simulated bus instead of the configured link.
    #[arg(long)]
    simulate: bool,

    /// Stop after this many motion cycles.
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Print the static hardware state as JSON and exit.
    #[arg(long, conflicts_with = "ping")]
    query_static: bool,

    /// Ping every device on the bus and exit.
    #[arg(long)]
    ping: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(&args);
    let level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    info!("Bold Motion v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Bold Motion shutdown complete");
}

fn load_config(args: &Args) -> Result<RobotConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => RobotConfig::load_validated(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            RobotConfig::load_validated(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => RobotConfig::default(),
    };
    if args.simulate {
        config.hardware.driver = LinkKind::Simulation;
    }
    Ok(config)
}

fn open_link(config: &RobotConfig) -> Result<Box<dyn SerialLink>, Box<dyn std::error::Error>> {
    let registry = LinkRegistry::with_defaults();
    let link = registry.create(config.hardware.driver.name(), &config.hardware)?;
    info!(
        link = link.name(),
        baud = link.baud_rate(),
        device = %config.hardware.device_path,
        "link open"
    );
    Ok(link)
}

fn run(args: &Args, config: RobotConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        service = %config.shared.service_name,
        driver = config.hardware.driver.name(),
        period_ms = config.motion.period_ms,
        "Config OK"
    );

    if args.ping || args.query_static {
        let mut cm = Cm730::new(open_link(&config)?);
        cm.connect()?;
        let result = if args.ping {
            ping_all(&mut cm);
            Ok(())
        } else {
            query_static(&mut cm)
        };
        cm.disconnect();
        return result;
    }

    // Fall back to running without a body if the link cannot be opened.
    let link = match open_link(&config) {
        Ok(link) => Some(link),
        Err(e) => {
            warn!(error = %e, "could not open link, running without a body");
            None
        }
    };

    let store = Arc::new(StateStore::new());
    let scheduler = Scheduler::new(Arc::clone(&store));
    let mut modules = ModuleRegistry::new();
    let sweep = modules.register(
        "head-sweep",
        Box::new(HeadSweep::new(45.0, 500).with_tilt(-10.0)),
    );
    scheduler.register_module(&sweep);

    let mut motion = MotionLoop::new(&config, link, modules, Arc::clone(&store));

    let escalation = config.motion.failure_escalation;
    let failed = Arc::new(AtomicBool::new(false));
    let f = failed.clone();
    motion.set_failure_callback(move |count| {
        if count >= escalation && !f.swap(true, Ordering::AcqRel) {
            error!(count, "too many consecutive read failures");
        }
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    motion.start()?;
    info!("motion loop running, entering decision loop");

    let period = Duration::from_millis(DECISION_PERIOD_MS);
    let mut request: Option<MotionRequest> = None;
    while running.load(Ordering::SeqCst) && !failed.load(Ordering::Acquire) {
        if args.cycles.is_some_and(|n| motion.cycle_count() >= n) {
            info!(cycles = motion.cycle_count(), "cycle limit reached");
            break;
        }

        let outstanding = request.as_ref().is_some_and(|r| !r.has_completed());
        if !outstanding {
            request = Some(scheduler.request(
                &sweep,
                SectionRequest::new(Priority::Normal),
                SectionRequest::NONE,
                SectionRequest::NONE,
            ));
        }
        scheduler.update();

        let mut timer = StepTimer::new();
        store.callback_observers(ObserverThread::Decision, &mut timer);
        thread::sleep(period);
    }

    motion.stop()?;
    if failed.load(Ordering::Acquire) {
        return Err(format!("{escalation} consecutive bulk read failures, giving up").into());
    }
    Ok(())
}

fn ping_all(cm: &mut Cm730) {
    let ids = std::iter::once(CM730_ID).chain(JointId::all().map(JointId::id));
    let mut missing = 0;
    for id in ids {
        match cm.ping(id) {
            Ok(alarm) if alarm.has_error() => warn!(id, alarm = %alarm, "responded with alarm"),
            Ok(_) => info!(id, "responded"),
            Err(e) => {
                missing += 1;
                warn!(id, error = %e, "no response");
            }
        }
    }
    info!(missing, "ping complete");
}

fn query_static(cm: &mut Cm730) -> Result<(), Box<dyn std::error::Error>> {
    let mut read = BulkRead::static_state();
    cm.bulk_read(&mut read)?;
    let state = StaticHardwareState::from_bulk_read(&read)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        directive
            .parse()
            .unwrap_or_else(|_| tracing::Level::INFO.into()),
    );

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
