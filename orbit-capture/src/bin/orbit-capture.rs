use clap::Parser;
use eyre::{Context, Result};
use orbit_capture::{load_capture_data, CaptureSession, Config};
use producer_side::ProducerSideServer;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::sleep;
use std::time::{Duration, Instant};

static LONG_VERSION: OnceLock<String> = OnceLock::new();

fn get_long_version() -> &'static str {
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} (commit: {}, protocol: {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_REVISION", "unknown"),
            protocol::VERSION
        )
    })
}

#[derive(Parser)]
#[command(name = "orbit-capture")]
#[command(about = "record events from instrumented processes into an orbit capture file")]
#[command(version = None, long_version = get_long_version())]
struct Args {
    #[arg(help = "configuration file path (toml format)")]
    config: PathBuf,

    #[arg(
        short,
        long,
        default_value = "capture.orbit",
        help = "output capture file"
    )]
    output: PathBuf,

    #[arg(
        short,
        long,
        value_parser = humantime::parse_duration,
        help = "duration of the capture (e.g. 10s, 5m, 1h)"
    )]
    duration: Option<Duration>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config path={}", args.config.display()))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received ctrl+c, stopping the capture...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut server = ProducerSideServer::build_and_start(config.server.server_config()?)
        .wrap_err("failed to start the producer-side server")?;
    tracing::info!(address = %server.address(), "producer-side server listening");

    let session = CaptureSession::start(&server, &config.capture, &args.output)?;

    let start_time = Instant::now();
    let duration = args.duration;
    while running.load(Ordering::SeqCst) && duration.is_none_or(|d| start_time.elapsed() < d) {
        sleep(Duration::from_millis(100));
    }

    let summary = session.stop(&server)?;
    server.shutdown_and_wait()?;

    let never_cancel = AtomicBool::new(false);
    if let Some(data) = load_capture_data(&summary.output_path, &never_cancel)? {
        tracing::info!(
            threads = data.thread_names.len(),
            timers = data.timers.len(),
            frames = data.frame_track_timers().count(),
            callstack_samples = data.callstack_events.len(),
            thread_state_slices = data.thread_state_slices.len(),
            warnings = data.warnings.len(),
            "capture contents"
        );
    }

    tracing::info!(
        output = %summary.output_path.display(),
        events = summary.events_processed,
        all_events_sent = summary.all_events_sent,
        "capture complete"
    );
    Ok(())
}
