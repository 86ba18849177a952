use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use framefetch::cycle::{CycleOptions, FrameCycle, FrameSink};
use framefetch::decode::session::ImageDownloader;
use framefetch::{DriverContext, Engine, EngineConfig, EventLoop, LocalTokioLoop, Transport, TransportRegistry};
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn, Level};

fn build_cli(registry: &TransportRegistry) -> Command {
    let cmd = Command::new("framefetch")
        .about("Fetch an image from a URL over and over and show each frame")
        .arg(Arg::new("url").help("Image service URL").required(true).num_args(1))
        .arg(
            Arg::new("extra")
                .help("Ignored")
                .hide(true)
                .action(ArgAction::Append)
                .num_args(0..),
        )
        .arg(
            Arg::new("delay")
                .short('d')
                .long("delay")
                .help("Milliseconds to wait after a frame before fetching the next")
                .value_parser(value_parser!(u64))
                .default_value("1"),
        )
        .arg(
            Arg::new("retry_delay")
                .long("retry-delay")
                .help("Milliseconds to wait after a failed fetch")
                .value_parser(value_parser!(u64))
                .default_value("10000"),
        )
        .arg(
            Arg::new("startup_delay")
                .long("startup-delay")
                .help("Milliseconds to wait before the first fetch")
                .value_parser(value_parser!(u64))
                .default_value("5000"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .help("Download worker threads")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("chunk_kb")
                .long("chunk-kb")
                .help("Chunk size in KiB")
                .value_parser(value_parser!(usize))
                .default_value("128"),
        )
        .arg(
            Arg::new("poll_ms")
                .long("poll-ms")
                .help("How often finished chunks are picked up, in milliseconds")
                .value_parser(value_parser!(u64))
                .default_value("100"),
        )
        .arg(
            Arg::new("save")
                .long("save")
                .help("Write each frame to this path (format from the extension)")
                .value_parser(value_parser!(PathBuf))
                .num_args(1),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .help("Stop after this many frames")
                .value_parser(value_parser!(u64))
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logging; repeat for more")
                .action(ArgAction::Count),
        );

    registry.augment_command(cmd)
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn millis(m: &ArgMatches, id: &str) -> Duration {
    Duration::from_millis(m.get_one::<u64>(id).copied().unwrap_or_default())
}

/// Logs each frame and optionally writes it to disk.
struct Presenter {
    save: Option<PathBuf>,
    bar: ProgressBar,
    shown: u64,
}

impl FrameSink for Presenter {
    fn present(&mut self, frame: DynamicImage) {
        self.shown += 1;
        self.bar.set_message(format!("frame {} ({}x{})", self.shown, frame.width(), frame.height()));
        info!(frame = self.shown, width = frame.width(), height = frame.height(), "frame shown");
        if let Some(path) = &self.save {
            if let Err(e) = frame.save(path) {
                warn!(path = %path.display(), error = %e, "can't save frame");
            }
        }
    }
}

async fn run(
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    options: CycleOptions,
    save: Option<PathBuf>,
) -> anyhow::Result<()> {
    let event_loop: Rc<dyn EventLoop> = Rc::new(LocalTokioLoop);
    let engine = Engine::start(config, transport, event_loop.clone()).context("can't start download engine")?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {bytes}/{total_bytes} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("|/-\\ "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let downloader = ImageDownloader::new(engine.clone()).on_progress({
        let bar = bar.clone();
        move |chunk| {
            if let Some(total) = chunk.bytes_expected {
                bar.set_length(total);
            }
            bar.set_position(chunk.bytes_loaded);
        }
    });
    let presenter = Presenter { save, bar: bar.clone(), shown: 0 };
    let cycle = FrameCycle::new(downloader, event_loop, options, Box::new(presenter));
    let finished = Rc::new(Notify::new());
    cycle.on_done({
        let finished = finished.clone();
        move || finished.notify_one()
    });
    cycle.start();
    finished.notified().await;

    bar.finish_and_clear();
    info!(frames = cycle.frames_shown(), failures = cycle.failures(), "finished");
    engine.shutdown();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let registry = TransportRegistry::cli_only();
    let matches = build_cli(&registry).get_matches();
    init_logging(matches.get_count("verbose"));

    for extra in matches.get_many::<String>("extra").into_iter().flatten() {
        eprintln!("warning: extra argument ignored: {:?}", extra);
    }

    let mut ctx = DriverContext::default();
    registry.apply_matches(&matches, &mut ctx)?;

    let url = matches.get_one::<String>("url").context("missing URL")?.clone();
    let chunk_kb = matches.get_one::<usize>("chunk_kb").copied().unwrap_or(128);
    let config = EngineConfig::default()
        .with_workers(matches.get_one::<usize>("workers").copied().unwrap_or(1))
        .with_chunk_capacity(chunk_kb.saturating_mul(1024))
        .with_poll_interval(millis(&matches, "poll_ms"));

    let mut options = CycleOptions::new(url);
    options.delay = millis(&matches, "delay");
    options.retry_delay = millis(&matches, "retry_delay");
    options.startup_delay = millis(&matches, "startup_delay");
    options.max_frames = matches.get_one::<u64>("count").copied();
    let save = matches.get_one::<PathBuf>("save").cloned();

    // The blocking HTTP client has to be created and dropped outside the
    // runtime, so the drivers live out here.
    let transport: Arc<dyn Transport> = Arc::new(TransportRegistry::with_defaults(&ctx));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("can't build the event loop")?;
    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&runtime, run(config, transport.clone(), options, save));
    drop(local);
    drop(runtime);
    drop(transport);
    result
}
