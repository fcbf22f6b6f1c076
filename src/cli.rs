use crate::{
    config::Config,
    describe::{self, Describer},
    engine::{ffmpeg::FfmpegEngine, MediaEngine},
    pipeline::Pipeline,
    report::ReportFormat,
    scenes::{self, DetectParams},
    service::{Fetched, Service, SubmitOptions, SubmitOutcome, Upload},
    tracker::JobSnapshot,
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "storyboard")]
#[command(about = "Video storyboard orchestrator (scene detection + frame grabs + vision descriptions)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./storyboard.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check external tools and vision service configuration.
    Doctor {},
    /// Run scene boundary detection only and print the boundaries.
    Detect {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        max_scenes: Option<u32>,
    },
    /// Build a storyboard for one video.
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "markdown")]
        format: ReportFormat,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        max_scenes: Option<u32>,
        /// Queue the job and poll for progress instead of blocking on it.
        #[arg(long = "async")]
        async_mode: bool,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Queue several videos at once and wait for all of them.
    Batch {
        #[arg(long, required = true)]
        input: Vec<PathBuf>,
        #[arg(long, default_value = "markdown")]
        format: ReportFormat,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        max_scenes: Option<u32>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            doctor(&cfg)
        }
        Command::Detect {
            input,
            threshold,
            max_scenes,
        } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            detect(&cfg, input, *threshold, *max_scenes)
        }
        Command::Analyze {
            input,
            format,
            threshold,
            max_scenes,
            async_mode,
            out_dir,
        } => {
            if let Some(dir) = out_dir {
                cfg.paths.output_dir = dir.display().to_string();
            }
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            let opts = SubmitOptions {
                scene_threshold: *threshold,
                max_scenes: *max_scenes,
                async_mode: *async_mode,
                format: *format,
            };
            analyze(&cfg, input, &opts)
        }
        Command::Batch {
            input,
            format,
            threshold,
            max_scenes,
            out_dir,
        } => {
            if let Some(dir) = out_dir {
                cfg.paths.output_dir = dir.display().to_string();
            }
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            let opts = SubmitOptions {
                scene_threshold: *threshold,
                max_scenes: *max_scenes,
                async_mode: true,
                format: *format,
            };
            batch(&cfg, input, &opts)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("storyboard.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("storyboard.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.output_dir).join("storyboard.log"))
}

fn build_service(cfg: &Config) -> Result<Service<FfmpegEngine, Box<dyn Describer>>> {
    let engine = FfmpegEngine::new(&cfg.tools);
    let describer = describe::from_config(&cfg.vision).context("configuring vision service")?;
    info!("using describer: {}", describer.name());
    Service::new(cfg, Pipeline::new(cfg, engine, describer))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = FfmpegEngine::new(&cfg.tools);
    let tools = engine.doctor()?;
    let vision = match describe::from_config(&cfg.vision) {
        Ok(d) => serde_json::json!({ "status": "operational", "describer": d.name() }),
        Err(err) => serde_json::json!({ "status": "unavailable", "error": err.to_string() }),
    };
    let healthy = tools.ok && vision["status"] == "operational";
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "tools": tools,
            "vision": vision,
            "output_dir": cfg.paths.output_dir,
        }))?
    );
    Ok(())
}

fn detect(cfg: &Config, input: &Path, threshold: Option<f64>, max_scenes: Option<u32>) -> Result<()> {
    let engine = FfmpegEngine::new(&cfg.tools);
    let params = DetectParams {
        threshold: threshold.unwrap_or(cfg.detection.scene_threshold),
        max_scenes: max_scenes.unwrap_or(cfg.detection.max_scenes),
        min_scenes: cfg.detection.min_scenes,
    };
    let duration = engine
        .probe_duration(input)
        .with_context(|| format!("probing {}", input.display()))?;
    let boundaries = scenes::detect(&engine, input, duration, &params)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "duration": duration,
            "params": params,
            "boundaries": boundaries,
            "scenes": boundaries.scenes(),
        }))?
    );
    Ok(())
}

fn analyze(cfg: &Config, input: &Path, opts: &SubmitOptions) -> Result<()> {
    let service = build_service(cfg)?;
    let outcome = service.submit(Upload::from_path(input), opts, &cfg.global.client_label)?;

    let (id, report) = match outcome {
        SubmitOutcome::Completed { request_id, report } => (request_id, report),
        SubmitOutcome::Accepted(accepted) => {
            println!("{}", serde_json::to_string(&accepted)?);
            let id = accepted.request_id;
            wait_for(&service, std::slice::from_ref(&id))?;
            let report = service.fetch(&id)?;
            (id, report)
        }
    };
    print_report(cfg, &id, &report)
}

fn batch(cfg: &Config, inputs: &[PathBuf], opts: &SubmitOptions) -> Result<()> {
    let service = build_service(cfg)?;
    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        match service.submit(Upload::from_path(input), opts, &cfg.global.client_label) {
            Ok(outcome) => {
                info!("queued {} as {}", input.display(), outcome.request_id());
                ids.push(outcome.request_id().to_string());
            }
            Err(err) => warn!("rejected {}: {err:#}", input.display()),
        }
    }

    let finals = wait_for(&service, &ids)?;
    let summary: Vec<serde_json::Value> = finals
        .iter()
        .map(|snap| {
            let report = match service.fetch(&snap.id) {
                Ok(Fetched::Markdown { path, .. }) => serde_json::json!(path),
                Ok(Fetched::Json(_)) => serde_json::json!(Path::new(&cfg.paths.output_dir)
                    .join(&snap.id)
                    .join(&cfg.output.json_filename)),
                Err(_) => serde_json::Value::Null,
            };
            serde_json::json!({
                "request_id": snap.id,
                "status": snap.status,
                "progress": snap.progress,
                "error": snap.error,
                "report": report,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Polls until every id is terminal, printing log lines as they appear.
fn wait_for<E, D>(service: &Service<E, D>, ids: &[String]) -> Result<Vec<JobSnapshot>>
where
    E: MediaEngine + 'static,
    D: Describer + 'static,
{
    let mut seen = vec![0usize; ids.len()];
    loop {
        let mut snaps = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let snap = service.poll(id)?;
            let fresh = (snap.total_logs - seen[i]).min(snap.logs.len());
            for entry in &snap.logs[snap.logs.len() - fresh..] {
                eprintln!("[{id}] {:>3}% {:?} {}", snap.progress, entry.level, entry.message);
            }
            seen[i] = snap.total_logs;
            snaps.push(snap);
        }
        if snaps.iter().all(|s| s.status.is_terminal()) {
            return Ok(snaps);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn print_report(cfg: &Config, id: &str, report: &Fetched) -> Result<()> {
    match report {
        Fetched::Markdown { path, .. } => {
            if cfg.global.print_summary {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "request_id": id,
                        "report": path,
                        "status": "completed",
                    }))?
                );
            }
        }
        Fetched::Json(body) => println!("{}", serde_json::to_string_pretty(body)?),
    }
    Ok(())
}
