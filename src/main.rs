mod assembly;
mod config;
mod error;
mod media;
mod openai;
mod pipeline;
mod store;
mod ui;
mod upload;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::assembly::ClipPool;
use crate::config::{AssemblyMode, Config};
use crate::media::FfmpegTool;
use crate::openai::OpenAiClient;
use crate::pipeline::Pipeline;
use crate::store::EpisodeStore;
use crate::ui::prelude::*;
use crate::upload::{UPLOAD_LOG_FILE, UploadLog, YouTubeHost};

/// Shortsmith main parser
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode (verbose external tool output)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit machine-readable JSON events
    #[arg(long, global = true)]
    json: bool,

    /// Use an alternate configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Produce one new episode end to end
    Generate,
    /// Complete missing stages across all existing episodes
    Repair,
    /// Publish finished episodes that have not been uploaded yet
    Upload,
    /// Check external tools, credentials and the clip pool
    Doctor,
}

fn main() {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    ui::init(format, true);
    ui::set_debug_mode(cli.debug);

    if let Err(e) = run(&cli) {
        emit(
            Level::Error,
            "shortsmith.error",
            &format!("Error: {e:#}"),
            None,
        );
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Generate => handle_generate(&config),
        Commands::Repair => handle_repair(&config),
        Commands::Upload => handle_upload(&config),
        Commands::Doctor => handle_doctor(&config),
    }
}

fn handle_generate(config: &Config) -> Result<()> {
    let store = EpisodeStore::open(&config.output_dir)?;
    let client = OpenAiClient::new(&config.openai, &config.show)?;
    let media = FfmpegTool::new();
    let pipeline = Pipeline::new(config, &store, &client, &client, &client, &media);

    let key = pipeline.generate()?;
    emit(
        Level::Success,
        "generate.done",
        &format!("Completed: {key}"),
        None,
    );
    Ok(())
}

fn handle_repair(config: &Config) -> Result<()> {
    let store = EpisodeStore::open(&config.output_dir)?;
    let client = OpenAiClient::new(&config.openai, &config.show)?;
    let media = FfmpegTool::new();
    let pipeline = Pipeline::new(config, &store, &client, &client, &client, &media);

    let summary = pipeline.repair()?;
    emit(
        Level::Info,
        "repair.done",
        &format!(
            "Repaired {}, skipped {}, untouched {}, failed {}",
            summary.repaired, summary.skipped, summary.untouched, summary.failed
        ),
        None,
    );
    if summary.failed > 0 {
        anyhow::bail!("{} episode(s) failed to repair", summary.failed);
    }
    Ok(())
}

fn handle_upload(config: &Config) -> Result<()> {
    let store = EpisodeStore::open(&config.output_dir)?;
    let token = config.upload.resolved_access_token().context(
        "YouTube access token not found. Set it in the config file or the YOUTUBE_ACCESS_TOKEN environment variable",
    )?;
    let host = YouTubeHost::new(token);
    let mut log = UploadLog::load(store.root().join(UPLOAD_LOG_FILE))?;

    let summary = upload::publish_pending(config, &store, &mut log, &host)?;
    emit(
        Level::Success,
        "upload.done",
        &format!(
            "Uploaded {}, already published {}, missing video {}",
            summary.uploaded, summary.already_published, summary.missing_video
        ),
        None,
    );
    Ok(())
}

fn handle_doctor(config: &Config) -> Result<()> {
    let mut healthy = true;

    for tool in ["ffmpeg", "ffprobe"] {
        match which::which(tool) {
            Ok(path) => emit(
                Level::Success,
                "doctor.tool",
                &format!("{tool}: {}", path.display()),
                None,
            ),
            Err(_) => {
                healthy = false;
                emit(
                    Level::Error,
                    "doctor.tool",
                    &format!("{tool}: not found in PATH"),
                    None,
                );
            }
        }
    }

    if config.openai.resolved_api_key().is_some() {
        emit(
            Level::Success,
            "doctor.openai",
            "OpenAI API key configured",
            None,
        );
    } else {
        healthy = false;
        emit(
            Level::Error,
            "doctor.openai",
            "OpenAI API key missing (config or OPENAI_API_KEY)",
            None,
        );
    }

    if config.upload.resolved_access_token().is_some() {
        emit(
            Level::Success,
            "doctor.upload",
            "YouTube access token configured",
            None,
        );
    } else {
        emit(
            Level::Warn,
            "doctor.upload",
            "YouTube access token missing; upload will not work",
            None,
        );
    }

    let pool = ClipPool::scan(&config.clips_dir)?;
    if pool.is_empty() {
        if config.assembly == AssemblyMode::ClipLibrary {
            healthy = false;
            emit(
                Level::Error,
                "doctor.clips",
                &format!("No clips in {}", config.clips_dir.display()),
                None,
            );
        } else {
            emit(
                Level::Info,
                "doctor.clips",
                "Clip pool empty (unused by the still-image strategy)",
                None,
            );
        }
    } else {
        emit(
            Level::Success,
            "doctor.clips",
            &format!("{} clips in {}", pool.len(), config.clips_dir.display()),
            None,
        );
    }

    if !healthy {
        anyhow::bail!("some checks failed");
    }
    Ok(())
}
