//! mediagrab - media extraction from the command line
//!
//! Thin CLI over `MediaCore`: `probe` prints metadata as JSON, `fetch`
//! downloads (optionally to audio), moves the file out of the scratch
//! directory and prints where it landed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mediagrab::registry::PublishedFile;
use mediagrab::utils::platform;
use mediagrab::{CoreSettings, MediaCore, MediaFormat, MediagrabError};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediagrab", version, about = "Probe and download media with yt-dlp")]
struct Args {
    /// JSON settings file; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print metadata and available qualities
    Probe { url: String },
    /// Download the media and print its location
    Fetch {
        url: String,
        /// Extract audio instead of keeping the video
        #[arg(long)]
        audio: bool,
        /// Where the finished file is moved
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match &args.config {
        Some(path) => CoreSettings::load(path)?,
        None => CoreSettings::default(),
    };

    check_tools_installed();

    let core = MediaCore::new(settings);
    core.purge_scratch().await;

    let outcome = match args.command {
        Command::Probe { url } => core.probe(&url).await.map(|r| to_json(&r)),
        Command::Fetch {
            url,
            audio,
            output_dir,
        } => {
            let format = if audio {
                MediaFormat::Audio
            } else {
                MediaFormat::Video
            };
            fetch(&core, &url, format, &output_dir).await
        }
    };

    match outcome {
        Ok(json) => {
            println!("{}", json?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", to_json(&e.to_response())?);
            std::process::exit(1);
        }
    }
}

async fn fetch(
    core: &MediaCore,
    url: &str,
    format: MediaFormat,
    output_dir: &Path,
) -> std::result::Result<Result<String>, MediagrabError> {
    let publication = core.fetch(url, format).await?;
    let retrieval = core.retrieve(&publication.id).await.ok_or_else(|| {
        MediagrabError::FileNotFound(core.settings().scratch_dir.join(&publication.id))
    })?;

    #[derive(Serialize)]
    struct Fetched {
        #[serde(flatten)]
        publication: mediagrab::Publication,
        path: PathBuf,
    }

    let path = match deliver(&retrieval.entry.file, output_dir).await {
        Ok(path) => path,
        Err(e) => return Ok(Err(e)),
    };
    Ok(to_json(&Fetched { publication, path }))
}

/// Move a retrieved file out of the scratch directory under its display name
async fn deliver(file: &PublishedFile, output_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut target = output_dir.join(&file.filename);
    if tokio::fs::try_exists(&target).await.unwrap_or(true) {
        // Scratch names are unique per download
        let unique = file
            .path
            .file_name()
            .unwrap_or_else(|| OsStr::new(&file.filename));
        target = output_dir.join(unique);
    }

    if tokio::fs::rename(&file.path, &target).await.is_err() {
        // Different filesystem
        tokio::fs::copy(&file.path, &target)
            .await
            .with_context(|| format!("Failed to copy download to {}", target.display()))?;
        let _ = tokio::fs::remove_file(&file.path).await;
    }

    Ok(target)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn check_tools_installed() {
    if platform::ytdlp_path().is_none() {
        eprintln!("WARNING: yt-dlp not found in common locations");
        eprintln!("Please install yt-dlp:");
        eprintln!("  pip install yt-dlp");
        eprintln!("  or: brew install yt-dlp");
    }
    if platform::ffmpeg_path().is_none() {
        eprintln!("WARNING: ffmpeg not found; audio extraction will fail");
    }
}
