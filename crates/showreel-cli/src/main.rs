//! showreel CLI - screenshots and demo recordings from the command line
//!
//! Usage:
//!   showreel screenshot <url>       Capture a clean screenshot
//!   showreel record <url> --name n  Record a short narrated video
//!   showreel doctor                 Check browser, ffmpeg and configuration
//!   showreel init                   Write a default .showreel/config.toml

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use showreel_browser::{
    locate_browser, setup_e2e_test, E2eContext, FfmpegEncoder, RecordingOptions,
    ScreenshotOptions, SetupOptions, TitleCardOptions,
};
use showreel_core::E2eConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "showreel")]
#[command(author, version, about = "Human-like browser driving and demo recording")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding .showreel/config.toml
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a screenshot of a page
    Screenshot {
        /// Absolute URL or path under the base URL
        url: String,

        /// Artifact name
        #[arg(long, default_value = "screenshot")]
        name: String,

        /// Capture the whole scrollable page
        #[arg(long)]
        full_page: bool,

        /// Keep overlays and annotations in the image
        #[arg(long)]
        annotations: bool,
    },

    /// Record a page with an optional title card
    Record {
        /// Absolute URL or path under the base URL
        url: String,

        /// Recording name
        #[arg(long)]
        name: String,

        /// Title card shown at the start
        #[arg(long)]
        title: Option<String>,

        /// Second line of the title card
        #[arg(long, requires = "title")]
        subtitle: Option<String>,

        /// How long the title card and the page are held, in milliseconds
        #[arg(long, default_value = "2000")]
        hold_ms: u64,
    },

    /// Show resolved configuration and check external tools
    Doctor,

    /// Write a default configuration file
    Init {
        /// Project path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Screenshot {
            url,
            name,
            full_page,
            annotations,
        } => cmd_screenshot(&cli.root, &url, &name, full_page, annotations).await,
        Commands::Record {
            url,
            name,
            title,
            subtitle,
            hold_ms,
        } => {
            let hold = Duration::from_millis(hold_ms);
            cmd_record(&cli.root, &url, &name, title, subtitle, hold).await
        }
        Commands::Doctor => cmd_doctor(&cli.root).await,
        Commands::Init { path } => cmd_init(&path),
    }
}

fn load_config(root: &Path) -> Result<E2eConfig> {
    E2eConfig::load(root)
        .with_context(|| format!("Failed to load configuration under {}", root.display()))
}

async fn launch(root: &Path) -> Result<E2eContext> {
    let config = load_config(root)?;
    setup_e2e_test(SetupOptions {
        config: Some(config),
    })
    .await
    .context("Failed to launch the browser")
}

/// Tear the context down whatever the command's outcome was
async fn finish(ctx: E2eContext, outcome: Result<()>) -> Result<()> {
    if let Err(e) = ctx.teardown().await {
        warn!("Teardown failed: {}", e);
    }
    outcome
}

async fn cmd_screenshot(
    root: &Path,
    url: &str,
    name: &str,
    full_page: bool,
    annotations: bool,
) -> Result<()> {
    let ctx = launch(root).await?;
    let outcome = screenshot(&ctx, url, name, full_page, annotations).await;
    finish(ctx, outcome).await
}

async fn screenshot(
    ctx: &E2eContext,
    url: &str,
    name: &str,
    full_page: bool,
    annotations: bool,
) -> Result<()> {
    ctx.navigate(url)
        .await
        .with_context(|| format!("Failed to open {}", url))?;
    if let Err(e) = ctx.wait_for_network_idle(None).await {
        warn!("Page did not settle: {}", e);
    }

    let artifact = ctx
        .take_screenshot(
            name,
            ScreenshotOptions {
                full_page,
                show_annotations: annotations,
            },
        )
        .await
        .context("Failed to capture screenshot")?;

    println!("Screenshot: {}", artifact.path.display());
    if let Some(latest) = artifact.latest_path {
        println!("Latest:     {}", latest.display());
    }
    Ok(())
}

async fn cmd_record(
    root: &Path,
    url: &str,
    name: &str,
    title: Option<String>,
    subtitle: Option<String>,
    hold: Duration,
) -> Result<()> {
    let ctx = launch(root).await?;
    let outcome = record(&ctx, url, name, title.as_deref(), subtitle.as_deref(), hold).await;
    finish(ctx, outcome).await
}

async fn record(
    ctx: &E2eContext,
    url: &str,
    name: &str,
    title: Option<&str>,
    subtitle: Option<&str>,
    hold: Duration,
) -> Result<()> {
    ctx.navigate(url)
        .await
        .with_context(|| format!("Failed to open {}", url))?;

    let recording = ctx
        .start_recording(name, RecordingOptions::default())
        .await
        .context("Failed to start recording")?;

    if let Some(title) = title {
        let options = TitleCardOptions {
            show_for: Some(hold),
            pause: hold,
            animate: true,
        };
        recording
            .show_title_card(title, subtitle, options)
            .await?;
        recording.clear_subtitle().await?;
    }
    recording.pause(hold).await?;

    match recording.stop().await? {
        Some(video) => {
            println!(
                "Video: {} ({} bytes)",
                video.video_path.display(),
                video.file_size
            );
        }
        None => warn!("No video was produced; see the log above"),
    }
    Ok(())
}

async fn cmd_doctor(root: &Path) -> Result<()> {
    let config = load_config(root)?;

    println!("Configuration ({}):", E2eConfig::config_path(root).display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();

    match locate_browser(config.executable_path.as_deref()) {
        Some(path) => println!("Browser: {}", path.display()),
        None => println!("Browser: not found (set PUPPETEER_EXECUTABLE_PATH)"),
    }

    if FfmpegEncoder::default().is_available().await {
        println!("ffmpeg:  available");
    } else {
        println!("ffmpeg:  not found on PATH (recordings will not be encoded)");
    }
    Ok(())
}

fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing showreel in {:?}", path);

    let config_path = E2eConfig::config_path(path);
    if config_path.exists() {
        println!("Configuration already exists: {}", config_path.display());
        return Ok(());
    }

    let written = E2eConfig::write_default(path).context("Failed to write configuration")?;
    println!("Wrote {}", written.display());
    Ok(())
}
