use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui_pilot::core::NullTextExtractor;
use ui_pilot::{
    ActionRequest, ChromeEnvironment, Collaborators, Config, Environment, FeedbackController,
    Frame, ListingAdvancer, ScriptedPolicy, UiDetector,
};
use url::Url;

#[derive(Parser)]
#[command(name = "ui-pilot", version, about = "Screenshot-driven UI detection and scripted browser runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect UI elements in a screenshot and print them as JSON
    Detect {
        image: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay a JSON action script against a Chrome tab
    Run {
        #[arg(long)]
        start_url: Url,
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        max_applications: Option<u32>,
        #[arg(long)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Detect { image, config } => detect(&image, config.as_deref()),
        Command::Run {
            start_url,
            script,
            config,
            max_applications,
            headless,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(max) = max_applications {
                config.session.max_applications = max;
            }
            if headless {
                config.browser.headless = true;
            }
            config.validate()?;
            run(config, &start_url, &script).await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn detect(image: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let frame = Frame::open(image)?;
    let elements = UiDetector::new(config.detector).detect(&frame);
    info!(count = elements.len(), image = %image.display(), "detection finished");
    println!("{}", serde_json::to_string_pretty(&elements)?);
    Ok(())
}

async fn run(mut config: Config, start_url: &Url, script: &Path) -> anyhow::Result<()> {
    let requests: Vec<ActionRequest> = serde_json::from_str(&std::fs::read_to_string(script)?)?;
    if config.session.max_cycles.is_none() {
        config.session.max_cycles = Some((requests.len() as u64 * 2).max(1));
    }
    let policy = ScriptedPolicy::from_requests(requests)?;
    info!(steps = policy.remaining(), "script loaded");

    let chrome = Arc::new(ChromeEnvironment::launch(
        &config.browser,
        config.session.page_load_timeout_ms,
    )?);
    chrome.navigate_to(start_url).await?;

    let advancer = ListingAdvancer::new(
        chrome.tab(),
        config.advancer.clone(),
        chrome.page_load_timeout(),
    );
    let parts = Collaborators {
        frames: chrome.clone(),
        text: Arc::new(NullTextExtractor),
        policy: Arc::new(policy),
        environment: chrome,
        advancer: Arc::new(advancer),
    };

    let report = FeedbackController::new(parts, &config)?.run().await;
    if !report.completed() {
        warn!(termination = ?report.termination, "run did not complete");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
