use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use deskpilot::coder::CodeAgent;
use deskpilot::config::{self, Platform};
use deskpilot::engine::engine::EngineParts;
use deskpilot::engine::history::SessionHistory;
use deskpilot::engine::Engine;
use deskpilot::errors::{DeskPilotError, DeskPilotResult};
use deskpilot::ground::{Grounder, GroundingBackend};
use deskpilot::input::NullBackend;
use deskpilot::llm::providers::{create_provider, LocalGroundingClient};
use deskpilot::reflector::Reflector;
use deskpilot::screen::ocr::NullLocator;
use deskpilot::screen::{FileSource, ScreenSource, SolidColorSource};
use deskpilot::worker::Worker;

/// Drives a desktop GUI from a natural-language instruction.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The natural-language task instruction.
    instruction: String,

    /// Planning model provider: openai | anthropic.
    #[arg(long)]
    provider: Option<String>,

    /// Planning model name.
    #[arg(long)]
    model: Option<String>,

    /// Grounding provider: openai | anthropic | local.
    #[arg(long = "ground_provider", alias = "ground-provider")]
    ground_provider: Option<String>,

    /// Grounding model name (for openai/anthropic grounding).
    #[arg(long = "ground_model", alias = "ground-model")]
    ground_model: Option<String>,

    /// Base URL of the local grounding server.
    #[arg(long = "ground_url", alias = "ground-url")]
    ground_url: Option<String>,

    /// Grounding canvas width the grounding model answers in.
    #[arg(long = "grounding_width", alias = "grounding-width")]
    grounding_width: Option<u32>,

    /// Grounding canvas height the grounding model answers in.
    #[arg(long = "grounding_height", alias = "grounding-height")]
    grounding_height: Option<u32>,

    /// Step budget before the task is abandoned.
    #[arg(long = "max_steps", alias = "max-steps")]
    max_steps: Option<u32>,

    /// Platform recipe for Open/SwitchApplications: darwin | linux | windows.
    #[arg(long)]
    platform: Option<String>,

    /// Run against a synthetic screen with the logging input backend; no OS
    /// adapters are touched.
    #[arg(long = "dry_run", alias = "dry-run")]
    dry_run: bool,

    /// Serve screenshots from a PNG file instead of the synthetic screen.
    /// Implies the logging input backend, like --dry-run.
    #[arg(long)]
    screenshot: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "run finished");
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "unrecoverable error");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> DeskPilotResult<deskpilot::TaskOutcome> {
    let mut config = config::load_config()?;

    // CLI flags override file values.
    if let Some(provider) = cli.provider {
        config.llm.provider = provider;
    }
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(provider) = cli.ground_provider {
        config.grounding.provider = provider;
    }
    if let Some(model) = cli.ground_model {
        config.grounding.model = model;
    }
    if let Some(url) = cli.ground_url {
        config.grounding.url = url;
    }
    if let Some(width) = cli.grounding_width {
        config.grounding.width = width;
    }
    if let Some(height) = cli.grounding_height {
        config.grounding.height = height;
    }
    if let Some(max_steps) = cli.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(platform) = cli.platform.as_deref() {
        config.agent.platform = Platform::parse(platform)?;
    }

    let planner = create_provider(&config.llm.provider, &config.llm.model)?;

    let grounding_backend = match config.grounding.provider.as_str() {
        "local" => {
            let client = LocalGroundingClient::new(config.grounding.url.clone());
            match client.health().await {
                Ok(health) => {
                    tracing::info!(status = %health.status, model = %health.model, "grounding server is up")
                }
                Err(e) => {
                    tracing::warn!(url = %config.grounding.url, error = %e, "grounding server health check failed")
                }
            }
            GroundingBackend::Local(client)
        }
        name => GroundingBackend::Model(create_provider(name, &config.grounding.model)?),
    };

    let coder = CodeAgent::new(planner.clone(), &config.coder);
    let grounder = Grounder::new(
        grounding_backend,
        planner.clone(),
        Arc::new(NullLocator),
        coder,
        config.agent.platform,
        &config.agent,
    );

    let worker = Worker::new(
        planner.clone(),
        &cli.instruction,
        &config.agent,
        config.llm.temperature,
        config.llm.max_tokens,
    );
    let reflector = Reflector::new(planner, &cli.instruction, &config.agent);

    // OS capture and input synthesis live behind the ScreenSource and
    // InputBackend traits; the shipped binary only drives the dry-run
    // doubles, so an explicit opt-in is required.
    let screen: Box<dyn ScreenSource> = match (&cli.screenshot, cli.dry_run) {
        (Some(path), _) => Box::new(FileSource::new(path.clone())),
        (None, true) => Box::new(SolidColorSource::new(1920, 1080)),
        (None, false) => {
            return Err(DeskPilotError::Config(
                "no screen capture adapter is wired in; pass --dry-run for a synthetic \
                 screen or --screenshot <path> to serve frames from a PNG file"
                    .into(),
            ))
        }
    };

    let mut engine = Engine::new(EngineParts {
        screen,
        backend: Box::new(NullBackend),
        worker,
        reflector,
        grounder,
        history: SessionHistory::new(config.agent.log_dir.clone()),
        instruction: cli.instruction,
        max_steps: config.agent.max_steps,
        settle_seconds: config.agent.settle_seconds,
        max_capture_retries: config.agent.max_capture_retries,
        canvas_width: config.grounding.width,
        canvas_height: config.grounding.height,
    });

    engine.run().await
}
