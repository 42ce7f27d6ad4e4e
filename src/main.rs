//! # Main Entry Point
//!
//! Wires the layers together for an interactive session:
//! - Domain: configuration
//! - Infrastructure: logging, LLM client
//! - Application: wrapper controller
//! - Interface: CLI flags, scene, console loop

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use steward::application::controller::WrapperController;
use steward::application::execution::ConfirmationGate;
use steward::application::safety::WorkingRoot;
use steward::domain::config::AppConfig;
use steward::infrastructure::llm::Client as LlmClient;
use steward::infrastructure::logging;
use steward::interface::cli::Cli;
use steward::interface::console::{self, Console};
use steward::interface::scene::{self, SCENES_DIR};
use steward::strings::messages;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load Configuration
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    // 2. Logging Setup
    let _guard = logging::init(&config.logging, cli.verbose)?;
    tracing::info!("Starting steward...");

    // 3. Working root
    let root = working_root(config.safety.working_root.as_deref())?;
    tracing::info!("Working root: {}", root.path().display());

    // 4. Model gateway
    let llm = Arc::new(LlmClient::new(&config));
    let agent = config.wrapper.default_agent.clone();
    let gateway = llm.gateway(&agent).with_context(|| {
        format!("Cannot use agent '{}' (available: {})", agent, llm.agent_names().join(", "))
    })?;

    // 5. Scene
    let scene = match &cli.scene {
        Some(spec) => Some(scene::load(spec, Path::new(SCENES_DIR))?),
        None => None,
    };
    let scene_context = scene.as_ref().map(|s| s.context.clone()).unwrap_or_default();

    // 6. Controller
    let mut controller =
        WrapperController::from_config(Arc::new(gateway), &config, root, scene_context)?;

    let mut console = Console::new(io::stdout(), config.execution.max_output_chars);
    if config.wrapper.dry_run {
        console.note("dry run: actions are simulated, nothing is executed")?;
    }
    if let ConfirmationGate::Timed(_) = controller.settings().gate {
        console.note(messages::CANCEL_HINT)?;
    }

    match &scene {
        Some(scene) => {
            console.note(&format!("scene: {}", scene.name))?;
            match controller.opening_message().await {
                Ok(line) => console.say(&line)?,
                Err(e) => {
                    tracing::warn!("No opening line: {}", e);
                    console.say(messages::DEFAULT_GREETING)?;
                }
            }
        }
        None => console.say(messages::DEFAULT_GREETING)?,
    }

    // 7. Session
    console.run(&mut controller, console::spawn_stdin_reader()).await?;
    io::stdout().flush()?;

    tracing::info!("Session ended");
    Ok(())
}

fn working_root(configured: Option<&str>) -> Result<WorkingRoot> {
    let Some(raw) = configured.map(str::trim).filter(|s| !s.is_empty()) else {
        return WorkingRoot::current_dir().context("Failed to read the current directory");
    };

    let path = match raw.strip_prefix("~") {
        Some(rest) => {
            let home = dirs::home_dir().context("Cannot expand '~': no home directory")?;
            home.join(rest.trim_start_matches('/'))
        }
        None => PathBuf::from(raw),
    };
    if !path.is_dir() {
        bail!("Working root {} is not a directory", path.display());
    }
    Ok(WorkingRoot::new(path))
}
