//! fxforge - describe an audio effect, get a built JUCE plugin
//!
//! Drives a language model through schema rendering, template filling and
//! full generation, pushes the result to a GitHub repository and follows
//! the CI build until artifacts are ready or the retry budget runs out.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fxforge_adapters::config::Settings;
use fxforge_adapters::github::GitHubClient;
use fxforge_adapters::llm::OpenRouterClient;
use fxforge_core::screen::screen_fragment;
use fxforge_core::{verify, Catalog, Phase, PluginCategory, TaskStatus};
use fxforge_engine::{MachineConfig, ModelRouter, Ports, TaskMachine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const STATUS_POLL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(
    name = "fxforge",
    about = "Generate JUCE audio plugins from a description",
    long_about = "F X F O R G E\n\n\
                  Turns a plain-language effect description into JUCE source,\n\
                  pushes it to GitHub and repairs it until CI builds it.",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate, push and build a plugin
    Generate {
        /// What the plugin should do, e.g. "warm tube distortion"
        prompt: String,
    },
    /// Check a DSP fragment against the identifier catalog (offline)
    Verify {
        /// File holding the fragment
        file: PathBuf,
        /// Catalog category to check against
        #[arg(long, short)]
        category: PluginCategory,
        /// Print the corrected fragment when corrections were applied
        #[arg(long)]
        print_corrected: bool,
    },
    /// Print the identifier context the model sees for a category
    Catalog {
        /// Category name (gain, waveshaper, filter, delay, generic)
        category: PluginCategory,
    },
    /// Show the settings file location and any configuration problems
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FXFORGE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Generate { prompt } => generate(prompt).await,
        Command::Verify {
            file,
            category,
            print_corrected,
        } => verify_file(&file, category, print_corrected),
        Command::Catalog { category } => {
            let catalog = Catalog::builtin()?;
            println!("{}", catalog.context_prompt(category));
            Ok(())
        }
        Command::Config => show_config(),
    }
}

async fn generate(prompt: String) -> Result<()> {
    let settings = Settings::load()?;
    settings.ensure_valid()?;
    tracing::debug!(?settings, "settings loaded");

    let primary = OpenRouterClient::from_settings(&settings, &settings.primary_model)?;
    let mut router = ModelRouter::new(Arc::new(primary));
    if let Some(model) = settings.fallback_model.as_deref() {
        router = router.with_fallback(Arc::new(OpenRouterClient::from_settings(&settings, model)?));
    }
    let github = Arc::new(GitHubClient::from_settings(&settings)?);

    let ports = Ports {
        router: Arc::new(router),
        repo: github.clone(),
        ci: github,
        catalog: Arc::new(Catalog::builtin()?),
    };
    let machine = Arc::new(TaskMachine::new(
        ports,
        &MachineConfig::from_settings(&settings),
    ));

    let id = machine.submit(prompt);
    eprintln!("  task {}", id);
    let handle = machine.spawn(id);

    let mut last: Option<(Phase, u32)> = None;
    while !handle.is_finished() {
        if let Some(status) = machine.registry().snapshot(id) {
            report_progress(&status, &mut last);
        }
        tokio::time::sleep(STATUS_POLL).await;
    }

    let status = handle.await.context("Task worker panicked")??;
    report_progress(&status, &mut last);
    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.phase == Phase::Failed {
        bail!(
            "generation failed: {}",
            status.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn report_progress(status: &TaskStatus, last: &mut Option<(Phase, u32)>) {
    let current = (status.phase, status.retry_count);
    if *last == Some(current) {
        return;
    }
    if status.retry_count > 0 {
        eprintln!(
            "  {} (repair {}/{})",
            status.phase, status.retry_count, status.max_retries
        );
    } else {
        eprintln!("  {}", status.phase);
    }
    if let (Phase::Building, Some(url)) = (status.phase, status.run_url.as_deref()) {
        eprintln!("    {}", url);
    }
    *last = Some(current);
}

fn verify_file(path: &Path, category: PluginCategory, print_corrected: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let catalog = Catalog::builtin()?;
    let result = verify::verify(&catalog, &text, category);

    for correction in &result.corrections_applied {
        eprintln!("  + corrected {}", correction);
    }
    for error in &result.errors {
        eprintln!("  ! {}", error);
    }
    if let Err(err) = screen_fragment(result.effective_text(&text)) {
        eprintln!("  ! {}", err);
        bail!("fragment rejected by screening");
    }
    if print_corrected {
        if let Some(corrected) = &result.corrected_text {
            println!("{}", corrected);
        }
    }
    if !result.valid {
        bail!("{} undeclared identifier(s)", result.errors.len());
    }
    eprintln!("  + {} fragment verified", category);
    Ok(())
}

fn show_config() -> Result<()> {
    let settings = Settings::load()?;
    println!("config: {}", Settings::config_location());
    println!("{:#?}", settings);
    let problems = settings.validate();
    if problems.is_empty() {
        println!("ok");
    } else {
        for problem in problems {
            println!("  ! {}", problem);
        }
    }
    Ok(())
}
