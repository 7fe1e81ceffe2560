use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod app;
mod ask;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use deepsearch_core::ai::OllamaClient;
use deepsearch_core::{Config, Dispatcher, Provider};
use logging::LogFormat;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "deepsearch")]
#[command(about = "Search the web, then stream a reasoned answer that cites its sources", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Generation provider: fireworks, openai, or ollama
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model identifier (defaults to the provider's reasoning model)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Search endpoint accepting {query, previousQueries}
    #[arg(long, global = true)]
    search_endpoint: Option<String>,

    /// Config file (default: <config dir>/deepsearch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log file format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question without the interactive UI
    Ask {
        /// Your question
        query: String,
    },
    /// List the models available for each provider
    Models,
}

/// Fold command-line flags into the loaded config. Flags win over the file.
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(name) = &cli.provider {
        let Some(provider) = Provider::from_str(name) else {
            bail!("Unknown provider '{}' (expected fireworks, openai, or ollama)", name);
        };
        if provider != config.provider() {
            // A model saved for another provider would not resolve here
            config.default_model = None;
        }
        config.provider = Some(provider.as_str().to_string());
    }
    if let Some(model) = &cli.model {
        config.default_model = Some(model.clone());
    }
    if let Some(endpoint) = &cli.search_endpoint {
        config.search.backend = Some("endpoint".to_string());
        config.search.endpoint = Some(endpoint.clone());
    }
    Ok(())
}

fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    Dispatcher::from_config(config).with_context(|| {
        format!(
            "Could not set up {} (set {} or choose another --provider)",
            config.provider().display_name(),
            config.provider().api_key_env().unwrap_or("its API key"),
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };
    let mut config = Config::load_from(&config_path)?;
    apply_overrides(&mut config, &cli)?;

    let log_path = logging::init(cli.log_format, config.log_level.as_deref())?;
    info!(
        log = %log_path.display(),
        provider = config.provider().as_str(),
        model = %config.model(),
        search = config.search_backend().as_str(),
        "deepsearch starting"
    );

    match cli.command {
        Some(Commands::Ask { query }) => {
            let dispatcher = build_dispatcher(&config)?;
            ask::run(dispatcher, &query).await
        }
        Some(Commands::Models) => list_models(&config).await,
        None => run_tui(config, config_path).await,
    }
}

async fn run_tui(config: Config, config_path: PathBuf) -> Result<()> {
    // Fail before taking over the terminal so the error stays readable
    let dispatcher = build_dispatcher(&config)?;
    let mut app = App::new(dispatcher.clone(), config, config_path);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(dispatcher.subscribe());

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!("deepsearch exiting");
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    for provider in Provider::all() {
        let marker = if provider == config.provider() { "*" } else { " " };
        println!("{} {}", marker, provider.display_name());

        let models = match provider {
            Provider::Ollama => {
                let ollama = OllamaClient::new(&config.ollama_url(), provider.default_model(), String::new());
                match ollama.list_models().await {
                    Ok(models) => models,
                    Err(e) => {
                        println!("    (unavailable: {}. Make sure Ollama is running: ollama serve)", e);
                        continue;
                    }
                }
            }
            hosted => hosted.hosted_models(),
        };

        let key_note = match config.key_source(provider) {
            Some(source) => source,
            None => "needs key",
        };
        for model in models {
            println!("    {} ({})", model, key_note);
        }
    }
    Ok(())
}
