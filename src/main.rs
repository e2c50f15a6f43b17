use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use insight_core::attachment::{check_selection, read_attachment};
use insight_core::chart::{format_value, table_fallback, DEFAULT_TITLE};
use insight_core::theme::{initial_theme, system_theme};
use insight_core::{
    validate_chart_data, AgentMode, ChatController, Config, ConfigThemeStore, HttpBackend,
    Message, ReadOutcome, Theme,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod app;
mod chart_view;
mod handler;
mod markdown;
mod theme;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, PointerTracking, Tui};

const DEFAULT_LOG_FILTER: &str = "insight=info,insight_core=info";
const ONE_SHOT_LOG_FILTER: &str = "insight=warn,insight_core=warn";
const LOG_FILE_NAME: &str = "insight.log";

#[derive(Parser, Debug)]
#[command(name = "insight", version)]
#[command(about = "Chat with an analytics agent from the terminal, with inline charts")]
struct Cli {
    /// Base URL of the agent backend
    #[arg(long, env = "INSIGHT_BACKEND_URL")]
    backend_url: Option<String>,

    /// Start with this theme (light or dark) instead of the stored one
    #[arg(long, value_parser = parse_theme)]
    theme: Option<Theme>,

    /// Agent behavior: general, data_analysis or visualization
    #[arg(long, value_parser = parse_agent_mode)]
    agent_mode: Option<AgentMode>,

    /// Write logs here instead of the config directory
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Path to the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Send one prompt, print the reply and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Attach a file to the one-shot prompt
    #[arg(short, long)]
    file: Option<PathBuf>,
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    Theme::from_str(s).ok_or_else(|| format!("unknown theme `{}` (expected light or dark)", s))
}

fn parse_agent_mode(s: &str) -> Result<AgentMode, String> {
    AgentMode::from_str(s).ok_or_else(|| {
        format!(
            "unknown agent mode `{}` (expected general, data_analysis or visualization)",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let one_shot = cli.prompt.is_some() || cli.file.is_some();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let log_file = match &cli.log_file {
        Some(path) => path.clone(),
        None => config_path
            .parent()
            .map(|dir| dir.join(LOG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME)),
    };
    let _guard = init_tracing(one_shot, &log_file)?;

    let mut config = match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "unreadable config, using defaults");
            Config::new()
        }
    };
    if let Some(url) = cli.backend_url {
        config.backend_url = Some(url);
    }
    if let Some(mode) = cli.agent_mode {
        config.agent_mode = Some(mode);
    }

    let backend = HttpBackend::with_timeout(config.backend_url(), config.request_timeout())?;
    info!(backend = backend.base_url(), one_shot, "starting");

    if one_shot {
        return run_once(&config, &backend, cli.prompt.unwrap_or_default(), cli.file).await;
    }

    let store = ConfigThemeStore::new(&config_path);
    let theme = cli
        .theme
        .unwrap_or_else(|| initial_theme(&store, system_theme()));
    run_tui(&config, Arc::new(backend), store, theme).await?;
    Ok(ExitCode::SUCCESS)
}

/// Logs go to a file while the TUI owns the terminal, and to stderr in
/// one-shot mode. The returned guard flushes the file writer on drop.
fn init_tracing(
    one_shot: bool,
    log_file: &Path,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    if one_shot {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(ONE_SHOT_LOG_FILTER));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    }

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| LOG_FILE_NAME.into());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

async fn run_tui(
    config: &Config,
    backend: Arc<HttpBackend>,
    store: ConfigThemeStore,
    theme: Theme,
) -> Result<()> {
    let tracking = PointerTracking::default();
    let mut app = App::new(config, backend, Box::new(store), theme, tracking.clone());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(tracking);

    let result = run_loop(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;
    info!(messages = app.chat.messages().len(), "session ended");
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        app.sync_scroll();
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

async fn run_once(
    config: &Config,
    backend: &HttpBackend,
    prompt: String,
    file: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut chat = ChatController::new(config.agent_mode.unwrap_or_default());

    if let Some(path) = file {
        let name = check_selection(&path)?;
        let ticket = chat.begin_attachment(name);
        let content = read_attachment(&path).await?;
        chat.finish_attachment(ticket, ReadOutcome::Loaded(content));
    }

    if !chat.submit(backend, &prompt).await {
        bail!("nothing to send: provide --prompt or a non-empty --file");
    }

    let Some(reply) = chat.messages().last() else {
        bail!("no reply recorded");
    };
    Ok(print_reply(reply))
}

fn print_reply(reply: &Message) -> ExitCode {
    if reply.is_error {
        eprintln!("{} {}", "Error:".red().bold(), reply.text.as_deref().unwrap_or_default());
        if let Some(details) = &reply.error_details {
            eprintln!(
                "{}",
                serde_json::to_string_pretty(details).unwrap_or_default().dimmed()
            );
        }
        return ExitCode::FAILURE;
    }

    if let Some(text) = reply.text.as_deref().filter(|t| !t.trim().is_empty()) {
        println!("{}", text);
    }

    if let Some(payload) = &reply.chart_payload {
        match validate_chart_data(payload) {
            Ok(chart) => {
                let title = chart.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string());
                let table = table_fallback(&chart, title);
                println!();
                println!("{} ({} chart)", table.title.bold(), chart.kind.as_str());
                let width = table.rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
                for (label, value) in &table.rows {
                    println!("  {:<width$}  {}", label, value.cyan(), width = width);
                }
                let total: f64 = chart.values.iter().sum();
                println!("  {:<width$}  {}", "total", format_value(total), width = width);
            }
            Err(e) => {
                eprintln!("{} chart data could not be displayed: {}", "Warning:".yellow(), e);
            }
        }
    }

    ExitCode::SUCCESS
}
