use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use netsentry_core::bridge::MemoryBackend;
use netsentry_core::system_log::FetchOutcome;
use netsentry_core::{Backend, Config, Session};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

use netsentry_manager::http_bridge::HttpBridge;
use netsentry_manager::logging;
use netsentry_manager::monitor_tui::{Tab, TuiDashboard};

#[derive(Parser)]
#[command(name = "netsentry")]
#[command(about = "NetSentry - network monitoring and log analysis console")]
#[command(version = "0.1.0")]
#[command(propagate_version = true)]
struct Cli {
    /// Backend URL (overrides the config file)
    #[arg(short = 'b', long = "backend", global = true)]
    backend: Option<String>,

    /// Use the built-in demo backend instead of a remote one
    #[arg(long = "demo", global = true)]
    demo: bool,

    /// Config file (defaults to ~/.netsentry/config.toml)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the terminal UI on the traffic dashboard
    Dashboard,

    /// Open the terminal UI on the log browser
    Logs,

    /// Open the terminal UI on the system log page
    System,

    /// Print capture status, log count and recent alerts
    Status,

    /// Ask the backend to collect system logs and wait for the job to finish
    Collect,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config path
        #[arg(long = "init")]
        init: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(url) = cli.backend {
        config.backend_url = url;
    }

    match cli.command.unwrap_or(Commands::Dashboard) {
        Commands::Dashboard => run_tui(config, cli.demo, Tab::Dashboard),
        Commands::Logs => run_tui(config, cli.demo, Tab::Logs),
        Commands::System => run_tui(config, cli.demo, Tab::System),
        Commands::Status => run_status(config, cli.demo),
        Commands::Collect => run_collect(config, cli.demo),
        Commands::Config { init } => show_config(&config, cli.config, init),
    }
}

/// Build the backend; must run inside the tokio runtime so the HTTP signal
/// pump can be spawned
fn connect(config: &Config, demo: bool) -> Result<Arc<dyn Backend>> {
    if demo {
        return Ok(Arc::new(MemoryBackend::demo()));
    }
    let bridge = Arc::new(
        HttpBridge::new(&config.backend_url)
            .with_context(|| format!("connecting to {}", config.backend_url))?,
    );
    bridge.start_signal_pump(config.signal_poll_interval());
    Ok(bridge)
}

fn run_tui(config: Config, demo: bool, tab: Tab) -> Result<()> {
    // The UI owns the terminal, so logs go to a file
    if let Some(path) = config.log_path() {
        logging::init_file(&path)?;
    }

    let runtime = Runtime::new().context("starting tokio runtime")?;
    let _guard = runtime.enter();

    let backend = connect(&config, demo)?;
    tracing::info!("starting terminal UI against '{}'", backend.name());
    let session = Arc::new(Session::new(backend, config));
    runtime.block_on(session.start());

    TuiDashboard::run(session, runtime.handle().clone(), tab)
}

fn run_status(config: Config, demo: bool) -> Result<()> {
    logging::init_stderr()?;
    let runtime = Runtime::new().context("starting tokio runtime")?;
    let _guard = runtime.enter();

    let session = Session::new(connect(&config, demo)?, config);
    runtime.block_on(session.start());
    let state = session.dashboard.state();

    println!("{} {}", "Backend:".cyan().bold(), session.bridge.backend_name());
    if !state.online {
        println!("  {} {}", "Status:".dimmed(), "OFFLINE".red().bold());
        if let Some(message) = session.notifier.last_message() {
            println!("  {} {}", "Last error:".dimmed(), message);
        }
        return Ok(());
    }
    println!("  {} {}", "Status:".dimmed(), "ONLINE".green().bold());
    println!("  {} {}", "Logged packets:".dimmed(), state.log_count);
    println!(
        "  {} {}",
        "Alert sound:".dimmed(),
        match state.sound_enabled {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        }
    );

    println!();
    println!("{} ({})", "Recent alerts".cyan().bold(), state.alerts.len());
    for alert in &state.alerts {
        let severity = match alert.severity.as_str() {
            "critical" | "high" => alert.severity.red().bold(),
            "medium" => alert.severity.yellow(),
            _ => alert.severity.normal(),
        };
        println!(
            "  {} {:<8} {:<20} {:<15} {}",
            alert.time.dimmed(),
            severity,
            alert.alert_type,
            alert.source_ip,
            alert.description
        );
    }

    session.shutdown();
    Ok(())
}

fn run_collect(config: Config, demo: bool) -> Result<()> {
    logging::init_stderr()?;
    let runtime = Runtime::new().context("starting tokio runtime")?;
    let _guard = runtime.enter();

    let stall = config.notifications.job_stall();
    let session = Session::new(connect(&config, demo)?, config);
    runtime.block_on(async {
        session.notifier.ensure_progress_handler(&session.signals);
        let outcome = session.system_log.fetch_system_logs().await;
        let message = session.notifier.last_message().unwrap_or_default();
        if outcome != FetchOutcome::Started {
            anyhow::bail!("{}", message);
        }
        println!("{}", marker_line("->".cyan(), &message));

        session
            .system_log
            .wait_for_completion(stall, |overlay| {
                println!(
                    "  {:>3}% {}",
                    overlay.percentage,
                    overlay.detail.clone().unwrap_or_default().dimmed()
                );
            })
            .await?;
        if let Some(message) = session.notifier.last_message() {
            println!("{}", marker_line("✓".green(), &message));
        }
        Ok(())
    })
}

fn show_config(config: &Config, path: Option<PathBuf>, init: bool) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("serializing config")?;

    if init {
        let path = path
            .or_else(Config::default_path)
            .context("no home directory for the default config path")?;
        config.save(&path)?;
        println!(
            "{}",
            marker_line("✓".green(), &format!("Wrote {}", path.display()))
        );
        return Ok(());
    }

    if let Some(path) = path.or_else(Config::default_path) {
        println!("{} {}", "#".dimmed(), path.display().to_string().dimmed());
    }
    println!("{}", rendered);
    Ok(())
}

/// `marker message`, as printed by the plain-text commands
fn marker_line(marker: ColoredString, message: &str) -> String {
    format!("{} {}", marker, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_line_keeps_visible_marker() {
        colored::control::set_override(false);
        assert_eq!(
            marker_line("✓".green(), "Process completed successfully"),
            "✓ Process completed successfully"
        );
        assert_eq!(marker_line("->".cyan(), "started"), "-> started");
    }

    #[test]
    fn test_cli_parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["netsentry", "collect", "--demo"]).unwrap();
        assert!(cli.demo);
        assert!(matches!(cli.command, Some(Commands::Collect)));
    }
}
