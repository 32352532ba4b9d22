use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use buildstack_menu::api::{Collaborators, HttpApi};
use buildstack_menu::config::{MenuConfig, Overrides};
use buildstack_menu::extensions::builtin_extensions;
use buildstack_menu::menu::{ConfirmOutcome, Session, ValidationResult};
use buildstack_menu::settings::BuildSettings;
use buildstack_menu::ui::{self, Outcome};
use buildstack_menu::{Error, Result};

const LOG_ENV: &str = "BUILDSTACK_LOG";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    common: Common,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Args)]
struct Common {
    /// Menu configuration TOML
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Build settings file (selection and per-unit options)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Build API address (overrides API_ADDR)
    #[arg(long, global = true)]
    api_addr: Option<String>,
    /// Write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    /// Draw with plain ASCII
    #[arg(long, global = true)]
    ascii: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive unit picker (default)
    Menu,
    /// Print the catalog with each unit's discovered hooks
    Catalog,
    /// Validate a selection without building
    Check {
        /// Comma-separated unit ids (defaults to the saved selection)
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// Check, then request a build
    Build {
        /// Comma-separated unit ids (defaults to the saved selection)
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
}

fn install_subscriber<W>(filter: EnvFilter, writer: W, json: bool, ansi: bool)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .init();
    }
}

/// The menu owns the terminal, so interactive runs only log to a file.
fn init_tracing(common: &Common, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    match &common.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::msg(format!("failed to open log file {}: {e}", path.display())))?;
            install_subscriber(filter, Mutex::new(file), common.log_json, false);
        }
        None if interactive => {}
        None => install_subscriber(filter, std::io::stderr, common.log_json, true),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.cmd.unwrap_or(Command::Menu);
    dotenv::dotenv().ok();
    init_tracing(&cli.common, matches!(cmd, Command::Menu))?;

    let overrides = Overrides {
        api_addr: cli.common.api_addr.clone(),
        settings_path: cli.common.settings.clone(),
        ascii: cli.common.ascii,
    };
    let cfg = MenuConfig::resolve(cli.common.config.as_deref(), &overrides)?;
    let settings = BuildSettings::load(&cfg.settings_path())?;
    let api = HttpApi::new(&cfg.api.addr, cfg.api.timeout_secs)?;
    let collab = Collaborators::from_api(&api);
    tracing::debug!(addr = %cfg.api.addr, settings = %cfg.settings_path().display(), "configuration resolved");

    match cmd {
        Command::Menu => cmd_menu(collab, settings, &cfg),
        Command::Catalog => cmd_catalog(collab, settings),
        Command::Check { select } => cmd_check(collab, settings, &select),
        Command::Build { select } => cmd_build(collab, settings, &select),
    }
}

fn cmd_menu(collab: Collaborators<'_>, settings: BuildSettings, cfg: &MenuConfig) -> Result<()> {
    match ui::run_tui(collab, settings, cfg)? {
        Outcome::BuildRequested(receipt) => match receipt.build_id {
            Some(id) => println!("Build requested: {id}"),
            None => println!("Build requested."),
        },
        Outcome::Cancelled => println!("Cancelled."),
    }
    Ok(())
}

fn load_session(collab: Collaborators<'_>, settings: BuildSettings) -> Result<Session> {
    let session = Session::load(collab.catalog, settings, builtin_extensions);
    if let Some(e) = session.catalog_error() {
        return Err(Error::load(e.to_string()));
    }
    for w in session.warnings() {
        eprintln!("warning: {w}");
    }
    Ok(session)
}

/// Make the session's selection exactly `ids` (in that order). An empty
/// list keeps the saved selection.
fn select_exactly(session: &mut Session, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    for id in session.registry().selected_ids().to_vec() {
        session.toggle(&id)?;
    }
    for id in ids {
        let id = id.trim();
        if id.is_empty() || session.registry().find(id).is_some_and(|i| i.checked) {
            continue;
        }
        session.toggle(id)?;
    }
    Ok(())
}

fn print_result(result: &ValidationResult) {
    if result.issues.is_empty() {
        println!("All checks passed for: {}", result.selection.join(", "));
        return;
    }
    println!("{} issue(s):", result.issues.len());
    for i in &result.issues {
        println!("  {:<20} {:<16} {}", i.unit_id, i.issue_type, i.message);
    }
}

fn cmd_catalog(collab: Collaborators<'_>, settings: BuildSettings) -> Result<()> {
    let session = load_session(collab, settings)?;
    for item in session.registry().items() {
        let caps = session
            .capabilities()
            .get(&item.unit_id)
            .map(|c| c.names().join(","))
            .unwrap_or_default();
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        println!(
            "{} {:<20} {:<24} {:<40} {}",
            if item.checked { "*" } else { " " },
            item.unit_id,
            item.display_label,
            if caps.is_empty() { "-".to_string() } else { caps },
            tags.join(",")
        );
    }
    Ok(())
}

fn cmd_check(collab: Collaborators<'_>, settings: BuildSettings, select: &[String]) -> Result<()> {
    let mut session = load_session(collab, settings)?;
    select_exactly(&mut session, select)?;
    match session.confirm(&collab) {
        ConfirmOutcome::EmptySelection => Err(Error::user_input("nothing selected (use --select)")),
        ConfirmOutcome::Checked(r) => {
            print_result(&r);
            if r.overall_pass {
                Ok(())
            } else {
                Err(Error::msg(format!("{} issue(s) found", r.issues.len())))
            }
        }
        ConfirmOutcome::CheckFailed(e) => Err(e),
        other => Err(Error::msg(format!("unexpected check outcome: {other:?}"))),
    }
}

fn cmd_build(collab: Collaborators<'_>, settings: BuildSettings, select: &[String]) -> Result<()> {
    let mut session = load_session(collab, settings)?;
    select_exactly(&mut session, select)?;
    match session.confirm(&collab) {
        ConfirmOutcome::Checked(r) => print_result(&r),
        ConfirmOutcome::EmptySelection => {
            return Err(Error::user_input("nothing selected (use --select)"));
        }
        ConfirmOutcome::CheckFailed(e) => return Err(e),
        other => return Err(Error::msg(format!("unexpected check outcome: {other:?}"))),
    }
    match session.confirm(&collab) {
        ConfirmOutcome::BuildRequested(receipt) => {
            match receipt.build_id {
                Some(id) => println!("Build requested: {id}"),
                None => println!("Build requested."),
            }
            for w in session.warnings() {
                eprintln!("warning: {w}");
            }
            Ok(())
        }
        ConfirmOutcome::BuildDeclined { unit_id, reason } => Err(Error::build_service(format!(
            "build stopped by '{unit_id}': {reason}"
        ))),
        ConfirmOutcome::BuildFailed(e) => Err(e),
        other => Err(Error::msg(format!("unexpected build outcome: {other:?}"))),
    }
}
