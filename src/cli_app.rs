//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Color, Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use nagios_lcd::core::config::Config;
use nagios_lcd::core::errors::NlcdError;
use nagios_lcd::daemon::loop_main::{CycleOutcome, Orchestrator};
use nagios_lcd::daemon::signals::SignalHandler;
use nagios_lcd::display::driver::{DeviceNodeFactory, TextColor};
use nagios_lcd::display::images::{FlashReport, flash_all};
use nagios_lcd::display::session::DeviceSession;
use nagios_lcd::display::severity::SeverityClassifier;
use nagios_lcd::display::sync::DisplaySynchronizer;
use nagios_lcd::logger::sink::{ActivityLog, DiagnosticSink};
use nagios_lcd::source::registry::build_source;

/// nagios-lcd: Nagios/Icinga problems on a USB LCD panel.
#[derive(Debug, Parser)]
#[command(
    name = "nagios-lcd",
    author,
    version,
    about = "Mirror Nagios/Icinga problems onto a USB LCD panel",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (no diagnostics on stderr).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the display daemon.
    Run(RunArgs),
    /// Fetch once and print what the panel would show.
    Check(CheckArgs),
    /// Upload icon and splash bitmaps to the panel's flash.
    FlashImages(FlashImagesArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Show version.
    Version,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Status backend (`http`, `database`, `jsonfile`); overrides `lcd.protocol`.
    #[arg(short, long, value_name = "NAME")]
    protocol: Option<String>,
    /// Draw one poll and exit instead of looping.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct CheckArgs {
    /// Status backend; overrides `lcd.protocol`.
    #[arg(short, long, value_name = "NAME")]
    protocol: Option<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct FlashImagesArgs {
    /// Read and verify the bitmaps without opening the panel.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad configuration or arguments.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<NlcdError> for CliError {
    fn from(err: NlcdError) -> Self {
        match err {
            NlcdError::InvalidConfig { .. }
            | NlcdError::MissingConfig { .. }
            | NlcdError::ConfigParse { .. }
            | NlcdError::UnknownSource { .. } => Self::User(err.to_string()),
            NlcdError::ContractViolation { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_daemon(cli, args),
        Command::Check(args) => run_check(cli, args),
        Command::FlashImages(args) => run_flash_images(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version => emit_version(cli),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn activity_log(cli: &Cli, config: &Config) -> Arc<dyn DiagnosticSink> {
    Arc::new(ActivityLog::from_config(
        &config.logging,
        cli.verbose,
        cli.quiet,
    ))
}

fn resolve_protocol(config: &Config, flag: Option<&str>) -> String {
    flag.map_or_else(|| config.lcd.protocol.clone(), str::to_string)
}

// ──────────────────── run ────────────────────

fn run_daemon(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let protocol = resolve_protocol(&config, args.protocol.as_deref());
    let sink = activity_log(cli, &config);
    let source = build_source(&config, &protocol)?;
    let factory = DeviceNodeFactory::new(config.lcd.device_path.clone());
    let session = DeviceSession::from_config(&config, Box::new(factory), Arc::clone(&sink));

    if args.once {
        let mut orchestrator = Orchestrator::new(
            config,
            args.protocol.clone(),
            source,
            session,
            sink,
            SignalHandler::unregistered(),
        );
        let outcome = orchestrator.run_once()?;
        return emit_once(cli, orchestrator.source_name(), outcome);
    }

    let mut orchestrator = Orchestrator::new(
        config,
        args.protocol.clone(),
        source,
        session,
        sink,
        SignalHandler::new(),
    );
    let stats = orchestrator.run()?;
    if output_mode(cli) == OutputMode::Json {
        write_json_line(&json!({
            "command": "run",
            "cycles": stats.cycles,
            "skipped": stats.skipped,
            "reattaches": stats.reattaches,
            "attach_attempts": stats.attach_attempts,
        }))?;
    }
    Ok(())
}

fn emit_once(cli: &Cli, source: &str, outcome: CycleOutcome) -> Result<(), CliError> {
    let CycleOutcome::Rendered {
        problems,
        suppressed,
        commands,
    } = outcome
    else {
        return Err(CliError::Internal(format!(
            "single poll ended as {outcome:?}"
        )));
    };
    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "Drew {problems} problem(s) from {source} ({suppressed} suppressed, {commands} render command(s))."
            );
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "run",
                "once": true,
                "source": source,
                "problems": problems,
                "suppressed": suppressed,
                "commands": commands,
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── check ────────────────────

fn run_check(cli: &Cli, args: &CheckArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let protocol = resolve_protocol(&config, args.protocol.as_deref());
    let mut source = build_source(&config, &protocol)?;
    let document = source.fetch()?;
    let parsed = source.parse(&document);

    let classifier = SeverityClassifier::new(config.display.critical_class);
    let ordered = DisplaySynchronizer::new(classifier).order(&parsed.problems);
    let hidden = parsed.problems.len() - ordered.len();

    match output_mode(cli) {
        OutputMode::Human => {
            if ordered.is_empty() {
                println!(
                    "{} (splash: {:?})",
                    "No problems.".green(),
                    config.display.splash_text
                );
            }
            for (line, problem) in ordered.iter().enumerate() {
                let style = classifier.style_for(problem.state());
                let state = format!("{:<11}", problem.state().as_str())
                    .color(terminal_color(style.color));
                println!(
                    " {line} [{}] {state} {}",
                    classifier.severity_rank(problem.state()),
                    problem.description()
                );
            }
            if hidden > 0 {
                println!("  {hidden} more problem(s) do not fit on the panel");
            }
            println!(
                "Source: {} ({} record(s), {} suppressed, {} defaulted field(s))",
                source.name(),
                document.len(),
                parsed.suppressed,
                parsed.degraded.len()
            );
            for issue in &parsed.degraded {
                eprintln!("  {issue}");
            }
        }
        OutputMode::Json => {
            let problems: Vec<Value> = ordered
                .iter()
                .enumerate()
                .map(|(line, problem)| {
                    json!({
                        "line": line,
                        "state": problem.state().as_str(),
                        "rank": classifier.severity_rank(problem.state()),
                        "description": problem.description(),
                    })
                })
                .collect();
            let degraded: Vec<String> = parsed.degraded.iter().map(ToString::to_string).collect();
            write_json_line(&json!({
                "command": "check",
                "source": source.name(),
                "records": document.len(),
                "suppressed": parsed.suppressed,
                "problems": problems,
                "hidden": hidden,
                "degraded": degraded,
            }))?;
        }
    }
    Ok(())
}

const fn terminal_color(color: TextColor) -> Color {
    match color {
        TextColor::White => Color::White,
        TextColor::Black => Color::Black,
        TextColor::Red => Color::Red,
        TextColor::Green => Color::Green,
        TextColor::Yellow => Color::Yellow,
        TextColor::Purple => Color::Magenta,
        TextColor::Cyan => Color::Cyan,
    }
}

// ──────────────────── flash-images ────────────────────

fn run_flash_images(cli: &Cli, args: &FlashImagesArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let sink = activity_log(cli, &config);
    let base = image_base_dir(&config.config_file)?;

    let reports = if args.dry_run {
        flash_all(None, &config.images, &base, sink.as_ref())?
    } else {
        let factory = DeviceNodeFactory::new(config.lcd.device_path.clone());
        let mut session =
            DeviceSession::from_config(&config, Box::new(factory), Arc::clone(&sink));
        session.attach()?;
        let flashed = flash_all(Some(&mut session), &config.images, &base, sink.as_ref());
        session.detach();
        flashed?
    };

    match output_mode(cli) {
        OutputMode::Human => {
            for report in &reports {
                print_flash_report(report);
            }
            let verb = if args.dry_run { "Verified" } else { "Flashed" };
            println!("{verb} {} image(s).", reports.len());
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "flash-images",
                "dry_run": args.dry_run,
                "images": serde_json::to_value(&reports)?,
            }))?;
        }
    }
    Ok(())
}

fn print_flash_report(report: &FlashReport) {
    println!(
        "  {:<8} slot {:>#6x}  {:>7} bytes  {}  {}",
        report.name,
        report.slot,
        report.bytes,
        &report.sha256[..12.min(report.sha256.len())],
        report.path.display()
    );
}

/// Relative image directories resolve against the config file's directory.
fn image_base_dir(config_file: &Path) -> Result<PathBuf, CliError> {
    match config_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => std::env::current_dir()
            .map_err(|e| CliError::Runtime(format!("resolve working directory: {e}"))),
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.config_file.display());
                        println!("  Protocol: {}", config.lcd.protocol);
                        println!("  Device: {}", config.lcd.resolved_device_path().display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.config_file.to_string_lossy(),
                            "protocol": config.lcd.protocol,
                            "device": config.lcd.resolved_device_path().to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error_code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn emit_version(cli: &Cli) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    match output_mode(cli) {
        OutputMode::Human => println!("nagios-lcd {version}"),
        OutputMode::Json => {
            write_json_line(&json!({
                "binary": "nagios-lcd",
                "version": version,
                "package": env!("CARGO_PKG_NAME"),
                "features": {
                    "sqlite": cfg!(feature = "sqlite"),
                },
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("NLCD_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_wins_over_env() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
    }

    #[test]
    fn env_selects_mode_and_tty_is_the_fallback() {
        assert_eq!(
            resolve_output_mode(false, Some(" JSON "), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, Some("auto"), true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn run_accepts_protocol_override() {
        let cli = Cli::try_parse_from(["nagios-lcd", "run", "-p", "jsonfile", "--once"]).unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.protocol.as_deref(), Some("jsonfile"));
                assert!(args.once);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["nagios-lcd", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn config_errors_map_to_user_exit_code() {
        let err = CliError::from(NlcdError::UnknownSource {
            name: "ftp".to_string(),
        });
        assert_eq!(err.exit_code(), 1);
        let err = CliError::from(NlcdError::DeviceUnavailable {
            index: 0,
            details: "missing".to_string(),
        });
        assert_eq!(err.exit_code(), 2);
        let err = CliError::from(NlcdError::ContractViolation {
            details: "bad line".to_string(),
        });
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn protocol_flag_overrides_config() {
        let config = Config::default();
        assert_eq!(resolve_protocol(&config, None), "http");
        assert_eq!(resolve_protocol(&config, Some("database")), "database");
    }
}
