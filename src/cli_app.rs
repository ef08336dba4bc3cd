//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use warehouse_maintenance::core::config::Config;
use warehouse_maintenance::core::errors::WhmError;
use warehouse_maintenance::daemon::signals::SignalHandler;
use warehouse_maintenance::device::front_panel::FrontPanelState;
use warehouse_maintenance::scanner::audit::{AuditResult, PatternStatus};
use warehouse_maintenance::service::events::{ChannelEventSink, EventSink, NullEventSink, RESET_DONE};
use warehouse_maintenance::service::warehouse::{Response, Warehouse};

/// Warehouse maintenance for set-top devices.
#[derive(Debug, Parser)]
#[command(
    name = "whm",
    author,
    version,
    about = "Warehouse device maintenance: resets, clean checks, front panel",
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
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Factory-reset the device through the power manager.
    ResetDevice(ResetDeviceArgs),
    /// Print device details.
    DeviceInfo,
    /// Show a download state on the front-panel LEDs.
    FrontPanel(FrontPanelArgs),
    /// Wipe DRM and test state, then reboot (test images only).
    InternalReset(InternalResetArgs),
    /// Wipe customer data.
    LightReset(LightResetArgs),
    /// Check whether customer data is left on the device.
    IsClean(IsCleanArgs),
    /// Print a script template with placeholders resolved.
    RenderTemplate(RenderTemplateArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct ResetDeviceArgs {
    /// Keep the device running after the reset.
    #[arg(long)]
    suppress_reboot: bool,
}

#[derive(Debug, Clone, Args, Serialize)]
struct FrontPanelArgs {
    /// State code: -1 none, 1 download in progress, 3 download failed.
    #[arg(long, allow_negative_numbers = true, value_name = "CODE")]
    state: i32,
    /// Keep blinking until SIGINT/SIGTERM, then clear the LEDs.
    #[arg(long)]
    hold: bool,
}

#[derive(Debug, Clone, Args)]
struct InternalResetArgs {
    /// Confirmation phrase required for the internal reset.
    #[arg(long, value_name = "PHRASE")]
    pass_phrase: String,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct LightResetArgs {
    /// Print the resolved script without running it.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args, Serialize)]
struct IsCleanArgs {
    /// Only count objects modified more than this many seconds ago (-1: any age).
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_name = "SECONDS")]
    age: i64,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct RenderTemplateArgs {
    /// Template to resolve instead of the configured light-reset script.
    #[arg(long, value_name = "TEMPLATE")]
    template: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
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
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// The operation ran and failed.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
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

    fn from_code(code: Option<&str>, message: String) -> Self {
        match code {
            Some(code) if is_user_code(code) => Self::User(message),
            _ => Self::Runtime(message),
        }
    }
}

impl From<WhmError> for CliError {
    fn from(err: WhmError) -> Self {
        Self::from_code(Some(err.code()), err.to_string())
    }
}

/// Configuration problems and rejected parameters are the caller's to fix.
fn is_user_code(code: &str) -> bool {
    code.starts_with("WHM-1") || code == "WHM-3003"
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::ResetDevice(args) => run_reset_device(cli, args),
        Command::DeviceInfo => run_device_info(cli),
        Command::FrontPanel(args) => run_front_panel(cli, args),
        Command::InternalReset(args) => run_internal_reset(cli, args),
        Command::LightReset(args) => run_light_reset(cli, args),
        Command::IsClean(args) => run_is_clean(cli, args),
        Command::RenderTemplate(args) => run_render_template(cli, args),
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

fn open_warehouse(cli: &Cli, events: Arc<dyn EventSink>) -> Result<Warehouse, CliError> {
    let config = load_config(cli)?;
    Ok(Warehouse::from_config(config, events)?)
}

fn run_reset_device(cli: &Cli, args: &ResetDeviceArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    warn_if_not_root(mode, "reset-device");

    let (sink, events) = ChannelEventSink::new();
    let warehouse = open_warehouse(cli, Arc::new(sink))?;
    let accepted = warehouse.reset_device(args.suppress_reboot);
    if !accepted.success {
        return report_response(mode, "reset-device", &accepted);
    }

    warehouse.wait_for_reset();
    let done = events
        .try_iter()
        .find(|event| event.name == RESET_DONE)
        .ok_or_else(|| CliError::Internal(format!("reset finished without {RESET_DONE}")))?;

    let success = done.payload["success"].as_bool().unwrap_or(false);
    let error = done.payload["error"].as_str().map(str::to_string);
    match mode {
        OutputMode::Human => {
            if success {
                println!("{} factory reset completed", "ok".green().bold());
            } else {
                println!(
                    "{} factory reset: {}",
                    "failed".red().bold(),
                    error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "reset-device",
            "suppress_reboot": args.suppress_reboot,
            "event": done.name,
            "result": done.payload,
        }))?,
    }
    if success {
        Ok(())
    } else {
        Err(CliError::Runtime(
            error.unwrap_or_else(|| "factory reset failed".to_string()),
        ))
    }
}

fn run_device_info(cli: &Cli) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let warehouse = open_warehouse(cli, Arc::new(NullEventSink))?;
    let response = warehouse.get_device_info();

    match mode {
        OutputMode::Human => {
            let width = response.properties.keys().map(String::len).max().unwrap_or(0);
            for (key, value) in &response.properties {
                println!("{key:<width$}  {value}");
            }
            if let Some(error) = &response.error {
                eprintln!("whm: device details incomplete: {error}");
            }
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&response)?)?,
    }

    match response.error {
        None => Ok(()),
        Some(error) => Err(CliError::Runtime(error)),
    }
}

fn run_front_panel(cli: &Cli, args: &FrontPanelArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let warehouse = open_warehouse(cli, Arc::new(NullEventSink))?;
    let response = warehouse.set_front_panel_state(args.state);
    report_response(mode, "front-panel", &response)?;

    let Some(state) = warehouse.front_panel_state() else {
        return Ok(());
    };
    if !args.hold {
        if mode == OutputMode::Human {
            println!("note: blinking stops when whm exits; pass --hold to keep it running");
        }
        return Ok(());
    }

    if mode == OutputMode::Human {
        println!("holding {state:?} pattern; send SIGINT or SIGTERM to stop");
    }
    SignalHandler::new().wait_for_shutdown(Duration::from_millis(200));
    let cleared = warehouse.set_front_panel_state(FrontPanelState::None.code());
    if !cleared.success {
        eprintln!(
            "[WHM-CLI] failed to clear front panel: {}",
            cleared.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn run_internal_reset(cli: &Cli, args: &InternalResetArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    warn_if_not_root(mode, "internal-reset");
    let warehouse = open_warehouse(cli, Arc::new(NullEventSink))?;
    let response = warehouse.internal_reset(&args.pass_phrase);
    report_response(mode, "internal-reset", &response)
}

fn run_light_reset(cli: &Cli, args: &LightResetArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let warehouse = open_warehouse(cli, Arc::new(NullEventSink))?;

    if args.dry_run {
        let rendered = warehouse.render_light_reset()?;
        return match mode {
            OutputMode::Human => {
                println!("{}", rendered.script);
                Ok(())
            }
            OutputMode::Json => write_json_line(&json!({
                "command": "light-reset",
                "dry_run": true,
                "script": rendered.script,
                "substitutions": rendered.substitutions,
            })),
        };
    }

    warn_if_not_root(mode, "light-reset");
    let response = warehouse.light_reset();
    report_response(mode, "light-reset", &response)
}

fn run_is_clean(cli: &Cli, args: &IsCleanArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let warehouse = open_warehouse(cli, Arc::new(NullEventSink))?;
    let response = warehouse.is_clean(args.age);

    match mode {
        OutputMode::Human => {
            if let Some(audit) = &response.audit {
                print_audit(audit, args.age);
            }
            match (response.success, response.clean) {
                (true, Some(true)) => println!("{}", "clean".green().bold()),
                (true, _) => println!(
                    "{}: {} object(s) remain",
                    "not clean".red().bold(),
                    response.files.len()
                ),
                (false, _) => {}
            }
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&response)?)?,
    }

    match response.error {
        None => Ok(()),
        Some(error) => Err(CliError::Runtime(error)),
    }
}

fn print_audit(audit: &AuditResult, age: i64) {
    for outcome in &audit.outcomes {
        match &outcome.status {
            PatternStatus::Untested { variable } => println!(
                "  {:<8} {} (empty value of '{variable}')",
                "skipped".yellow(),
                outcome.pattern
            ),
            PatternStatus::NoMatches => {
                println!("  {:<8} {}", "none".dimmed(), outcome.pattern);
            }
            PatternStatus::Checked { objects } => {
                for object in objects {
                    let label = if object.exists {
                        "present".red()
                    } else {
                        "absent".green()
                    };
                    println!("  {label:<8} {}", object.path.display());
                }
            }
        }
    }
    let threshold = if age < 0 {
        String::new()
    } else {
        format!(" older than {age}s")
    };
    println!(
        "checked {} pattern(s), {} object(s); {} present{threshold}",
        audit.total_patterns,
        audit.objects_checked,
        audit.matched.len()
    );
}

fn run_render_template(cli: &Cli, args: &RenderTemplateArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let warehouse = open_warehouse(cli, Arc::new(NullEventSink))?;
    let rendered = match &args.template {
        Some(template) => warehouse.render_template(template)?,
        None => warehouse.render_light_reset()?,
    };

    match mode {
        OutputMode::Human => println!("{}", rendered.script),
        OutputMode::Json => write_json_line(&serde_json::to_value(&rendered)?)?,
    }
    Ok(())
}

/// Print a plain handler response and map failure to an exit status.
fn report_response(mode: OutputMode, command: &str, response: &Response) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => {
            if response.success {
                println!("{} {command}", "ok".green().bold());
            }
        }
        OutputMode::Json => {
            let mut payload = serde_json::to_value(response)?;
            if let Value::Object(map) = &mut payload {
                map.insert("command".to_string(), Value::String(command.to_string()));
            }
            write_json_line(&payload)?;
        }
    }

    if response.success {
        return Ok(());
    }
    let message = response
        .error
        .clone()
        .unwrap_or_else(|| format!("{command} failed"));
    Err(CliError::from_code(response.code, message))
}

fn warn_if_not_root(mode: OutputMode, command: &str) {
    if mode == OutputMode::Human && !is_running_as_root() {
        eprintln!("[WHM-CLI] {command} is not running as root; file removal may be incomplete");
    }
}

fn is_running_as_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("WHM_OUTPUT_FORMAT").ok();
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
