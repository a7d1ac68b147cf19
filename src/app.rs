use crate::{config::ProctrackConfig, local_logger::init_local_logger, prelude::*};
use clap::{
    ArgAction, Parser, ValueEnum,
    builder::{Styles, styling},
};
use proctrack::{
    CommandSpawner, LaunchOptions, Launched, OutputRouting, Report, Termination, launch,
};
use std::io::Write;
use tokio_util::sync::CancellationToken;

/// Exit code after Ctrl-C, as a shell reports it
const INTERRUPTED_EXIT_CODE: i32 = 130;
/// Exit code when tracking stopped on an inconsistent forest
const TRACKING_FAILED_EXIT_CODE: i32 = 2;

fn create_styles() -> Styles {
    styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Yellow.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// The command writes to this terminal
    Inherit,
    /// The command's output is discarded
    Null,
    /// The command's output goes through the logger
    Log,
}

impl From<OutputMode> for OutputRouting {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Inherit => OutputRouting::Inherit,
            OutputMode::Null => OutputRouting::Null,
            OutputMode::Log => OutputRouting::Log,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Run a command and report how long each process of its tree took",
    styles = create_styles()
)]
pub struct Cli {
    /// The configuration name to use
    /// If provided, the configuration will be loaded from ~/.config/proctrack/{config-name}.yaml
    /// Otherwise, loads from ~/.config/proctrack/config.yaml
    #[arg(long, env = "PROCTRACK_CONFIG_NAME")]
    pub config_name: Option<String>,

    /// How the report is printed
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Where the output of the command goes
    #[arg(long, value_enum, default_value_t = OutputMode::Inherit)]
    pub output_mode: OutputMode,

    /// Event batches buffered between the event watcher and the tracker, overrides the
    /// configuration file
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Increase the log verbosity, once for debug and twice for trace
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// The command to track, with its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

pub async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_local_logger(cli.verbose)?;

    let config = ProctrackConfig::load(cli.config_name.as_deref())?;
    let cancel = CancellationToken::new();
    let options = LaunchOptions {
        queue_capacity: cli.queue_capacity.unwrap_or(config.queue_capacity),
        retry: config.retry_policy(),
        cancel: cancel.clone(),
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, reporting what was tracked so far");
            cancel.cancel();
        }
    });

    let launched = track(&cli, &config, options).await?;

    let report = Report::from_forest(&launched.forest);
    write_report(&mut std::io::stdout().lock(), &report, cli.format)?;
    Ok(exit_code(&launched))
}

#[cfg(target_os = "linux")]
async fn track(cli: &Cli, config: &ProctrackConfig, options: LaunchOptions) -> Result<Launched> {
    use proctrack::linux::{ConnectorSource, ProcfsMetadata};

    let (command, args) = cli
        .command
        .split_first()
        .context("No command to track")?;
    let source = ConnectorSource::open().context("Failed to subscribe to process events")?;
    let spawner = CommandSpawner::new(output_routing(cli.output_mode, cli.format));

    let launched = launch(
        source,
        &spawner,
        ProcfsMetadata,
        config.classifier(),
        options,
        command,
        args,
    )
    .await?;
    Ok(launched)
}

#[cfg(not(target_os = "linux"))]
async fn track(_cli: &Cli, _config: &ProctrackConfig, _options: LaunchOptions) -> Result<Launched> {
    bail!("Process tracking is only supported on Linux")
}

/// A JSON report owns stdout, so an inherited command writes to stderr instead
fn output_routing(mode: OutputMode, format: ReportFormat) -> OutputRouting {
    match (mode, format) {
        (OutputMode::Inherit, ReportFormat::Json) => OutputRouting::Stderr,
        (mode, _) => mode.into(),
    }
}

fn write_report<W: Write>(out: &mut W, report: &Report, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => write!(out, "{report}")?,
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report)
                .context("Failed to serialize the report")?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// The command's own exit code once tracking completed, a fixed code otherwise
fn exit_code(launched: &Launched) -> i32 {
    match &launched.termination {
        Termination::Complete => launched
            .exit_status
            .map(|status| status.code().unwrap_or(1))
            .unwrap_or(0),
        Termination::Cancelled => INTERRUPTED_EXIT_CODE,
        Termination::SourceClosed => 1,
        Termination::Failed(err) => {
            error!("Tracking failed, the report is incomplete: {err}");
            TRACKING_FAILED_EXIT_CODE
        }
    }
}
