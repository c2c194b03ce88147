use smq_bus::{NatsEndpoint, NatsTransport, QueueTransport};
use smq_core::{
    AppConfig, BatchReport, DirectSource, DirectorySource, Dispatcher, EventLog, ExchangeClient,
    Mode, RunError, SharedEventLog, TracingEventLog, WorkSource, local_offset,
    resolve_config_path,
};
use smq_telemetry::WorkerGuard;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use crate::cli::Cli;

pub const SERVICE_NAME: &str = "send-mq-message";
pub const USAGE: &str = "Usage: send-mq-message <applicationTag> <message> [...moreMessages]";
pub const ENV_NOTE: &str =
    "  Env: MFG_MQ_INI (default: SendMQMessage.toml) -> Path to config file";
pub const NO_RESOURCE_FILES: &str = "No resource files found.";

/// What a run will do once configuration and arguments are known.
#[derive(Debug)]
pub enum RunPlan {
    /// Direct mode without enough arguments.
    Usage,
    /// Directory mode found nothing to send.
    Skip,
    Dispatch(WorkSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSummary {
    Usage,
    Skipped,
    Completed(BatchReport),
}

/// Direct mode when the config says `cli` or at least two arguments are given, the resource
/// directory otherwise.
pub async fn plan(config: &AppConfig, args: &[String]) -> Result<RunPlan, RunError> {
    if config.mode == Mode::Cli || args.len() >= 2 {
        return Ok(match DirectSource::from_args(args) {
            Some(source) => RunPlan::Dispatch(WorkSource::Direct(source)),
            None => RunPlan::Usage,
        });
    }
    let (resource_dir, backup_dir) = config.paths.directory_paths()?;
    let source = DirectorySource::scan(&resource_dir, &backup_dir).await?;
    if source.is_empty() {
        Ok(RunPlan::Skip)
    } else {
        Ok(RunPlan::Dispatch(WorkSource::Directory(source)))
    }
}

/// Plans and runs one batch against `transport`. Only configuration, source and connection
/// errors surface here; per-message failures are part of the report.
pub async fn execute<W: Write>(
    config: AppConfig,
    args: &[String],
    transport: Arc<dyn QueueTransport>,
    log: SharedEventLog,
    console: &mut W,
) -> Result<RunSummary, RunError> {
    match plan(&config, args).await? {
        RunPlan::Usage => {
            say(console, log.as_ref(), USAGE);
            say(console, log.as_ref(), ENV_NOTE);
            Ok(RunSummary::Usage)
        }
        RunPlan::Skip => {
            say(console, log.as_ref(), &format!("[Warn]{NO_RESOURCE_FILES}"));
            log.info(NO_RESOURCE_FILES);
            Ok(RunSummary::Skipped)
        }
        RunPlan::Dispatch(source) => {
            let kind = source.kind();
            let mut client = ExchangeClient::new(transport, config.session, log.clone());
            let mut dispatcher = Dispatcher::new(log, console);
            let report = dispatcher
                .run_scoped(&mut client, source.into_items(), &kind)
                .await?;
            Ok(RunSummary::Completed(report))
        }
    }
}

/// Entry point behind `main`: loads configuration, installs logging and runs against NATS.
pub async fn run<W: Write>(cli: Cli, console: &mut W) -> ExitCode {
    let config_path = resolve_config_path(cli.config);
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            let _guard = install_telemetry(None);
            return fatal(console, &TracingEventLog, &RunError::from(err));
        }
    };
    let _guard = install_telemetry(config.paths.log_dir.clone());
    info!(config = %config_path.display(), mode = ?config.mode, "starting {SERVICE_NAME}");

    let transport = Arc::new(NatsTransport::new(NatsEndpoint {
        host: config.session.host.clone(),
        port: config.session.port,
        channel: config.session.channel.clone(),
    }));
    let log: SharedEventLog = Arc::new(TracingEventLog);
    match execute(config, &cli.args, transport, log.clone(), console).await {
        Ok(summary) => {
            info!(?summary, "run finished");
            ExitCode::SUCCESS
        }
        Err(err) => fatal(console, log.as_ref(), &err),
    }
}

fn install_telemetry(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let offset = local_offset();
    match smq_telemetry::install(SERVICE_NAME, log_dir, offset) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log directory unavailable, logging to stderr: {err:#}");
            smq_telemetry::install(SERVICE_NAME, None, offset)
                .ok()
                .flatten()
        }
    }
}

fn fatal<W: Write>(console: &mut W, log: &dyn EventLog, err: &RunError) -> ExitCode {
    let message = err.to_string();
    say(console, log, &message);
    log.error(&message);
    ExitCode::FAILURE
}

fn say<W: Write>(console: &mut W, log: &dyn EventLog, line: &str) {
    if let Err(err) = writeln!(console, "{line}") {
        log.debug(&format!("console write failed: {err}"));
    }
}
