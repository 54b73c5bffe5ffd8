use clap::Parser;
use crossbeam_channel::unbounded;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use logtally::cli::{flag_value, has_flag, Cli, LogLevel};
use logtally::config::PipelineConfig;
use logtally::config_file::ConfigFile;
use logtally::parallel::ParallelProcessor;
use logtally::platform::{signal_exit_code, Ctrl, ExitCode, SignalHandler, StopSignal};
use logtally::reset::clear_artifacts;

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();
    let config_file_path = flag_value(&raw_args, "--config-file").map(PathBuf::from);

    if has_flag(&raw_args, "--show-config") {
        ConfigFile::show_config(config_file_path.as_deref());
        ExitCode::Success.exit();
    }

    let config_file = if has_flag(&raw_args, "--ignore-config") {
        ConfigFile::default()
    } else {
        ConfigFile::load_with_custom_path(config_file_path.as_deref())
            .unwrap_or_else(|e| usage_error(&e))
    };

    let args = config_file
        .process_args(raw_args)
        .unwrap_or_else(|e| usage_error(&e));
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| e.exit());

    init_tracing(cli.log_level);

    let file_rules = if cli.ignore_config {
        Vec::new()
    } else {
        config_file
            .tracking_rules()
            .unwrap_or_else(|e| usage_error(&e))
    };
    let config = PipelineConfig::from_cli(&cli, file_rules).unwrap_or_else(|e| usage_error(&e));

    if cli.reset {
        if let Err(e) = clear_artifacts(&config.output) {
            fatal(&e);
        }
    }

    let stop = StopSignal::new();
    let (ctrl_tx, ctrl_rx) = unbounded::<Ctrl>();
    let _signal_handler = match SignalHandler::new(stop.clone(), ctrl_tx) {
        Ok(handler) => handler,
        Err(e) => fatal(&e),
    };

    info!(
        input = %config.input.path.display(),
        output = %config.output.event_log.display(),
        workers = config.performance.workers,
        "starting ingestion"
    );

    match ParallelProcessor::new(config).run(stop, ctrl_rx) {
        Ok(report) => {
            if cli.stats {
                eprintln!("{}", report.stats.format_stats());
            } else {
                info!("{}", report.stats.format_stats());
            }
            signal_exit_code().unwrap_or(ExitCode::Success).exit();
        }
        Err(e) => fatal(&e),
    }
}

fn init_tracing(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn usage_error(e: &anyhow::Error) -> ! {
    eprintln!("logtally: Error: {:#}", e);
    ExitCode::InvalidUsage.exit();
}

fn fatal(e: &anyhow::Error) -> ! {
    error!(error = %format!("{:#}", e), "ingestion failed");
    eprintln!("logtally: Error: {:#}", e);
    ExitCode::GeneralError.exit();
}
