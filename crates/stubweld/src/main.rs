use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};
use stubweld_core::host::HostLayout;
use stubweld_core::{PatchConfig, Patcher};
use stubweld_utils::{LogFormat, LogLevel, LoggingGuard, info, init_logging, init_logging_with_level};

/// Rewrites stub method bodies in a compiled module so they call into host framework modules.
#[derive(Parser, Debug)]
#[command(name = "stubweld")]
#[command(version)]
#[command(about = "Rewrites stub method bodies in a compiled module so they call into host framework modules", long_about = None)]
struct Cli
{
    /// Root of the host installation
    host_root: Option<PathBuf>,
    /// Module containing the stubs
    input: Option<PathBuf>,
    /// Where to write the patched module
    output: Option<PathBuf>,
    /// Extra host layout, relative to the host root, probed before the built-in ones
    #[arg(long = "layout", env = "STUBWELD_LAYOUTS", value_delimiter = ',')]
    layouts: Vec<PathBuf>,
    /// Dependency record to remove from the output
    #[arg(long)]
    prune: Option<String>,
    /// Dependency record that takes over type references of the pruned one
    #[arg(long)]
    prune_retarget: Option<String>,
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LogLevel>,
    /// Log format (pretty or json); overrides STUBWELD_LOG_FORMAT
    #[arg(long)]
    log_format: Option<LogFormat>,
}

fn main()
{
    let cli = Cli::parse();

    let (Some(host_root), Some(input), Some(output)) = (&cli.host_root, &cli.input, &cli.output) else {
        // Missing inputs are not an error: show usage and leave
        let _ = Cli::command().print_help();
        println!();
        return;
    };

    let guard = match start_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let mut config = PatchConfig::default();
    config.prepend_layouts(cli.layouts.iter().cloned().map(HostLayout::new));
    if let Some(prune) = &cli.prune {
        config.pruned_reference = Some(prune.clone());
    }
    if let Some(retarget) = &cli.prune_retarget {
        config.prune_retarget = retarget.clone();
    }

    info!(host_root = %host_root.display(), input = %input.display(), "stubweld starting");
    match Patcher::new(config).run(host_root, input, output) {
        Ok(report) => {
            print!("{report}");
            println!("wrote {}", output.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            // exit skips destructors; flush the log file first
            drop(guard);
            process::exit(1);
        }
    }
}

fn start_logging(cli: &Cli) -> Result<LoggingGuard, stubweld_utils::LoggingError>
{
    match (cli.log_level, cli.log_format) {
        (None, None) => init_logging(),
        (level, format) => {
            init_logging_with_level(level.unwrap_or(LogLevel::Warn), format.unwrap_or(LogFormat::Pretty))
        }
    }
}
