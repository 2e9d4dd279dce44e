//! valkey-assess - cluster-aware metrics collection for Valkey
//!
//! Takes two INFO snapshots of every node, compares them and reports
//! throughput, bandwidth, command mix and an ECPU estimate. With `--serve`
//! the same pipeline is exposed as a read-only REST API.

use anyhow::Result;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use valkey_assess::assess::Orchestrator;
use valkey_assess::config::{AssessConfig, CliArgs};
use valkey_assess::metrics::Reporter;
use valkey_assess::server;

fn setup_logging(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // stdout is reserved for the report
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

fn print_banner(config: &AssessConfig) {
    if config.quiet {
        return;
    }

    eprintln!("valkey-assess v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("====================================");
    eprintln!(
        "Seeds: {}",
        config
            .seeds
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    eprintln!(
        "Scope: {:?}, Sections: {}, Duration: {}s",
        config.scope,
        config.sections.join(","),
        config.duration.as_secs()
    );
    eprintln!(
        "Workers: {}, Task timeout: {}ms, Group timeout: {}ms",
        config.workers,
        config.task_timeout.as_millis(),
        config.group_timeout.as_millis()
    );
    eprintln!("====================================\n");
}

fn run_server(addr: &str, config: AssessConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(addr, config))?;
    Ok(())
}

fn run() -> Result<()> {
    let args = CliArgs::parse_args();

    setup_logging(args.verbose, args.quiet)?;

    let config = AssessConfig::from_cli(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(addr) = config.serve_addr.clone() {
        return run_server(&addr, config);
    }

    print_banner(&config);

    let reporter = Reporter::new(config.output_format);
    let report = Orchestrator::new(config.clone()).run()?;

    if let Some(ref output_path) = config.output_path {
        info!("Writing report to: {:?}", output_path);
    }
    reporter.write(&report, config.output_path.as_deref())?;

    if let Some(ref csv_path) = config.csv_output {
        info!("Writing command CSV to: {:?}", csv_path);
        reporter.write_commands_csv(&report, csv_path)?;
    }

    if report.is_partial() {
        info!(
            "Partial result: {} node failures recorded",
            report.failures.len()
        );
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
