//! scrollpipe - stream an Elasticsearch scroll search to stdout
//!
//! Prints the configured source fields of every matching document as one
//! comma-separated line, then the document total on stderr. A failed run
//! prints its error and the partial total on stderr and exits non-zero.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use scrollpipe_core::{CancellationToken, ProgressContext, SharedProgress, Verbosity};
use scrollpipe_elastic::ScrollSource;

mod config;
mod report;
mod run;

use config::Config;

#[derive(Parser)]
#[command(name = "scrollpipe")]
#[command(about = "Stream every document of an Elasticsearch query as CSV-style lines")]
#[command(version)]
struct Cli {
    /// Config file path (default: ./scrollpipe.toml or ~/.config/scrollpipe/config.toml)
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    let progress: SharedProgress = Arc::new(ProgressContext::new());
    let multi = progress.is_tty().then(|| progress.multi());
    scrollpipe_core::init_logging(Verbosity::from_flags(cli.quiet, cli.debug), multi)
        .context("Failed to install logger")?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    if cli.show_config {
        print_config(&config);
        return Ok(ExitCode::SUCCESS);
    }
    config.validate().context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let source = ScrollSource::new(&config.elastic, &config.http)?;
    log::info!(
        "Scrolling index {} on {} host(s)",
        config.elastic.index,
        config.elastic.hosts.len()
    );

    let report = runtime.block_on(async {
        let root = CancellationToken::new();
        let listener = scrollpipe_core::cancel_on_ctrl_c(root.clone());
        let report = run::scroll(&config, source, &root, &progress).await;
        root.cancel();
        if let Err(e) = listener.await {
            log::debug!("Ctrl-C listener ended abnormally: {e}");
        }
        report
    })?;

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    run::finish(report, &mut stdout, &mut stderr)
}

fn print_config(config: &Config) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let es = &config.elastic;
    table.add_row(vec!["Hosts", &es.hosts.join(", ")]);
    table.add_row(vec!["Index", &es.index]);
    table.add_row(vec!["Query", &es.query]);
    table.add_row(vec!["Fields", &es.fields.join(", ")]);
    table.add_row(vec!["Page size", &es.page_size.to_string()]);
    table.add_row(vec!["Scroll keep-alive", &es.scroll]);
    table.add_row(vec!["SSL", if es.ssl { "on" } else { "off" }]);
    table.add_row(vec![
        "CA certificate",
        &es.certfile
            .as_ref()
            .map_or_else(|| "system".to_string(), |p| p.display().to_string()),
    ]);
    table.add_row(vec![
        "Credentials",
        if es.username.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Channel capacity",
        &config.pipeline.channel_capacity.to_string(),
    ]);
    table.add_row(vec![
        "Missing fields",
        if config.pipeline.lenient_fields {
            "skip"
        } else {
            "fail"
        },
    ]);
    table.add_row(vec![
        "Timeouts",
        &format!(
            "connect {}s, request {}s",
            config.http.connect_timeout, config.http.request_timeout
        ),
    ]);
    table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

    eprintln!("\n{table}");
}
