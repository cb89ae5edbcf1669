use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use evalchart::{records, report, LoadState, LoaderConfig, ReportLoader, ReportSource, ReportView};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "evalchart")]
#[command(author, version, about = "Render model tag-evaluation reports as charts")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a report and write it as HTML, JSON or CSV
    Render {
        /// Report URL, report JSON file, or evaluation records (.jsonl file or directory)
        #[arg(env = "EVALCHART_SOURCE")]
        source: String,

        /// Output report file (.html, .json, .csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for auto-generated reports
        #[arg(long, default_value = "evalchart-reports")]
        report_dir: PathBuf,

        /// Fetch timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Don't open the report in a browser
        #[arg(long)]
        no_open: bool,

        /// Only show errors
        #[arg(short, long)]
        quiet: bool,
    },

    /// Aggregate evaluation records into a report JSON file with per-tag analysis
    Build {
        /// Records file (.jsonl) or directory of them
        records: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start interactive web UI for a report
    Serve {
        /// Report URL, report JSON file, or evaluation records
        #[arg(env = "EVALCHART_SOURCE")]
        source: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = evalchart::config::DEFAULT_PORT)]
        port: u16,

        /// Fetch timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Don't open a browser
        #[arg(long)]
        no_open: bool,
    },
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let result = match args.command {
        Command::Render { source, output, report_dir, timeout, no_open, quiet } => {
            let config = LoaderConfig::from_env().with_timeout_secs(timeout);
            render(&source, output, &report_dir, &config, !no_open, quiet)
        }
        Command::Build { records, output } => build(&records, output),
        Command::Serve { source, port, timeout, no_open } => {
            let config = LoaderConfig::from_env().with_timeout_secs(timeout);
            serve(&source, port, &config, !no_open)
        }
    };

    if let Err(e) = result {
        eprintln!("\x1b[31mError:\x1b[0m {:#}", e);
        std::process::exit(1);
    }
}

fn render(
    source: &str,
    output: Option<PathBuf>,
    report_dir: &Path,
    config: &LoaderConfig,
    open_report: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let source = ReportSource::parse(source);
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    // Loading placeholder
    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message(format!("Loading report from {}", source));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let state = runtime.block_on(async {
        let mut loader = ReportLoader::mount(source.clone(), config);
        loader.settled().await
    });

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let report = match state {
        LoadState::Loaded(report) => report,
        LoadState::Failed(e) => bail!("could not load report from {}: {}", source, e),
        LoadState::NotLoaded => bail!("could not load report from {}: fetch was cancelled", source),
    };

    let view = ReportView::from_report(&report);

    if !quiet {
        eprintln!("\x1b[1mModel Evaluation Report\x1b[0m");
        eprintln!("{}", "─".repeat(60));
        for (label, value) in view.summary.counters() {
            eprintln!("  {:<15} {}", label, value);
        }
        eprintln!("  {:<15} {}", "Accuracy", view.overall_accuracy_label);
        if !view.ranking.is_empty() {
            eprintln!("\n  \x1b[1mTop tags\x1b[0m");
            for bar in view.ranking.iter().take(5) {
                eprintln!("  {:>7}  {}", bar.accuracy_label, bar.tag);
            }
        }
        if !view.unranked.is_empty() {
            eprintln!("  \x1b[90m{} tag(s) with no data\x1b[0m", view.unranked.len());
        }
    }

    let output_path = match output {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(report_dir)
                .with_context(|| format!("failed to create {}", report_dir.display()))?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            report_dir.join(format!("evalchart_report_{}.html", timestamp))
        }
    };

    report::generate(&output_path, &view)
        .with_context(|| format!("failed to write report {}", output_path.display()))?;

    if !quiet {
        eprintln!("\n\x1b[32mReport saved: {}\x1b[0m", output_path.display());
    }

    if open_report {
        if let Err(e) = open::that(&output_path) {
            eprintln!("Failed to open report: {}", e);
        }
    }

    Ok(())
}

fn build(path: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let statistics = records::build_statistics_report(path)?;
    let json = serde_json::to_string_pretty(&statistics)?;

    match output {
        Some(out) => {
            std::fs::write(&out, json + "\n").with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!(
                "\x1b[32mReport saved: {}\x1b[0m ({} videos, {} tags)",
                out.display(),
                statistics.report.total_statistics.total_videos,
                statistics.report.tag_count()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn serve(source: &str, port: u16, config: &LoaderConfig, open_browser: bool) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let _guard = runtime.enter();

    let loader = ReportLoader::mount(ReportSource::parse(source), config);
    evalchart::serve::start(port, loader, open_browser).context("server error")?;

    Ok(())
}
