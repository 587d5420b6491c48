use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use stepwatch::cli::{Cli, Command, OutputFormat};
use stepwatch::{text_output, wire, CircularBuffer, DrillDownReport, HttpFetcher, Importer, Session};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_sessions(sessions: &[Arc<Session>], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print!("{}", text_output::render_sessions(sessions.iter().map(Arc::as_ref)));
        }
        OutputFormat::Json => {
            println!("{}", wire::encode_sessions(sessions)?);
        }
    }
    Ok(())
}

fn run_fetch(
    url: &str,
    drill_down: bool,
    format: OutputFormat,
    capacity: usize,
    timeout_ms: u64,
) -> Result<()> {
    if timeout_ms == 0 {
        anyhow::bail!("Invalid value for --timeout-ms: 0 (must be > 0)");
    }

    let buffer = Arc::new(CircularBuffer::try_new(capacity)?);
    let importer = Importer::new(buffer.clone(), Arc::new(HttpFetcher::new()?))
        .with_timeout(Duration::from_millis(timeout_ms));

    let report = importer.import(url)?;
    eprintln!(
        "Imported {} of {} sessions from {}",
        report.added, report.fetched, url
    );

    if drill_down {
        // Only the sessions imported above are drilled into, never the merged ones.
        let mut total = DrillDownReport::default();
        for session in buffer.snapshot() {
            // Merged sessions may already have evicted this one.
            let Ok(r) = importer.drill_down(session.id()) else {
                continue;
            };
            total.links += r.links;
            total.already_present += r.already_present;
            total.unresolved += r.unresolved;
            total.fetched += r.fetched;
            total.failed += r.failed;
            total.merged += r.merged;
        }
        eprintln!(
            "Drill-down: {} links, {} fetched, {} merged, {} failed, {} unresolved",
            total.links, total.fetched, total.merged, total.failed, total.unresolved
        );
    }

    print_sessions(&buffer.snapshot(), format)
}

fn run_show(file: &std::path::Path, format: OutputFormat) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let sessions: Vec<Arc<Session>> = wire::decode_sessions(&bytes)
        .with_context(|| format!("Failed to parse {}", file.display()))?
        .into_iter()
        .map(Arc::new)
        .collect();
    print_sessions(&sessions, format)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match args.command {
        Command::Fetch {
            url,
            drill_down,
            format,
            capacity,
            timeout_ms,
        } => run_fetch(&url, drill_down, format, capacity, timeout_ms),
        Command::Show { file, format } => run_show(&file, format),
    }
}
