use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use httpver_rs::{probe, scheduler, server, targets};

/// httpver-rs: check which HTTP versions (1.0/1.1/2/3) a server negotiates
/// and grade how modern its protocol stack is.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "httpver",
    version,
    about = "Check which HTTP versions (1.0/1.1/2/3) a server negotiates and grade the result.",
    long_about = None
)]
struct Cli {
    /// Port to test (default 443 for https, 80 for http).
    #[arg(long)]
    port: Option<u16>,

    /// Output results as JSON.
    #[arg(long)]
    json: bool,

    /// Comma-separated list of targets (e.g. "a.com,b.com").
    #[arg(long)]
    targets: Option<String>,

    /// Path to a file with targets, one per line ('#' lines ignored).
    #[arg(long = "targets-file")]
    targets_file: Option<PathBuf>,

    /// Run as a web service instead of a one-shot scan.
    #[arg(long)]
    web: bool,

    /// Address to listen on in web mode.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Targets given as positional arguments.
    #[arg(value_name = "TARGET")]
    positional: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so JSON on stdout stays clean; the default filter
    // also keeps dependency noise (e.g. quinn) out of normal runs.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.web {
        return server::serve(&cli.listen).await;
    }

    let gathered = targets::gather_targets(
        cli.targets.as_deref(),
        cli.targets_file.as_deref(),
        &cli.positional,
    )?;

    if gathered.is_empty() {
        eprintln!("Usage: httpver [--port N] [--json] [--targets a.com,b.com] [--targets-file FILE] <domain-or-url> ...");
        eprintln!("       httpver --web [--listen 127.0.0.1:8080]");
        eprintln!("Example: httpver cloudflare.com");
        eprintln!("Example: httpver --json cloudflare.com example.org");
        eprintln!("Example: httpver --targets-file targets.txt --json");
        std::process::exit(1);
    }

    // Quick summary so it is obvious something is happening.
    eprintln!(
        "Scanning {} host(s)... (✅ supported, ❌ not supported, 🟧 error/probe failed)\n",
        gathered.len()
    );

    let start = Instant::now();

    if cli.json {
        let results = scheduler::check_many(&gathered, cli.port).await;
        let stdout = std::io::stdout();
        if results.len() == 1 {
            serde_json::to_writer_pretty(stdout.lock(), &results[0])?;
        } else {
            serde_json::to_writer_pretty(stdout.lock(), &results)?;
        }
        println!();

        // Timing summary on stderr so JSON on stdout remains clean.
        eprintln!("\nScanned {} host(s) in {:.2?}", gathered.len(), start.elapsed());
    } else {
        if gathered.len() == 1 {
            let result = probe::check_target(&gathered[0], cli.port).await;
            println!("{}", result.summary_line());
        } else {
            // Print each result as soon as it is ready (completion order).
            let mut results = scheduler::check_many_streaming(gathered.clone(), cli.port);
            while let Some(result) = results.recv().await {
                println!("{}", result.summary_line());
            }
        }
        println!("\nScanned {} host(s) in {:.2?}", gathered.len(), start.elapsed());
    }

    Ok(())
}
