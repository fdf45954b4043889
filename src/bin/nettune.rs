//! nettune - VPN server network stack tuning
//!
//! # Usage
//!
//! ```bash
//! # Default: BBR + fq, VPN traffic tuning, DNS untouched
//! sudo nettune
//!
//! # Try BBR2 (falls back to BBR), tune, and switch DNS to Quad9
//! sudo nettune --bbr2 --vpn-tuning --dns quad9
//!
//! # Show what would be written without touching anything
//! nettune --dry-run --dns 10.0.0.53,10.0.0.54
//! ```

use clap::Parser;
use libnettune::error::TuneResult;
use libnettune::{IntentFlags, LinuxHost, Orchestrator, RunIntent, RunSummary, TuneConfig};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "nettune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tune the Linux network stack for many-client VPN traffic", long_about = None)]
#[command(after_help = "With no action flag (--bbr, --bbr2, --vpn-tuning, --dns) nettune applies BBR and the VPN tuning and leaves DNS unchanged.")]
struct Cli {
    /// Enable BBR congestion control with the fq qdisc
    #[arg(long)]
    bbr: bool,

    /// Enable BBR2 (falls back to BBR if the kernel lacks it)
    #[arg(long)]
    bbr2: bool,

    /// Apply the VPN traffic tuning (backlogs, buffers, keepalive, conntrack)
    #[arg(long)]
    vpn_tuning: bool,

    /// Configure DNS: cloudflare, quad9, google or a comma-separated IP list
    #[arg(long, value_name = "PROVIDER|IP,IP,...", env = "NETTUNE_DNS")]
    dns: Option<String>,

    /// Skip the DNS step (wins over --dns)
    #[arg(long)]
    no_dns: bool,

    /// Do not install troubleshooting tools
    #[arg(long)]
    no_tools: bool,

    /// Print intended actions and file contents without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary and verification report as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "NETTUNE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn intent_flags(&self) -> IntentFlags {
        IntentFlags {
            bbr: self.bbr,
            bbr2: self.bbr2,
            vpn_tuning: self.vpn_tuning,
            dns: self.dns.clone(),
            no_dns: self.no_dns,
            no_tools: self.no_tools,
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        if e.is_usage() {
            eprintln!("For more information, try '--help'.");
        }
        process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli) -> TuneResult<()> {
    let config = match &cli.config {
        Some(path) => TuneConfig::load(path)?,
        None => TuneConfig::default(),
    };

    // Usage errors surface here, before anything is touched
    let intent = RunIntent::from_flags(&cli.intent_flags(), config.tools.install)?;
    debug!("Resolved intent: {:?}", intent);

    let host = Arc::new(LinuxHost::new(config.command_timeout()));
    let summary = Orchestrator::new(host, config).run(&intent).await?;

    print_summary(&summary, cli.json)
}

fn print_summary(summary: &RunSummary, json: bool) -> TuneResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        eprintln!("{}", summary.status_line());
        return Ok(());
    }

    for preview in &summary.previews {
        println!("--- would write {} (mode {:o}) ---", preview.path.display(), preview.mode);
        print!("{}", preview.content);
        println!("--- end {} ---", preview.path.display());
    }

    if let Some(report) = &summary.report {
        println!();
        println!("{}", report);
    }

    if !summary.files.is_empty() {
        println!();
        for change in &summary.files {
            println!("{:<10} {}", change.outcome, change.path.display());
        }
    }

    if let Some(dir) = &summary.backup_dir {
        println!("Backup:    {}", dir.display());
    }

    if !summary.warnings.is_empty() {
        println!();
        for warning in summary.warnings.iter() {
            println!("warning: {}", warning);
        }
    }

    println!();
    println!("{}", summary.status_line());
    Ok(())
}

/// Initialize logging; diagnostics go to stderr, results to stdout
fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!("nettune={},libnettune={}", log_level, log_level))
        });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}
