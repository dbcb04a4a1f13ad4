//! Command-line interface: argument definitions, command dispatch, and
//! result rendering.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use fanout::engine::BatchRunner;
use fanout::inventory::{Host, Inventory};
use fanout::ops::{CommandOp, CommandSeriesOp, DownloadOp, UploadOp};
use fanout::probe;
use fanout::resolver::RouteResolver;
use fanout::state::{BatchRecord, StateStore, DEFAULT_STATE_DIR};

/// Longest command output echoed per host in the summary.
const MAX_OUTPUT_LEN: usize = 4096;

#[derive(Parser)]
#[command(name = "fanout", version, about = "Run operations across a fleet of hosts")]
pub struct Cli {
    /// Path to the inventory file (JSON or YAML)
    #[arg(long, global = true, default_value = "servers.json", env = "FANOUT_INVENTORY")]
    pub inventory: PathBuf,

    /// Comma-separated host names, or 'all'
    #[arg(long, global = true, default_value = "all")]
    pub hosts: String,

    /// Maximum number of concurrent workers
    #[arg(long, global = true, default_value_t = fanout::engine::DEFAULT_MAX_WORKERS)]
    pub workers: usize,

    /// Per-operation timeout in seconds (0 disables)
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Disable the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Save a batch record after the run
    #[arg(long, global = true)]
    pub record: bool,

    /// Directory for batch records
    #[arg(long, global = true, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one command on the selected hosts
    Run {
        /// Command line to execute remotely
        command: String,
    },
    /// Run several commands in order on each selected host
    Script {
        /// Commands to execute, in order
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Upload a file to the selected hosts
    Upload {
        local: PathBuf,
        remote: PathBuf,
        /// Stage the file through a gzipped tar archive
        #[arg(long)]
        compress: bool,
    },
    /// Download a file from the selected hosts
    Download {
        remote: PathBuf,
        local: PathBuf,
        /// Unpack the downloaded archive next to it
        #[arg(long)]
        decompress: bool,
    },
    /// Probe reachability (SMB with RDP fallback on Windows hosts)
    Probe,
    /// Inspect or maintain fallback routes
    Routes(RoutesArgs),
    /// List inventory hosts
    ListHosts,
    /// List saved batch records
    History,
}

#[derive(Args)]
pub struct RoutesArgs {
    #[arg(value_enum)]
    pub action: RouteAction,

    /// Route name, required for activate/deactivate
    #[arg(long)]
    pub route: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RouteAction {
    /// Show each route and its activation state
    List,
    /// Mark a route usable again
    Activate,
    /// Take a route out of the fallback chain
    Deactivate,
    /// Probe inactive routes and reactivate the ones that answer
    Refresh,
}

impl Cli {
    fn op_timeout(&self) -> Option<Duration> {
        if self.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout))
        }
    }

    fn select_hosts(&self, inventory: &Inventory) -> Result<Vec<Arc<Host>>> {
        let selection = inventory.select(&self.hosts);
        if !selection.missing.is_empty() {
            eprintln!(
                "{} hosts not found: {}",
                "warning:".yellow().bold(),
                selection.missing.join(", ")
            );
        }
        if selection.hosts.is_empty() {
            bail!("no hosts matched selection '{}'", self.hosts);
        }
        Ok(selection.hosts)
    }

    fn runner(&self) -> Result<BatchRunner> {
        Ok(BatchRunner::new()
            .with_max_workers(self.workers)?
            .with_progress(!self.no_progress))
    }

    /// Execute the selected command. Returns the process exit code.
    pub async fn execute(&self) -> Result<i32> {
        match &self.command {
            Commands::ListHosts => return self.list_hosts(),
            Commands::History => return self.history(),
            _ => {}
        }

        let inventory = Inventory::from_file(&self.inventory)
            .with_context(|| format!("loading inventory {}", self.inventory.display()))?;
        let hosts = self.select_hosts(&inventory)?;

        match &self.command {
            Commands::Run { command } => {
                let op = CommandOp::new(command.clone()).with_timeout(self.op_timeout());
                let batch = self.runner()?.run_command(hosts, op).await;
                self.finish_batch(&format!("run: {}", command), &batch)
            }
            Commands::Script { commands } => {
                let op = CommandSeriesOp::new(commands.clone()).with_timeout(self.op_timeout());
                let batch = self.runner()?.run_commands(hosts, op).await;
                self.finish_batch("script", &batch)
            }
            Commands::Upload {
                local,
                remote,
                compress,
            } => {
                if !local.exists() {
                    bail!("local file not found: {}", local.display());
                }
                let op = UploadOp::new(local, remote)
                    .compressed(*compress)
                    .with_timeout(self.op_timeout());
                let batch = self.runner()?.upload_file(hosts, op).await;
                self.finish_batch(&format!("upload: {}", local.display()), &batch)
            }
            Commands::Download {
                remote,
                local,
                decompress,
            } => {
                let op = DownloadOp::new(remote, local)
                    .decompressed(*decompress)
                    .with_timeout(self.op_timeout());
                let batch = self.runner()?.download_file(hosts, op).await;
                self.finish_batch(&format!("download: {}", remote.display()), &batch)
            }
            Commands::Probe => self.probe(&hosts).await,
            Commands::Routes(args) => self.routes(&hosts, args).await,
            Commands::ListHosts | Commands::History => unreachable!("handled above"),
        }
    }

    fn finish_batch(&self, description: &str, batch: &fanout::engine::BatchResult) -> Result<i32> {
        print_summary(batch);

        if self.record {
            let record = BatchRecord::from_result(description, batch);
            let path = StateStore::new(self.state_dir.clone()).save(&record)?;
            println!("record saved: {}", path.display());
        }

        Ok(if batch.all_succeeded() { 0 } else { 1 })
    }

    async fn probe(&self, hosts: &[Arc<Host>]) -> Result<i32> {
        let timeout = self.op_timeout().unwrap_or(Duration::from_secs(5));
        let reports = probe::probe_hosts(hosts, timeout, self.workers).await;

        let mut unreachable = 0;
        for report in &reports {
            if report.reachable {
                let protocol = report
                    .protocol
                    .map(|p| format!("{:?}", p).to_lowercase())
                    .unwrap_or_default();
                println!(
                    "  {} {} ({} port {})",
                    "✓".green(),
                    report.hostname,
                    protocol,
                    report.port.unwrap_or_default()
                );
            } else {
                unreachable += 1;
                println!(
                    "  {} {}: {}",
                    "✗".red(),
                    report.hostname,
                    report.error.as_deref().unwrap_or("unreachable")
                );
            }
        }
        Ok(if unreachable == 0 { 0 } else { 1 })
    }

    async fn routes(&self, hosts: &[Arc<Host>], args: &RoutesArgs) -> Result<i32> {
        match args.action {
            RouteAction::List => {
                for host in hosts {
                    println!("{}:", host.hostname.bold());
                    for route in &host.routes {
                        let state = if route.is_active() {
                            "active".green()
                        } else {
                            "inactive".red()
                        };
                        println!("  {} [{}] {} hops", route.name, state, route.hops.len());
                    }
                }
                Ok(0)
            }
            RouteAction::Activate | RouteAction::Deactivate => {
                let name = args
                    .route
                    .as_deref()
                    .context("--route is required for activate/deactivate")?;
                let mut missing = 0;
                for host in hosts {
                    match host.route(name) {
                        Some(route) => {
                            if matches!(args.action, RouteAction::Activate) {
                                route.activate();
                                println!("{}: route '{}' activated", host.hostname, name);
                            } else {
                                route.deactivate();
                                println!("{}: route '{}' deactivated", host.hostname, name);
                            }
                        }
                        None => {
                            missing += 1;
                            eprintln!(
                                "{} {}: no route named '{}'",
                                "warning:".yellow().bold(),
                                host.hostname,
                                name
                            );
                        }
                    }
                }
                Ok(if missing == 0 { 0 } else { 1 })
            }
            RouteAction::Refresh => {
                let resolver = RouteResolver::new();
                for host in hosts {
                    let probes = resolver.refresh_routes(host).await;
                    if probes.is_empty() {
                        println!("{}: no inactive routes", host.hostname);
                        continue;
                    }
                    for p in probes {
                        if p.reactivated {
                            println!("{}: route '{}' reactivated", host.hostname, p.route);
                        } else {
                            println!(
                                "{}: route '{}' still unreachable ({})",
                                host.hostname,
                                p.route,
                                p.error.unwrap_or_default()
                            );
                        }
                    }
                }
                Ok(0)
            }
        }
    }

    fn list_hosts(&self) -> Result<i32> {
        let inventory = Inventory::from_file(&self.inventory)
            .with_context(|| format!("loading inventory {}", self.inventory.display()))?;
        for host in inventory.hosts() {
            let state = if host.active { "" } else { " (inactive)" };
            println!(
                "  {} {} [{}] {} routes{}",
                host.hostname.bold(),
                host.addr,
                host.method,
                host.routes.len(),
                state
            );
        }
        Ok(0)
    }

    fn history(&self) -> Result<i32> {
        let store = StateStore::new(self.state_dir.clone());
        let paths = store.list()?;
        if paths.is_empty() {
            println!("no batch records in {}", self.state_dir.display());
            return Ok(0);
        }
        for path in paths {
            match store.load(&path) {
                Ok(record) => println!(
                    "  {}  {}  {}/{} ok ({:.1}%)",
                    record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    record.description,
                    record.total_successful,
                    record.total_hosts,
                    record.success_rate
                ),
                Err(e) => eprintln!(
                    "{} skipping {}: {}",
                    "warning:".yellow().bold(),
                    path.display(),
                    e
                ),
            }
        }
        Ok(0)
    }
}

/// Render a finished batch the way operators read it: counts first, then
/// per-host lines.
pub fn print_summary(batch: &fanout::engine::BatchResult) {
    println!();
    println!("{}", "=".repeat(50));
    println!("OPERATION RESULTS");
    println!("{}", "=".repeat(50));
    println!("Total hosts:    {}", batch.total_hosts());
    println!("Successful:     {}", batch.total_successful());
    println!("Failed:         {}", batch.total_failed());
    println!("Success rate:   {:.1}%", batch.success_rate());
    println!(
        "Execution time: {:.2}s",
        batch.execution_time().as_secs_f64()
    );

    if !batch.successful().is_empty() {
        println!("\nSuccessful hosts ({}):", batch.total_successful());
        for result in batch.successful() {
            println!("  {} {}", "✓".green(), result.host().hostname);
            if let Some(output) = result
                .payload()
                .and_then(|p| p.get("output"))
                .and_then(|o| o.as_str())
            {
                let output = output.trim();
                if !output.is_empty() {
                    let mut shown: String = output.chars().take(MAX_OUTPUT_LEN).collect();
                    if output.chars().count() > MAX_OUTPUT_LEN {
                        shown.push_str("...");
                    }
                    println!("    {}", shown);
                }
            }
        }
    }

    if !batch.failed().is_empty() {
        println!("\nFailed hosts ({}):", batch.total_failed());
        for result in batch.failed() {
            println!(
                "  {} {}: {}",
                "✗".red(),
                result.host().hostname,
                result.error().unwrap_or("unknown error")
            );
        }
    }
}
