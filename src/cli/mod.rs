//! CLI argument parsing and command dispatch

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rpcbench_core::{
    CallSummary, CallTemplateContext, LoopbackTransport, MethodDescriptor, OrchestratorBuilder,
    RunConfig, RunSummary,
};

#[derive(Parser)]
#[command(name = "rpcbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load test against a method
    Run(RunArgs),
    /// Render a template once and print the result
    Render(RenderArgs),
}

/// Method identity shared by every command
#[derive(Args)]
pub struct MethodArgs {
    /// Method to call, e.g. `helloworld.Greeter/SayHello`
    pub call: String,

    /// Request message type name
    #[arg(long, default_value = "Request")]
    pub input: String,

    /// Response message type name
    #[arg(long, default_value = "Response")]
    pub output: String,

    /// The method streams requests
    #[arg(long)]
    pub client_streaming: bool,

    /// The method streams responses
    #[arg(long)]
    pub server_streaming: bool,
}

impl MethodArgs {
    fn descriptor(&self) -> Result<MethodDescriptor> {
        Ok(
            MethodDescriptor::parse(&self.call, self.input.as_str(), self.output.as_str())?
                .with_streaming(self.client_streaming, self.server_streaming),
        )
    }
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub method: MethodArgs,

    /// Total number of calls
    #[arg(short = 'n', long, default_value_t = 200)]
    pub total: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 50)]
    pub concurrency: usize,

    /// Per-worker rate limit in calls per second (0 for none)
    #[arg(long, default_value_t = 0)]
    pub qps: u32,

    /// Per-call timeout in milliseconds (0 for none)
    #[arg(long, default_value_t = 20_000)]
    pub timeout_ms: u64,

    /// Request payload as a JSON template
    #[arg(short, long, conflicts_with_all = ["data_file", "binary_file"])]
    pub data: Option<String>,

    /// File holding the JSON payload template
    #[arg(short = 'D', long, conflicts_with = "binary_file")]
    pub data_file: Option<PathBuf>,

    /// File holding length-delimited binary messages
    #[arg(short, long)]
    pub binary_file: Option<PathBuf>,

    /// Request metadata as a JSON object template
    #[arg(short, long)]
    pub metadata: Option<String>,

    /// Delay between messages on a request stream, in milliseconds
    #[arg(long)]
    pub stream_interval_ms: Option<u64>,

    /// Stop the run after this many milliseconds
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Resolve payloads without issuing calls
    #[arg(long)]
    pub dry_run: bool,

    /// Simulated latency of the loopback transport, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Summary output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub method: MethodArgs,

    /// Template text to render
    #[arg(short, long)]
    pub template: String,

    /// Worker id visible as `.WorkerID`
    #[arg(long, default_value = "w0")]
    pub worker_id: String,

    /// Request number visible as `.RequestNumber`
    #[arg(long, default_value_t = 1)]
    pub request_number: u64,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Execute the parsed command
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Render(args) => render(args),
    }
}

fn render(args: RenderArgs) -> Result<()> {
    let method = args.method.descriptor()?;
    let ctx = CallTemplateContext::new(&method, args.worker_id, args.request_number);
    let output = ctx.execute(&args.template)?;
    println!("{output}");
    Ok(())
}

impl RunArgs {
    fn run_config(&self) -> Result<RunConfig> {
        let timeout = (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms));
        let mut config = RunConfig::new(self.total, self.concurrency)
            .with_qps(self.qps)
            .with_timeout(timeout)
            .with_stream_interval(self.stream_interval_ms.map(Duration::from_millis))
            .with_dry_run(self.dry_run);

        if let Some(data) = &self.data {
            config = config.with_data(data.as_str());
        } else if let Some(path) = &self.data_file {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read data file {}", path.display()))?;
            config = config.with_data(data);
        } else if let Some(path) = &self.binary_file {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read binary file {}", path.display()))?;
            config = config.with_binary_data(data);
        }

        if let Some(metadata) = &self.metadata {
            config = config.with_metadata(metadata.as_str());
        }

        Ok(config)
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let method = args.method.descriptor()?;
    let config = args.run_config()?;
    let transport =
        Arc::new(LoopbackTransport::new().with_latency(Duration::from_millis(args.latency_ms)));

    let (orchestrator, mut records) = OrchestratorBuilder::new()
        .config(config)
        .method(method)
        .transport(transport)
        .build()?;

    let collector = tokio::spawn(async move {
        let mut all = Vec::new();
        while let Some(record) = records.recv().await {
            all.push(record);
        }
        all
    });

    let summary = match args.duration_ms {
        Some(ms) => {
            orchestrator
                .run_with_timeout(Duration::from_millis(ms))
                .await?
        }
        None => orchestrator.run_with_signal_handling().await?,
    };
    drop(orchestrator);

    let records = collector.await.context("record collector failed")?;
    let calls = CallSummary::from_records(&records, summary.stats.total_duration);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&calls)?),
        OutputFormat::Text => print_text(&summary, &calls),
    }

    if summary.stats.total_completed == 0 && !summary.is_success() {
        bail!("every call failed");
    }
    Ok(())
}

fn print_text(summary: &RunSummary, calls: &CallSummary) {
    println!("Summary:");
    println!("  Count:        {}", calls.total_calls);
    println!("  Total:        {:.2} s", calls.total_duration_secs);
    println!("  Requests/sec: {:.2}", calls.calls_per_second);
    println!();
    println!("Latency (ms):");
    println!("  Fastest: {:.2}", calls.latency.min);
    println!("  Average: {:.2}", calls.latency.mean);
    println!("  Slowest: {:.2}", calls.latency.max);
    println!("  p50:     {:.2}", calls.latency.p50);
    println!("  p90:     {:.2}", calls.latency.p90);
    println!("  p99:     {:.2}", calls.latency.p99);
    println!();
    println!("Calls:");
    println!("  OK:     {}", summary.stats.total_completed);
    println!("  Failed: {}", summary.stats.total_errors);

    let errors = summary.error_counts();
    if !errors.is_empty() {
        println!();
        println!("Errors:");
        for (message, count) in errors {
            println!("  [{count}] {message}");
        }
    }
}
