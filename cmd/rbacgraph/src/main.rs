mod report;

use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pkg_constants::paths::DEFAULT_CONFIG;
use pkg_extract::Pipeline;
use pkg_source::{Dispatcher, Source, detect_format};
use pkg_types::config::{ConfigFile, ExtractOptions, load_config_file};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "rbacgraph",
    about = "Map Kubernetes RBAC permissions onto the ServiceAccounts that can use them"
)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected format of a source directory
    Detect {
        /// Directory (or file) to inspect
        path: PathBuf,
    },
    /// Extract identities, workloads and RBAC from a source
    Scan(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// File, directory, or http(s) URL
    source: String,

    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Fail on the first malformed document
    #[arg(long)]
    strict: bool,

    /// Leave labels and annotations out of the result
    #[arg(long)]
    no_metadata: bool,

    /// Namespace for documents that declare none
    #[arg(long, short)]
    namespace: Option<String>,

    /// Follow symlinks while walking a directory
    #[arg(long)]
    follow_symlinks: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Detect { path } => {
            let format = detect_format(&path)?;
            println!("{}", format);
        }
        Commands::Scan(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling scan");
                    on_signal.cancel();
                }
            });
            scan(args, cancel).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so `--output json` stays machine-readable.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn scan(args: ScanArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    // Load config file (returns defaults if file not found)
    let file_cfg: ConfigFile = load_config_file(&args.config)?;
    info!("Config file: {}", args.config);

    let options = merge_options(&args, &file_cfg);
    info!("Scanning {}", args.source);
    info!("  Strict:          {}", options.strict);
    info!("  Metadata:        {}", options.include_metadata);
    info!(
        "  Namespace:       {}",
        options.default_namespace.as_deref().unwrap_or("(declared only)")
    );
    info!("  Follow symlinks: {}", options.follow_symlinks);

    let source = load_source(&args.source).await?;
    let normalized = Dispatcher::from_config(&file_cfg, options.clone())
        .with_cancellation(cancel.clone())
        .dispatch(&source)
        .await?;
    let mut extraction = Pipeline::new(options)
        .with_cancellation(cancel)
        .run(&normalized.documents)?;

    let mut warnings = normalized.warnings;
    warnings.append(&mut extraction.warnings);
    extraction.warnings = warnings;

    match args.output {
        OutputFormat::Json => {
            let report = report::Report::new(&args.source, &extraction);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => print!("{}", report::table(&extraction)),
    }
    Ok(())
}

/// Merge: CLI args > config file > defaults
fn merge_options(args: &ScanArgs, file_cfg: &ConfigFile) -> ExtractOptions {
    let mut options = file_cfg.extract_options();
    options.strict |= args.strict;
    options.follow_symlinks |= args.follow_symlinks;
    if args.no_metadata {
        options.include_metadata = false;
    }
    if let Some(namespace) = &args.namespace {
        options.default_namespace = Some(namespace.clone());
    }
    options
}

async fn load_source(raw: &str) -> anyhow::Result<Source> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        info!("Fetching {}", raw);
        let resp = reqwest::get(raw).await?;
        if !resp.status().is_success() {
            bail!("{} returned {}", raw, resp.status());
        }
        let content = resp.bytes().await?.to_vec();
        return Ok(Source::Remote {
            url: raw.to_string(),
            content,
        });
    }
    Ok(Source::from_path(raw)?)
}
