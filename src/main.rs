/*!
 * cloudprobe CLI
 */

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cloudprobe::{
    cli_style::{print_error, print_success, print_warning, ConsoleReporter},
    config::{LogLevel, ProbeConfig},
    content::{ContentSpec, DEFAULT_RANDOM_SEED},
    crvd::Crvd,
    error::{ProbeError, Result, EXIT_FATAL, EXIT_SUCCESS},
    keys::{ObjectKey, UnicodeTables},
    logging,
    probe::{families, ProbeContext, UnicodeSelection},
    suite::Suite,
    target::TargetConfig,
    units::{format_bytes, format_duration, parse_count_max, parse_size},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SUITE_LONG_ABOUT: &str = "\
Run a suite of test cases investigating the limits of a cloud storage service:

  - maximum object size (--size)
  - maximum number of objects under one key prefix (--count)
  - Unicode key support (--unicode)

If none of --size, --count, --unicode or the --unicode-* flags is given, all
test cases are run.

Sizes may be exact byte counts or human-readable binary quantities such as
\"4K\" (4096 bytes) or \"3.5M\" (3670016 bytes). Supported units: B, K/KB/KiB,
M/MB/MiB, G/GB/GiB, T/TB/TiB.

Unicode key support is divided into categories, scripts, properties, emoji and
invalid keys; --unicode runs all of them. Invalid keys are expected to be
rejected, either by the service or by the client before any request is sent.";

const CRVD_LONG_ABOUT: &str = "\
Create, retrieve, verify, and delete an object in a cloud storage bucket.

The object is a stream of pseudorandom bytes of the given size, generated from
a seed (0 by default) so that runs are repeatable.";

#[derive(Parser)]
#[command(name = "cloudprobe")]
#[command(version, about = "Probe a cloud object-storage bucket for its practical limits", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Verbose logging (same as --log-level debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Write JSON logs to a file instead of stderr
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Load configuration from a TOML file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Custom S3 endpoint URL
    #[arg(short = 'e', long, global = true)]
    endpoint: Option<String>,

    /// S3 region
    #[arg(short = 'r', long, global = true)]
    region: Option<String>,

    /// Attempts per storage operation, including the first
    #[arg(long = "retry-attempts", value_name = "N", global = true)]
    retry_attempts: Option<u32>,

    /// Concurrent creates during count probes
    #[arg(long, value_name = "N", global = true)]
    workers: Option<usize>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, retrieve, verify, and delete an object
    #[command(long_about = CRVD_LONG_ABOUT)]
    Crvd(CrvdArgs),

    /// Run a suite of tests
    #[command(long_about = SUITE_LONG_ABOUT)]
    Suite(SuiteArgs),
}

#[derive(Args)]
struct CrvdArgs {
    /// Bucket URL (mem://, file://, s3://)
    #[arg(value_name = "BUCKET-URL")]
    bucket: String,

    /// Size of the object to create
    #[arg(short = 's', long, default_value = "4K")]
    size: String,

    /// Key to create (defaults to cloudprobe-crvd-TIMESTAMP.bin)
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Seed for the content generator
    #[arg(long = "random-seed", default_value_t = DEFAULT_RANDOM_SEED, allow_hyphen_values = true)]
    random_seed: i64,

    /// Keep the object after verification
    #[arg(long)]
    keep: bool,
}

#[derive(Args)]
struct SuiteArgs {
    /// Bucket URL (mem://, file://, s3://)
    #[arg(value_name = "BUCKET-URL")]
    bucket: String,

    /// Test object sizes
    #[arg(short = 's', long)]
    size: bool,

    /// Largest object to create
    #[arg(long = "size-max", value_name = "SIZE")]
    size_max: Option<String>,

    /// Test object counts
    #[arg(short = 'c', long)]
    count: bool,

    /// Most objects to create, or -1 for no limit
    #[arg(long = "count-max", value_name = "N", allow_hyphen_values = true)]
    count_max: Option<String>,

    /// Test Unicode keys (all of the --unicode-* families)
    #[arg(short = 'u', long)]
    unicode: bool,

    /// Test Unicode general categories
    #[arg(long = "unicode-categories")]
    unicode_categories: bool,

    /// Test Unicode scripts
    #[arg(long = "unicode-scripts")]
    unicode_scripts: bool,

    /// Test Unicode properties
    #[arg(long = "unicode-properties")]
    unicode_properties: bool,

    /// Test emoji
    #[arg(long = "unicode-emoji")]
    unicode_emoji: bool,

    /// Test invalid Unicode and malformed UTF-8
    #[arg(long = "unicode-invalid")]
    unicode_invalid: bool,

    /// List the tests that would run without making any requests
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,
}

impl SuiteArgs {
    fn unicode_selection(&self) -> UnicodeSelection {
        if self.unicode {
            return UnicodeSelection::all();
        }
        UnicodeSelection {
            categories: self.unicode_categories,
            properties: self.unicode_properties,
            scripts: self.unicode_scripts,
            emoji: self.unicode_emoji,
            invalid: self.unicode_invalid,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            print_error(&e.to_string(), hint(&e));
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Next step to suggest for an error, if there is an obvious one
fn hint(err: &ProbeError) -> Option<&'static str> {
    match err {
        ProbeError::ConnectionCheck(_) => Some("Check the bucket URL, credentials, --endpoint and --region"),
        ProbeError::Config(_) => Some("Run with --help for accepted values"),
        ProbeError::Cancelled => Some("Objects listed above may still be in the bucket"),
        _ => None,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Err(e) = logging::init_logging(&config) {
        print_warning(&format!("Failed to initialize logging: {}", e));
    }
    debug!("Configuration: {:?}", config);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ProbeError::Worker(format!("Failed to start async runtime: {}", e)))?;

    match cli.command {
        Commands::Crvd(args) => runtime.block_on(run_crvd(args, &config)),
        Commands::Suite(args) => runtime.block_on(run_suite(args, &config)),
    }
}

/// Defaults, then the config file, then flags
fn load_config(cli: &Cli) -> Result<ProbeConfig> {
    let mut config = match &cli.config {
        Some(path) => ProbeConfig::from_file(path)?,
        None => ProbeConfig::default(),
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.verbose {
        config.verbose = true;
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    if cli.endpoint.is_some() {
        config.endpoint = cli.endpoint.clone();
    }
    if cli.region.is_some() {
        config.region = cli.region.clone();
    }
    if let Some(attempts) = cli.retry_attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if cli.timeout.is_some() {
        config.timeout_secs = cli.timeout;
    }
    config.validate()?;
    Ok(config)
}

fn target_config(bucket: &str, config: &ProbeConfig) -> Result<TargetConfig> {
    Ok(TargetConfig::parse(bucket)?.with_s3_options(config.endpoint.clone(), config.region.clone()))
}

async fn run_crvd(args: CrvdArgs, config: &ProbeConfig) -> Result<()> {
    let content = ContentSpec::new(parse_size(&args.size)?, args.random_seed)?;
    let target = target_config(&args.bucket, config)?.connect().await?;
    let key = args.key.map(ObjectKey::from);

    let mut crvd = Crvd::new(target, key, content).with_retry_policy(config.retry.to_policy());
    let keep = args.keep;
    let lifecycle = async {
        if keep {
            crvd.create_retrieve_verify().await
        } else {
            crvd.create_retrieve_verify_delete().await
        }
    };
    let outcome = match config.timeout() {
        Some(limit) => tokio::time::timeout(limit, lifecycle)
            .await
            .unwrap_or(Err(ProbeError::Cancelled)),
        None => lifecycle.await,
    };

    if let Err(e) = outcome {
        if crvd.may_have_orphaned() {
            print_warning(&format!("{} may have been left in the bucket", crvd.key()));
        }
        return Err(e);
    }

    let size = format_bytes(content.length());
    if keep {
        print_success(&format!("{} object created, retrieved, and verified; keeping {}", size, crvd.key()));
    } else {
        print_success(&format!("{} object created, retrieved, verified, and deleted ({})", size, crvd.key()));
    }
    Ok(())
}

async fn run_suite(args: SuiteArgs, config: &ProbeConfig) -> Result<()> {
    let bucket = target_config(&args.bucket, config)?;
    let size_max = match &args.size_max {
        Some(size) => parse_size(size)?,
        None => bucket.default_size_max(config.size_max),
    };
    let count_max = match &args.count_max {
        Some(count) => parse_count_max(count)?,
        None => config.count_max,
    };
    let connection_check = ContentSpec::new(config.connection_check_length, DEFAULT_RANDOM_SEED)?;
    let target = bucket.connect().await?;

    let unicode = args.unicode_selection();
    let run_all = !(args.size || args.count || unicode.any());
    let mut cases = Vec::new();
    if run_all || args.size {
        cases.extend(families::size_cases(size_max));
    }
    if run_all || args.count {
        cases.extend(families::count_cases(count_max));
    }
    let unicode = if run_all { UnicodeSelection::all() } else { unicode };
    if unicode.any() {
        let tables = UnicodeTables::load();
        cases.extend(families::unicode_cases(&tables, unicode));
    }

    let cancel = CancellationToken::new();
    spawn_cancellation(cancel.clone(), config.timeout());

    let ctx = ProbeContext::new(target)
        .with_retry_policy(config.retry.to_policy())
        .with_workers(config.workers)
        .with_count_object_length(config.count_object_length)
        .with_cancellation(cancel.clone());
    let suite = Suite::new(cases, ctx)
        .with_dry_run(args.dry_run)
        .with_connection_check(connection_check);

    let mut reporter = ConsoleReporter::new();
    let outcome = suite.execute(&mut reporter).await;
    let cancelled = cancel.is_cancelled();
    cancel.cancel();
    let report = outcome?;

    if !report.dry_run {
        println!("\n…test complete ({}).", format_duration(report.elapsed));
    }
    if cancelled || report.cancelled {
        return Err(ProbeError::Cancelled);
    }
    Ok(())
}

/// Cancel on Ctrl-C or when the timeout expires; a second Ctrl-C exits at once
fn spawn_cancellation(cancel: CancellationToken, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::signal::ctrl_c() => {
                print_warning("Interrupted; stopping at the next probe (Ctrl-C again to exit now)");
            }
            _ = deadline => {
                print_warning("Timed out; stopping at the next probe");
            }
        }
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(EXIT_FATAL);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_for_connection_and_config_errors() {
        let check = ProbeError::ConnectionCheck(Box::new(ProbeError::Worker("refused".to_string())));
        assert!(hint(&check).unwrap().contains("--endpoint"));
        assert!(hint(&ProbeError::Config("bad".to_string())).is_some());
        assert!(hint(&ProbeError::Worker("join".to_string())).is_none());
    }

    #[test]
    fn test_memory_bucket_gets_capped_size_default() {
        let config = ProbeConfig::default();
        let bucket = target_config("mem://scratch", &config).unwrap();
        assert!(bucket.default_size_max(config.size_max) < config.size_max);
    }
}
