use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use depscan::{
    config::{Config, IgnoreList},
    engine::{CheckError, Engine},
    model::{CheckResult, ManifestKind, ParsedManifest, Severity},
    output::{format_result_to_string, print_result, OutputFormat},
    parser, IgnoreRules,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MODERATE_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const UNKNOWN_VULN: u8 = 6;
}

#[derive(Parser)]
#[command(name = "depscan")]
#[command(
    author,
    version,
    about = "Check npm, Yarn, pip, Pipenv and Poetry dependencies for known vulnerabilities",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    scan: ScanArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Manifest files or directories to scan
    paths: Vec<PathBuf>,

    /// Path to a package.json file
    #[arg(long, value_name = "PATH")]
    package_json: Option<PathBuf>,

    /// Path to a package-lock.json file
    #[arg(long, value_name = "PATH")]
    package_lock: Option<PathBuf>,

    /// Path to a yarn.lock file
    #[arg(long, value_name = "PATH")]
    yarn_lock: Option<PathBuf>,

    /// Path to a requirements.txt file
    #[arg(long, value_name = "PATH")]
    requirements_txt: Option<PathBuf>,

    /// Path to a Pipfile.lock file
    #[arg(long, value_name = "PATH")]
    pipfile_lock: Option<PathBuf>,

    /// Path to a poetry.lock file
    #[arg(long, value_name = "PATH")]
    poetry_lock: Option<PathBuf>,

    /// Output results as JSON, optionally written to a file (--json=report.json)
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "-"
    )]
    json: Option<PathBuf>,

    /// JSON file listing CVE IDs and severities to ignore
    #[arg(long, value_name = "PATH")]
    ignore: Option<PathBuf>,

    /// Number of dependencies queried concurrently
    #[arg(long)]
    batch_size: Option<usize>,

    /// Exit with a non-zero code if vulnerabilities at or above this severity are found
    #[arg(long, value_enum, default_value_t = FailLevel::Any)]
    fail_on: FailLevel,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Moderate,
    Low,
    Any,
    Never,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    init_logging(cli.scan.verbose);

    match cli.command {
        Some(Commands::Config { init, path }) => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        None => scan(cli.scan).await,
    }
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_logging(verbose: bool) {
    let default = if verbose { "warn,depscan=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn scan(args: ScanArgs) -> Result<u8> {
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Ignoring config file: {}", e);
        Config::default()
    });
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    let files = collect_manifests(&args)?;
    if files.is_empty() {
        bail!(
            "No manifest files found. Pass files or directories, e.g. `depscan package-lock.json requirements.txt`"
        );
    }

    let manifests = files
        .iter()
        .map(|(path, kind)| {
            parser::parse_file(path, *kind)
                .with_context(|| format!("Failed to parse {}", path.display()))
        })
        .collect::<Result<Vec<ParsedManifest>>>()?;

    let ignore_list = args
        .ignore
        .as_deref()
        .map(IgnoreList::load)
        .transpose()
        .context("Failed to load ignore list")?;
    let rules = IgnoreRules::from_sources(&config.ignore, ignore_list.as_ref());
    if !rules.is_empty() {
        debug!(
            "Ignoring {} CVE IDs and {} severities",
            rules.cve_ids.len(),
            rules.severities.len()
        );
    }

    let format = if args.json.is_some() {
        OutputFormat::Json
    } else {
        config.default_format.parse().unwrap_or(OutputFormat::Table)
    };

    let engine = Engine::with_default_clients(&config)?;
    let spinner = (format == OutputFormat::Table && std::io::stderr().is_terminal())
        .then(|| start_spinner(&manifests));

    let outcome = engine.check(&manifests, &rules).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let result = match outcome {
        Ok(result) => result,
        Err(CheckError::NoDependencies) => {
            println!("No dependencies found in the scanned manifests.");
            return Ok(exit_codes::SUCCESS);
        }
        Err(e) => return Err(e.into()),
    };

    match args.json.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            let json = format_result_to_string(&result, OutputFormat::Json)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("JSON report written to: {}", path.display());
        }
        _ => print_result(&result, format)?,
    }

    if result.failed_queries > 0 {
        warn!(
            "{} advisory queries failed; results may be incomplete",
            result.failed_queries
        );
    }

    Ok(determine_exit_code(&result, args.fail_on))
}

/// Explicit `--<kind>` paths plus positional files and directories, with
/// lock files taking priority over the manifests they resolve.
fn collect_manifests(args: &ScanArgs) -> Result<Vec<(PathBuf, ManifestKind)>> {
    let explicit = [
        (&args.package_json, ManifestKind::PackageJson),
        (&args.package_lock, ManifestKind::PackageLock),
        (&args.yarn_lock, ManifestKind::YarnLock),
        (&args.requirements_txt, ManifestKind::RequirementsTxt),
        (&args.pipfile_lock, ManifestKind::PipfileLock),
        (&args.poetry_lock, ManifestKind::PoetryLock),
    ];

    let mut files: Vec<(PathBuf, ManifestKind)> = explicit
        .into_iter()
        .filter_map(|(path, kind)| path.clone().map(|p| (p, kind)))
        .collect();

    for path in &args.paths {
        if path.is_dir() {
            let found = parser::discover(path);
            debug!("Discovered {} manifests in {}", found.len(), path.display());
            files.extend(found);
        } else if let Some(kind) = ManifestKind::detect(path) {
            files.push((path.clone(), kind));
        } else if !path.exists() {
            bail!("File not found: {}", path.display());
        } else {
            warn!("Skipping {}: unrecognized file type", path.display());
        }
    }

    for (path, _) in &files {
        if !path.exists() {
            bail!("File not found: {}", path.display());
        }
    }

    Ok(parser::prioritize(dedup_manifests(files)?))
}

/// Drops repeats of the same file, however its path was spelled.
fn dedup_manifests(files: Vec<(PathBuf, ManifestKind)>) -> Result<Vec<(PathBuf, ManifestKind)>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(files.len());
    for (path, kind) in files {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        if seen.insert(canonical) {
            unique.push((path, kind));
        } else {
            debug!("Skipping {}: already selected", path.display());
        }
    }
    Ok(unique)
}

fn start_spinner(manifests: &[ParsedManifest]) -> ProgressBar {
    let count: usize = manifests.iter().map(|m| m.dependencies.len()).sum();
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Checking {} dependencies for vulnerabilities...", count));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Maps the most severe surviving finding to an exit code, gated by --fail-on.
fn determine_exit_code(result: &CheckResult, fail_on: FailLevel) -> u8 {
    let threshold = match fail_on {
        FailLevel::Never => return exit_codes::SUCCESS,
        FailLevel::Any => Severity::Unknown,
        FailLevel::Low => Severity::Low,
        FailLevel::Moderate => Severity::Moderate,
        FailLevel::High => Severity::High,
        FailLevel::Critical => Severity::Critical,
    };

    match result.summary.highest() {
        Some(severity) if severity >= threshold => match severity {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Moderate => exit_codes::MODERATE_VULN,
            Severity::Low => exit_codes::LOW_VULN,
            Severity::Unknown => exit_codes::UNKNOWN_VULN,
        },
        _ => exit_codes::SUCCESS,
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
