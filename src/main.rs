use apicheck::analysis::IssueCategory;
use apicheck::baseline::detect_compile_sdk;
use apicheck::discovery::FileStats;
use apicheck::report::GroupBy;
use apicheck::{Config, FileFinder, KnowledgeBase, ModuleBaseline, ProjectAnalyzer, ReportFormat, Reporter};
use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};

/// apicheck - Detect unguarded uses of newer Android APIs and missing permissions
#[derive(Parser, Debug)]
#[command(name = "apicheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the project directory to analyze
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file (for json/sarif formats)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the manifest's minSdkVersion
    #[arg(long, value_name = "LEVEL")]
    min_sdk: Option<u32>,

    /// Override the manifest's targetSdkVersion
    #[arg(long, value_name = "LEVEL")]
    target_sdk: Option<u32>,

    /// Platform the module compiles against, for the override check
    #[arg(long, value_name = "LEVEL")]
    compile_sdk: Option<u32>,

    /// api-versions.xml to use instead of the one in $ANDROID_HOME
    #[arg(long, value_name = "FILE")]
    api_database: Option<PathBuf>,

    /// Permission table mapping platform methods to required permissions
    #[arg(long, value_name = "FILE")]
    permission_database: Option<PathBuf>,

    /// AndroidManifest.xml to read the module baseline from
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Issue categories to skip (can be specified multiple times)
    #[arg(long, value_name = "CATEGORY", value_parser = parse_category)]
    disable: Vec<IssueCategory>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Terminal,
    Json,
    Sarif,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Sarif => ReportFormat::Sarif,
        }
    }
}

fn parse_category(s: &str) -> Result<IssueCategory, String> {
    IssueCategory::from_id(s).ok_or_else(|| {
        let known: Vec<_> = IssueCategory::ALL.iter().map(|c| c.id()).collect();
        format!("unknown category '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    info!("apicheck v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    run_analysis(&config, &cli)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    // Reports go to stdout, logs stay out of their way
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::from_default_locations(&cli.path)?
    };

    // Override with CLI arguments
    if let Some(format) = cli.format {
        config.report.format = match format {
            OutputFormat::Terminal => "terminal",
            OutputFormat::Json => "json",
            OutputFormat::Sarif => "sarif",
        }
        .to_string();
    }
    if cli.output.is_some() {
        config.report.output = cli.output.clone();
    }
    if cli.min_sdk.is_some() {
        config.min_sdk = cli.min_sdk;
    }
    if cli.target_sdk.is_some() {
        config.target_sdk = cli.target_sdk;
    }
    if cli.compile_sdk.is_some() {
        config.compile_sdk = cli.compile_sdk;
    }
    if cli.api_database.is_some() {
        config.api_database = cli.api_database.clone();
    }
    if cli.permission_database.is_some() {
        config.permission_database = cli.permission_database.clone();
    }
    if cli.manifest.is_some() {
        config.manifest = cli.manifest.clone();
    }

    Ok(config)
}

fn run_analysis(config: &Config, cli: &Cli) -> Result<ExitCode> {
    use indicatif::{ProgressBar, ProgressStyle};

    let start_time = Instant::now();

    let format: ReportFormat = config.report.format.parse().map_err(|e: String| miette::miette!(e))?;
    let group_by: GroupBy = config.report.group_by.parse().map_err(|e: String| miette::miette!(e))?;
    let interactive = format == ReportFormat::Terminal && !cli.quiet;

    // Step 1: Discover files
    info!("Discovering files...");
    let files = FileFinder::new(config).find_files(&cli.path)?;
    let stats = FileStats::from_files(&files);
    info!(
        "Found {} Java files, {} resource files and {} manifests",
        stats.java_files, stats.resource_files, stats.manifest_files
    );

    if stats.java_files + stats.resource_files == 0 {
        if interactive {
            println!("{}", "No Java or resource files found.".yellow());
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Step 2: Module baseline
    let manifest = config
        .manifest
        .clone()
        .or_else(|| FileFinder::find_manifest(&files).map(|p| p.to_path_buf()));
    let baseline = match &manifest {
        Some(path) => match ModuleBaseline::load(path) {
            Ok(baseline) => baseline,
            Err(e) if config.manifest.is_some() => return Err(e).into_diagnostic(),
            Err(e) => {
                warn!("{}; using default baseline", e);
                ModuleBaseline::default()
            }
        },
        None => {
            warn!("No AndroidManifest.xml found; using default baseline");
            ModuleBaseline::default()
        }
    }
    .with_overrides(config.min_sdk, config.target_sdk);

    let module_root = manifest
        .as_deref()
        .and_then(|path| path.ancestors().find(|dir| dir.ends_with("src")))
        .and_then(|src| src.parent())
        .or_else(|| manifest.as_deref().and_then(|path| path.parent()))
        .unwrap_or(cli.path.as_path());
    let compile_sdk = config
        .compile_sdk
        .or_else(|| detect_compile_sdk(module_root))
        .or_else(|| detect_compile_sdk(&cli.path));
    let baseline = baseline.with_compile_sdk(compile_sdk);

    // Step 3: Knowledge base
    let kb = KnowledgeBase::load(
        config.api_database.as_deref(),
        config.permission_database.as_deref(),
    );
    if let Ok(kb) = &kb {
        info!("Loaded {} platform classes", kb.class_count());
    }

    // Step 4: Analyze
    let pb = if interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .into_diagnostic()?,
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message(format!(
            "Checking {} Java files and {} resources...",
            stats.java_files, stats.resource_files
        ));
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut disabled = config.disabled_categories();
    disabled.extend(cli.disable.iter().copied());
    let analyzer = ProjectAnalyzer::new().with_disabled(disabled);
    let diagnostics = analyzer.run(&cli.path, &files, kb.as_ref(), &baseline);

    pb.finish_and_clear();

    // Step 5: Report
    Reporter::new(format, config.report.output.clone())
        .with_group_by(group_by)
        .report(&diagnostics)?;

    if interactive {
        println!(
            "{}",
            format!(
                "Checked {} files against API {} (target {}) in {:.2}s",
                stats.total(),
                baseline.min_sdk,
                baseline.target_sdk,
                start_time.elapsed().as_secs_f64()
            )
            .dimmed()
        );
    }

    if diagnostics.iter().any(|d| d.is_error()) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
