use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deps_builder::config::{BuildConfig, ConfigFile, Overrides};
use deps_builder::descriptor::{load_manifest, DescriptorTable};
use deps_builder::orchestrator::{self, graph::resolve_order, ProjectStatus};
use deps_builder::process::{cancel_on_interrupt, CancelToken};
use deps_builder::toolchain::Platform;
use deps_builder::{libs, preflight};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "deps-builder", version, about = "Build the media server's native dependencies")]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./deps-builder.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, prepare and build projects and their dependencies
    Build {
        /// linux, windows, android or darwin
        #[arg(long)]
        platform: Option<Platform>,
        /// Cross-compile for this triplet, e.g. x86_64-w64-mingw32
        #[arg(long)]
        host: Option<String>,
        /// Projects built concurrently
        #[arg(short, long)]
        jobs: Option<usize>,
        /// TOML manifest replacing the built-in table
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Projects to build (default: all)
        projects: Vec<String>,
    },
    /// Print the resolved build order
    List {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Validate the table and check host tools
    Check {
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Remove source and build trees
    Clean {
        /// Also remove downloaded archives
        #[arg(long)]
        downloads: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Build {
            platform,
            host,
            jobs,
            manifest,
            projects,
        } => {
            let overrides = Overrides {
                platform,
                host_triplet: host,
                jobs,
                manifest,
            };
            let config = resolve_config(config_path, overrides)?;
            let table = load_table(config.manifest.as_deref())?;
            cmd_build(&table, &config, &projects)
        }
        Commands::List { manifest } => {
            let overrides = Overrides {
                manifest,
                ..Default::default()
            };
            let config = resolve_config(config_path, overrides)?;
            let table = load_table(config.manifest.as_deref())?;
            cmd_list(&table)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check {
            platform,
            host,
            manifest,
        } => {
            let overrides = Overrides {
                platform,
                host_triplet: host,
                manifest,
                ..Default::default()
            };
            let config = resolve_config(config_path, overrides)?;
            let table = load_table(config.manifest.as_deref())?;
            cmd_check(&table, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Clean { downloads } => {
            let config = resolve_config(config_path, Overrides::default())?;
            for path in orchestrator::clean(&config, downloads)? {
                println!("removed {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config(path: Option<&Path>, overrides: Overrides) -> Result<BuildConfig> {
    let file = ConfigFile::discover(path).context("loading configuration")?;
    BuildConfig::resolve(file, overrides).context("resolving configuration")
}

fn load_table(manifest: Option<&Path>) -> Result<DescriptorTable> {
    match manifest {
        Some(path) => load_manifest(path)
            .with_context(|| format!("loading manifest '{}'", path.display())),
        None => libs::media_server_libs().context("building the built-in project table"),
    }
}

fn cmd_build(table: &DescriptorTable, config: &BuildConfig, projects: &[String]) -> Result<ExitCode> {
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel);
    let report = orchestrator::run_with_cancel(projects, table, config, cancel)?;

    println!(
        "{} built, {} skipped, {} not started",
        report.count(ProjectStatus::Built),
        report.count(ProjectStatus::Skipped),
        report.count(ProjectStatus::NotStarted),
    );
    if let Some(failure) = report.failure() {
        let stage = failure
            .stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown stage".to_string());
        eprintln!(
            "error: {} failed during {}: {}",
            failure.project, stage, failure.message
        );
        return Ok(ExitCode::FAILURE);
    }
    if !report.is_success() {
        eprintln!("error: run stopped before every project finished");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(table: &DescriptorTable) -> Result<()> {
    for name in resolve_order(table, &[])? {
        let Some(d) = table.get(&name) else { continue };
        if d.dependencies.is_empty() {
            println!("{:<16} {:<16} {}", d.name, d.build_kind, d.version());
        } else {
            println!(
                "{:<16} {:<16} {:<12} <- {}",
                d.name,
                d.build_kind,
                d.version(),
                d.dependencies.join(", ")
            );
        }
    }
    Ok(())
}

fn cmd_check(table: &DescriptorTable, config: &BuildConfig) -> Result<()> {
    let order = resolve_order(table, &[])?;
    println!("{} projects, order resolves", order.len());
    preflight::check_projects(table.iter(), &config.toolchain)?;
    println!("host tools for {} present", config.platform());
    Ok(())
}
