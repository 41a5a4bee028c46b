use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use colrun::{
    config::{load_config, SettingsBuilder},
    env::FileEnvStore,
    executor::ReqwestTransport,
    importer::{import_postman, ImportOptions},
    logging::init_logging,
    runner::{
        discover_requests, find_collection_root,
        report::{print_report, write_json_report},
        CollectionRunner,
    },
    template::PmHelpers,
};

#[derive(Parser, Debug)]
#[command(
    name = "colrun",
    version,
    about = "Run YAML HTTP request collections",
    disable_help_subcommand = true
)]
struct Cli {
    /// Debug output on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a collection directory or a single request file
    Run {
        /// Collection directory or .yaml request file
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Request timeout in seconds (overrides colrun.json)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Directory for run logs (defaults to <root>/logs)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Do not write a log file
        #[arg(long)]
        no_log_file: bool,

        /// Write the run results as JSON
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Convert a Postman v2.1 collection into a colrun collection
    Import {
        /// Postman collection export (.json)
        #[arg(value_name = "COLLECTION")]
        collection: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Postman environment export (.json)
        #[arg(short, long)]
        environment: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Run {
            target,
            timeout,
            log_dir,
            no_log_file,
            report,
        } => {
            run_collection(
                resolve_path(&target)?,
                timeout,
                log_dir.map(|p| resolve_relative(&cwd, &p)),
                no_log_file,
                report.map(|p| resolve_relative(&cwd, &p)),
                cli.verbose,
            )
            .await
        }
        Commands::Import {
            collection,
            output,
            environment,
        } => {
            init_logging(None, cli.verbose)?;
            let options = ImportOptions {
                collection: resolve_relative(&cwd, &collection),
                output: resolve_relative(&cwd, &output),
                environment: environment.map(|p| resolve_relative(&cwd, &p)),
            };
            let result = import_postman(&options).context("importing Postman collection")?;

            println!(
                "{} {} folder(s), {} request(s), {} hook(s), {} variable(s) into {}",
                "Imported".green().bold(),
                result.folders.len(),
                result.requests.len(),
                result.hooks.len(),
                result.variables,
                options.output.display().to_string().cyan()
            );
            for warning in &result.warnings {
                println!("  {} {}", "warning:".yellow(), warning);
            }
            Ok(())
        }
    }
}

async fn run_collection(
    target: PathBuf,
    timeout: Option<u64>,
    log_dir: Option<PathBuf>,
    no_log_file: bool,
    report_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let target = target
        .canonicalize()
        .with_context(|| format!("path not found: {}", target.display()))?;
    let root = find_collection_root(&target)?;
    let config = load_config(&root).context("loading configuration")?;
    let settings = SettingsBuilder::new(root.clone(), config)
        .timeout_secs(timeout)
        .log_dir(log_dir)
        .build();

    let log_file = init_logging((!no_log_file).then_some(settings.log_dir.as_path()), verbose)?;

    let targets = discover_requests(&target)?;
    let store = FileEnvStore::for_collection(&root);
    let transport = ReqwestTransport::new(settings.timeout).context("creating HTTP client")?;
    let helpers = PmHelpers;

    let report = CollectionRunner::new(&store, &transport, &helpers, &settings)
        .run(&targets)
        .await;

    print_report(&report);
    if let Some(path) = report_path {
        write_json_report(&report, &path)?;
        println!("{} {}", "Report:".bold(), path.display().to_string().cyan());
    }
    if let Some(path) = log_file {
        println!("{} {}", "Log:".bold(), path.display().to_string().dimmed());
    }

    report.check()?;
    Ok(())
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
