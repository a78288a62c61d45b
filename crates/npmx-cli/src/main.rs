//! npmx - run npm package operations for a project from the command line.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use npmx_core::{Commander, CommandRunner, DependencyType, Package, PackageModel};
use npmx_npm::{NpmConfig, NpmRunner, ProjectController};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "npmx", version, about = "Run npm package operations for a project")]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Project directory containing package.json"
    )]
    dir: PathBuf,
    #[arg(long, global = true, help = "Path to the npm executable")]
    npm: Option<PathBuf>,
    #[arg(long, global = true, help = "JSON configuration file")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Do not search for npm when the configured path is unusable"
    )]
    no_fallback: bool,
    #[arg(long, global = true, help = "Kill npm after this many seconds")]
    timeout: Option<u64>,
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity"
    )]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a package into the project
    Install {
        package: String,
        #[arg(long, default_value = "", help = "Version range, e.g. ^4.0.0")]
        range: String,
        #[arg(long, value_enum, default_value_t = SaveAs::Prod)]
        save: SaveAs,
        #[arg(short, long)]
        global: bool,
    },
    /// Remove a package from the project
    Uninstall {
        package: String,
        #[arg(short, long)]
        global: bool,
    },
    /// Search the registry
    Search {
        query: String,
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
    /// Update the given packages, or all of them
    Update { packages: Vec<String> },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SaveAs {
    Prod,
    Dev,
    Optional,
}

impl From<SaveAs> for DependencyType {
    fn from(save: SaveAs) -> Self {
        match save {
            SaveAs::Prod => DependencyType::Standard,
            SaveAs::Dev => DependencyType::Development,
            SaveAs::Optional => DependencyType::Optional,
        }
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(cli: &Cli) -> Result<NpmConfig> {
    let mut config = match &cli.config {
        Some(path) => NpmConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => NpmConfig::default(),
    };
    if let Some(npm) = &cli.npm {
        config.npm_path = Some(npm.clone());
    }
    if cli.no_fallback {
        config.use_fallback = false;
    }
    if cli.timeout.is_some() {
        config.timeout_secs = cli.timeout;
    }
    Ok(config)
}

fn print_results(results: &[Package], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    for package in results {
        println!(
            "{}@{}  {}",
            package.name, package.version, package.description
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = load_config(&cli)?;
    let dir = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", cli.dir.display()))?;

    info!("Starting npmx in {}", dir.display());

    let model = Arc::new(ProjectController::new(dir, config.clone()));
    let runner: Arc<dyn CommandRunner> = Arc::new(NpmRunner::new(config));
    let commander = Arc::new(Commander::new(
        Arc::clone(&model) as Arc<dyn PackageModel>,
        runner,
    ));

    // Ctrl-C stops npm; the operation below still completes and reports failure.
    let on_interrupt = Arc::clone(&commander);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling npm");
            on_interrupt.cancel_current_command();
        }
    });

    let success = match cli.command {
        Commands::Install {
            package,
            range,
            save,
            global,
        } => {
            commander
                .install_package_detailed(&package, &range, save.into(), global)
                .await
                .success
        }
        Commands::Uninstall { package, global } => {
            commander
                .uninstall_package_detailed(&package, global)
                .await
                .success
        }
        Commands::Search { query, json } => {
            let result = commander.search_detailed(&query).await;
            if result.success {
                print_results(&result.value, json)?;
            }
            result.success
        }
        Commands::Update { packages } => {
            let packages: Vec<Package> = packages
                .into_iter()
                .map(|name| Package::new(name, "", ""))
                .collect();
            commander.update_packages(&packages).await
        }
    };

    commander.dispose();

    if success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
