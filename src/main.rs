//! CLI entry point for projmatch.
//!
//! Manages the project catalog, builds the similarity index and answers
//! "which existing projects look like this one?" queries.

use anyhow::{Context, Result, anyhow, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use projmatch::display::{matches_table, projects_table, status_table};
use projmatch::vector::LoadOutcome;
use projmatch::{
    CatalogWatcher, ProjectCatalog, ProjectDraft, ProjectId, RebuildTrigger, Settings,
    SimilarityService,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Upper bound for waiting on a background rebuild before exiting.
const REBUILD_WAIT: Duration = Duration::from_secs(600);

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic project similarity search
#[derive(Parser)]
#[command(
    name = "projmatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Find existing projects similar to a new one",
    long_about = "Index a catalog of projects and query it for the closest matches to a title and summary.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Set up .projmatch directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Import projects from a CSV file (Title,Summary,Domain header) or a JSON array
    Import {
        /// File to import
        file: PathBuf,
    },

    /// Add a project
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: String,
        #[arg(long, default_value = "")]
        domain: String,
    },

    /// Replace a project's title, summary and domain
    Update {
        id: ProjectId,
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: String,
        #[arg(long, default_value = "")]
        domain: String,
    },

    /// Remove a project
    Remove {
        id: ProjectId,
    },

    /// List catalog projects
    List,

    /// Build the index (loads the snapshot when it is still valid)
    Index {
        /// Rebuild even if a valid snapshot exists
        #[arg(short, long)]
        force: bool,
    },

    /// Find the projects most similar to a title and summary
    Query {
        #[arg(long)]
        title: String,
        #[arg(long)]
        summary: String,
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show index and catalog status
    Status,

    /// Rebuild the index whenever the catalog file changes
    Watch,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow!("Configuration error loading from {}: {e}", path.display()))?,
        None => {
            if let Err(warning) = Settings::check_init() {
                tracing::warn!("{warning}");
                tracing::warn!("Using default configuration for now.");
            }
            Settings::load().map_err(|e| anyhow!("Configuration error: {e}"))?
        }
    };
    Ok(settings)
}

fn open_catalog(settings: &Settings) -> Result<ProjectCatalog> {
    let path = settings.resolved_catalog_path();
    ProjectCatalog::open(&path).with_context(|| format!("opening catalog {}", path.display()))
}

fn open_service(settings: &Settings, catalog: &ProjectCatalog) -> Result<Arc<SimilarityService>> {
    let service = SimilarityService::from_settings(settings, Arc::new(catalog.clone()))
        .context("initializing similarity service")?;
    Ok(Arc::new(service))
}

fn report_load(outcome: &LoadOutcome, elapsed: Duration) {
    match outcome {
        LoadOutcome::Loaded { count } => {
            println!("Loaded index snapshot with {count} projects in {elapsed:.2?}");
        }
        LoadOutcome::Rebuilt { count, .. } => {
            println!("Indexed {count} projects in {elapsed:.2?}");
        }
    }
}

/// Save the catalog, schedule a rebuild and wait for it to finish.
fn commit_changes(settings: &Settings, catalog: &ProjectCatalog) -> Result<()> {
    catalog.save().context("saving catalog")?;

    let service = open_service(settings, catalog)?;
    let before = service.rebuild_stats();
    if service.notify_projects_changed() != RebuildTrigger::Started {
        bail!("Rebuild worker is not running");
    }
    if !service.wait_for_rebuild(REBUILD_WAIT) {
        bail!("Timed out waiting for the index rebuild");
    }

    let after = service.rebuild_stats();
    if after.failed > before.failed {
        bail!("Catalog saved but the index rebuild failed; run 'projmatch index --force' to retry");
    }
    println!("Index updated ({} projects)", catalog.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        init_logging(cli.verbose);
        let path = Settings::init_config_file(*force).map_err(|e| anyhow!("{e}"))?;
        println!("Created configuration file at: {}", path.display());
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    init_logging(cli.verbose || settings.debug);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Config => {
            let toml = toml::to_string_pretty(&settings).context("serializing settings")?;
            println!("{toml}");
        }

        Commands::Import { file } => {
            let catalog = open_catalog(&settings)?;
            let imported = catalog
                .import_file(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("Imported {} projects from {}", imported.len(), file.display());
            commit_changes(&settings, &catalog)?;
        }

        Commands::Add {
            title,
            summary,
            domain,
        } => {
            let catalog = open_catalog(&settings)?;
            let project = catalog.insert(ProjectDraft::new(title, summary, domain))?;
            println!("Added project {}: {}", project.id, project.title);
            commit_changes(&settings, &catalog)?;
        }

        Commands::Update {
            id,
            title,
            summary,
            domain,
        } => {
            let catalog = open_catalog(&settings)?;
            let project = catalog.update(id, ProjectDraft::new(title, summary, domain))?;
            println!("Updated project {}: {}", project.id, project.title);
            commit_changes(&settings, &catalog)?;
        }

        Commands::Remove { id } => {
            let catalog = open_catalog(&settings)?;
            let project = catalog.remove(id)?;
            println!("Removed project {}: {}", project.id, project.title);
            commit_changes(&settings, &catalog)?;
        }

        Commands::List => {
            let catalog = open_catalog(&settings)?;
            if catalog.is_empty() {
                println!("No projects. Use 'projmatch add' or 'projmatch import' first.");
            } else {
                println!("{}", projects_table(&catalog.list()));
            }
        }

        Commands::Index { force } => {
            let catalog = open_catalog(&settings)?;
            let service = open_service(&settings, &catalog)?;
            let started = Instant::now();

            if force {
                service.notify_projects_changed();
                if !service.wait_for_rebuild(REBUILD_WAIT) {
                    bail!("Timed out waiting for the index rebuild");
                }
                if service.rebuild_stats().failed > 0 {
                    bail!("Index rebuild failed, see the log above");
                }
                println!(
                    "Indexed {} projects in {:.2?}",
                    service.status().entries.unwrap_or(0),
                    started.elapsed()
                );
            } else {
                let outcome = service.load_or_build()?;
                report_load(&outcome, started.elapsed());
            }
        }

        Commands::Query {
            title,
            summary,
            json,
        } => {
            let catalog = open_catalog(&settings)?;
            let service = open_service(&settings, &catalog)?;
            let outcome = service.load_or_build()?;
            tracing::debug!("Index ready with {} projects", outcome.count());

            let matches = service.query(&title, &summary).map_err(|e| {
                anyhow!(
                    "[{}] {e}\n{}",
                    e.status_code(),
                    e.recovery_suggestions().join("\n")
                )
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else if matches.is_empty() {
                println!("No similar projects found.");
            } else {
                println!("{}", matches_table(&matches));
            }
        }

        Commands::Status => {
            let catalog = open_catalog(&settings)?;
            let service = open_service(&settings, &catalog)?;
            if let Err(e) = service.index().load() {
                tracing::debug!("No usable snapshot: {e}");
            }
            println!("{}", status_table(&service.status(), catalog.len()));
        }

        Commands::Watch => {
            let catalog = open_catalog(&settings)?;
            let service = open_service(&settings, &catalog)?;
            let started = Instant::now();
            let outcome = service.load_or_build()?;
            report_load(&outcome, started.elapsed());

            let watcher =
                CatalogWatcher::new(catalog, Arc::clone(&service), settings.watch.debounce_ms)?;
            println!("Watching for catalog changes. Press Ctrl+C to stop.");

            tokio::select! {
                result = watcher.watch() => result?,
                _ = tokio::signal::ctrl_c() => {
                    println!("Stopping watcher...");
                }
            }

            service.wait_for_rebuild(REBUILD_WAIT);
        }
    }

    Ok(())
}
