use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use cte2dbt_core::{Config, DialectConfig};
use cte2dbt_dbt::{DbtNaming, DbtProject, DependencyGraph, ModelFile, NodeKind, SourcesFile};
use cte2dbt_sql::{Model, Provider, SourceRegistry, SqlParser};

/// cte2dbt - Split CTE-heavy SQL queries into dbt models
#[derive(Parser)]
#[command(name = "cte2dbt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: cte2dbt.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split queries into one dbt model per CTE plus a final model
    Split {
        /// SQL file, or directory searched for .sql files
        path: PathBuf,

        /// Final model name (default: file stem; single file only)
        #[arg(short, long)]
        name: Option<String>,

        /// Models directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// SQL dialect (overrides config)
        #[arg(short, long)]
        dialect: Option<DialectConfig>,

        /// Replace existing files
        #[arg(long)]
        overwrite: bool,

        /// Print the generated models instead of writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show which units and sources each model depends on
    Deps {
        /// SQL file to analyze
        file: PathBuf,

        /// Print the dependency map as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?,
        None => Config::discover().context("Failed to load cte2dbt.toml")?,
    };

    if cli.verbose {
        eprintln!("{} dialect: {:?}", "Using".cyan(), config.dialect);
    }

    match cli.command {
        Commands::Split {
            path,
            name,
            out,
            dialect,
            overwrite,
            dry_run,
        } => {
            let options = SplitOptions {
                name,
                out,
                dialect,
                overwrite,
                dry_run,
            };
            split_command(&config, &path, options, cli.verbose)
        }
        Commands::Deps { file, json } => deps_command(&config, &file, json),
    }
}

struct SplitOptions {
    name: Option<String>,
    out: Option<PathBuf>,
    dialect: Option<DialectConfig>,
    overwrite: bool,
    dry_run: bool,
}

/// Split command - one decomposition per SQL file, sources shared across files
fn split_command(config: &Config, path: &Path, options: SplitOptions, verbose: bool) -> Result<()> {
    let files = sql_files(path)?;
    if files.is_empty() {
        bail!("No .sql files found under {}", path.display());
    }
    if options.name.is_some() && files.len() > 1 {
        bail!("--name only applies when splitting a single file");
    }

    let parser = SqlParser::from_dialect(options.dialect.unwrap_or(config.dialect));
    let mut project = DbtProject::from_config(config)
        .with_overwrite(config.output.overwrite || options.overwrite);
    if let Some(out) = &options.out {
        project = project.with_models_dir(out);
    }

    let mut registry = SourceRegistry::new();
    let mut model_files: Vec<ModelFile> = Vec::new();
    let mut sources = SourcesFile {
        version: 2,
        sources: Vec::new(),
    };

    for file in &files {
        let final_model = match &options.name {
            Some(name) => name.clone(),
            None => file_stem(file)?,
        };

        if verbose {
            eprintln!("  {} {} as {}", "Splitting".cyan(), file.display(), final_model.green());
        }

        let naming = DbtNaming::new(&config.dbt, final_model);
        let (models, next_registry) = decompose_file(&parser, file, &naming, registry)?;
        registry = next_registry;

        let planned = project
            .plan_models(&models, &naming)
            .with_context(|| format!("Failed to plan models for {}", file.display()))?;
        if let Some(clash) = planned
            .iter()
            .find(|planned| model_files.iter().any(|existing| existing.path == planned.path))
        {
            bail!(
                "Model '{}' from {} is produced by another file too",
                clash.model,
                file.display()
            );
        }
        model_files.extend(planned);

        // The registry carries every earlier file's sources
        sources = SourcesFile::from_registry(&registry, &naming)
            .with_context(|| format!("Failed to collect sources for {}", file.display()))?;
    }

    if options.dry_run {
        for file in &model_files {
            println!("{}", format!("-- {}", file.path.display()).bright_blue());
            println!("{}", file.sql);
        }
        if !sources.is_empty() {
            println!("{}", format!("# {}", project.sources_path().display()).bright_blue());
            print!("{}", sources.to_yaml()?);
        }
        return Ok(());
    }

    project
        .write_models(&model_files)
        .context("Failed to write models")?;
    if !sources.is_empty() {
        project
            .write_sources(&sources)
            .context("Failed to write sources")?;
    }

    print_split_summary(&project, &model_files, &sources, files.len());

    Ok(())
}

/// Deps command - dependency map and build order of one query
fn deps_command(config: &Config, file: &Path, json: bool) -> Result<()> {
    let parser = SqlParser::from_dialect(config.dialect);
    let naming = DbtNaming::new(&config.dbt, file_stem(file)?);

    let query = parser
        .parse_query_file(file)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    let mut provider = Provider::new(
        naming.final_model(),
        &query,
        naming.unit_namer(),
        naming.source_renderer(),
    )
    .with_context(|| format!("Failed to decompose {}", file.display()))?;

    let dependencies = provider.dependencies()?;
    let models = provider.models()?;
    for model in models {
        naming
            .model_name_for(&model.unit)
            .with_context(|| format!("Cannot name the models of {}", file.display()))?;
    }
    let graph = DependencyGraph::from_models(models);

    if json {
        println!("{}", serde_json::to_string_pretty(&dependencies)?);
        return Ok(());
    }

    println!("{}", "Dependencies".bold().bright_blue());
    for (unit, deps) in &dependencies {
        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
        println!("  {} <- [{}]", unit.green(), deps.join(", "));
    }
    println!();

    match graph.build_order() {
        Some(order) => {
            println!("{}", "Build order".bold().bright_blue());
            for (i, model) in order.iter().enumerate() {
                println!("  {}. {}", i + 1, model);
            }
        }
        None => {
            tracing::warn!(file = %file.display(), "Dependency cycle detected");
            println!("{}", "⚠ Models depend on each other in a cycle (recursive CTE?)".yellow().bold());
        }
    }

    let source_count = graph
        .all_nodes()
        .into_iter()
        .filter(|node| graph.kind(node) == Some(NodeKind::Source))
        .count();
    println!();
    println!("{} {}", "Sources:".bold(), source_count);

    Ok(())
}

fn decompose_file(
    parser: &SqlParser,
    file: &Path,
    naming: &DbtNaming,
    registry: SourceRegistry,
) -> Result<(Vec<Model>, SourceRegistry)> {
    let query = parser
        .parse_query_file(file)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let mut provider = Provider::with_registry(
        naming.final_model(),
        &query,
        naming.unit_namer(),
        naming.source_renderer(),
        registry,
    )
    .with_context(|| format!("Failed to decompose {}", file.display()))?;

    let models = provider
        .models()
        .with_context(|| format!("Failed to rewrite {}", file.display()))?
        .to_vec();

    Ok((models, provider.into_registry()))
}

fn sql_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        let is_sql = entry.path().extension().is_some_and(|ext| ext == "sql");
        if entry.file_type().is_file() && is_sql {
            files.push(entry.into_path());
        } else if entry.file_type().is_file() {
            tracing::debug!(path = %entry.path().display(), "Skipping non-SQL file");
        }
    }

    Ok(files)
}

fn file_stem(file: &Path) -> Result<String> {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| format!("Cannot derive a model name from {}", file.display()))
}

fn print_split_summary(project: &DbtProject, models: &[ModelFile], sources: &SourcesFile, file_count: usize) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "cte2dbt Split Summary".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Files split:".bold(), file_count);
    println!("{} {}", "Models written:".bold(), models.len().to_string().green());
    for model in models {
        println!("  {} {}", "✓".green(), model.model);
    }

    let table_count: usize = sources.sources.iter().map(|source| source.tables.len()).sum();
    println!(
        "{} {} in {} source(s)",
        "Source tables:".bold(),
        table_count.to_string().green(),
        sources.sources.len()
    );
    println!();
    println!("{} {}", "Output:".bold(), project.models_dir().display());
    println!("{}", "=".repeat(60).bright_blue());
}
