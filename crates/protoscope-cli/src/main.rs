//! Protoscope CLI - searchable schema registry

use clap::{Parser, Subcommand};
use protoscope_core::config::Config;
use protoscope_core::domain::indexing::Indexer;
use protoscope_core::domain::registry::{RegistryRepository, RegistryRepositoryTrait};
use protoscope_core::domain::schema::JsonSchemaParser;
use protoscope_core::domain::search::{
    SearchRepository, SearchRequest, SearchService, compile, parse_query,
};
use protoscope_core::storage::Database;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};


#[derive(Parser)]
#[command(name = "protoscope")]
#[command(author, version, about = "Searchable schema registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database file (overrides config and PROTOSCOPE_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage modules
    Module {
        #[command(subcommand)]
        action: ModuleAction,
    },

    /// Publish a version of a module from schema files
    Publish {
        /// Module name
        module: String,
        /// Version string
        version: String,
        /// Schema files (JSON AST)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Module this version depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        /// Index the version right after publishing
        #[arg(long)]
        index: bool,
    },

    /// Index one version of a module
    Index {
        /// Module name
        module: String,
        /// Version string
        version: String,
    },

    /// Rebuild the index for every version
    Reindex,

    /// Search indexed schema entities
    Search {
        /// Query, e.g. `user email entity:field module:acme/*`
        query: String,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<i64>,
        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Show how the query compiles without running it
        #[arg(long)]
        explain: bool,
        /// Don't record the query in the search history
        #[arg(long)]
        no_history: bool,
    },

    /// Suggest past queries starting with a prefix
    Suggest {
        prefix: String,
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Show recent searches
    History {
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ModuleAction {
    /// Create a module
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List all modules
    List,
    /// List the versions of a module
    Versions { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.quiet) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        if let Some(core) = e.downcast_ref::<protoscope_core::Error>() {
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Hint: {}", suggestion);
            }
            eprintln!("  Code: {}", core.code());
        }
        std::process::exit(1);
    }
}

/// Log to stderr so `--format json` output stays parseable
fn init_tracing(quiet: bool) -> anyhow::Result<()> {
    let directive = if quiet { "protoscope=warn" } else { "protoscope=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Config { action } => cmd_config(action, quiet),

        Commands::Doctor => cmd_doctor(cli.database.as_deref(), quiet).await,

        command => {
            let config = Config::load()?;
            let db = open_database(cli.database.as_deref(), &config).await?;
            let result = dispatch(&db, &config, command, format, quiet).await;
            db.close().await;
            result
        }
    }
}

async fn open_database(path: Option<&Path>, config: &Config) -> anyhow::Result<Database> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.database.resolved_path());
    Database::open(path).await
}

async fn dispatch(
    db: &Database,
    config: &Config,
    command: Commands,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Module { action } => cmd_module(db, action, format, quiet).await,

        Commands::Publish {
            module,
            version,
            files,
            depends_on,
            index,
        } => {
            cmd_publish(db, config, &module, &version, &files, &depends_on, index, format, quiet)
                .await
        }

        Commands::Index { module, version } => {
            cmd_index(db, config, &module, &version, format, quiet).await
        }

        Commands::Reindex => cmd_reindex(db, config, format, quiet).await,

        Commands::Search {
            query,
            limit,
            offset,
            explain,
            no_history,
        } => {
            if explain {
                return cmd_explain(&query, format);
            }
            let request = SearchRequest {
                query,
                limit,
                offset,
            };
            cmd_search(db, config, &request, !no_history, format, quiet).await
        }

        Commands::Suggest { prefix, limit } => {
            let service = search_service(db, config);
            let suggestions = service.get_suggestions(&prefix, limit).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else if suggestions.is_empty() {
                if !quiet {
                    println!("No suggestions for '{}'.", prefix);
                }
            } else {
                for s in suggestions {
                    println!("{} ({}x)", s.query, s.frequency);
                }
            }
            Ok(())
        }

        Commands::History { limit } => {
            let service = search_service(db, config);
            let entries = service.recent_searches(limit).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                if !quiet {
                    println!("No searches recorded yet.");
                }
            } else {
                for entry in entries {
                    println!(
                        "{}  {}  ({} results, {} ms)",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.query,
                        entry.result_count,
                        entry.duration_ms
                    );
                }
            }
            Ok(())
        }

        Commands::Config { .. } | Commands::Doctor => Ok(()),
    }
}

fn search_service(db: &Database, config: &Config) -> SearchService {
    SearchService::from_pool(db.pool().clone(), config.search.clone())
}

fn indexer(db: &Database, config: &Config) -> Indexer {
    Indexer::new(
        Arc::new(RegistryRepository::new(db.pool().clone())),
        Arc::new(SearchRepository::new(db.pool().clone())),
        Arc::new(JsonSchemaParser::new()),
        &config.indexing,
    )
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_module(
    db: &Database,
    action: ModuleAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let registry = RegistryRepository::new(db.pool().clone());
    match action {
        ModuleAction::Create { name, description } => {
            let module = registry.create_module(&name, &description).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&module)?);
            } else if !quiet {
                println!("Module '{}' created.", module.name);
                println!("\nNext: protoscope publish {} <version> <files>", module.name);
            }
        }
        ModuleAction::List => {
            let modules = registry.list_modules().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&modules)?);
            } else if modules.is_empty() {
                if !quiet {
                    println!("No modules found.");
                    println!("\nCreate one with: protoscope module create <name>");
                }
            } else {
                for m in modules {
                    if m.description.is_empty() {
                        println!("{}", m.name);
                    } else {
                        println!("{} - {}", m.name, m.description);
                    }
                }
            }
        }
        ModuleAction::Versions { name } => {
            if registry.get_module(&name).await?.is_none() {
                return Err(protoscope_core::Error::ModuleNotFound(name).into());
            }
            let versions = registry.list_versions(&name).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else {
                for v in versions {
                    if v.dependencies.is_empty() {
                        println!("{}", v.version);
                    } else {
                        println!("{} (depends on {})", v.version, v.dependencies.join(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_publish(
    db: &Database,
    config: &Config,
    module: &str,
    version: &str,
    files: &[PathBuf],
    depends_on: &[String],
    index: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut contents = Vec::with_capacity(files.len());
    for path in files {
        let content = std::fs::read_to_string(path)
            .map_err(|_| protoscope_core::Error::FileNotFound(path.display().to_string()))?;
        contents.push((stored_path(path), content));
    }

    let registry = RegistryRepository::new(db.pool().clone());
    let published = registry
        .publish_version(module, version, &contents, depends_on)
        .await?;

    let stats = if index {
        Some(indexer(db, config).index_version_id(published.id).await?)
    } else {
        None
    };

    if format == OutputFormat::Json {
        let out = serde_json::json!({ "version": published, "index": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !quiet {
        println!(
            "Published {}@{} ({} files)",
            published.module_name,
            published.version,
            contents.len()
        );
        match stats {
            Some(stats) => println!("Indexed {} entities", stats.entities),
            None => println!("\nNext: protoscope index {} {}", module, published.version),
        }
    }
    Ok(())
}

/// Path recorded for a published file, with forward slashes
fn stored_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

async fn cmd_index(
    db: &Database,
    config: &Config,
    module: &str,
    version: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let stats = indexer(db, config).index_version(module, version).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if !quiet {
        println!(
            "Indexed {}@{}: {} entities from {}/{} files in {} ms",
            module, version, stats.entities, stats.files_indexed, stats.files_total, stats.duration_ms
        );
    }
    for diagnostic in &stats.diagnostics {
        println!("  skipped {}: {}", diagnostic.path, diagnostic.message);
    }
    Ok(())
}

async fn cmd_reindex(
    db: &Database,
    config: &Config,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current version");
            on_interrupt.cancel();
        }
    });

    let summary = indexer(db, config).reindex_all(&cancel).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !quiet {
        println!(
            "Reindexed {}/{} versions ({} entities)",
            summary.versions_indexed, summary.versions_total, summary.entities
        );
        for failure in &summary.failures {
            println!("  [!!] {}@{}: {}", failure.module, failure.version, failure.error);
        }
    }

    if summary.versions_failed() > 0 {
        anyhow::bail!("{} version(s) failed to index", summary.versions_failed());
    }
    Ok(())
}

async fn cmd_search(
    db: &Database,
    config: &Config,
    request: &SearchRequest,
    record: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let service = search_service(db, config);
    let response = if record {
        service.search_and_record(request).await?
    } else {
        service.search(request).await?
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for warning in &response.warnings {
        eprintln!("Warning: {}", warning);
    }

    if response.results.is_empty() {
        if !quiet {
            println!("No results for '{}'.", response.query);
        }
        return Ok(());
    }

    for hit in &response.results {
        let location = match hit.entity.line_number {
            Some(line) => format!("{}:{}", hit.entity.proto_file_path, line),
            None => hit.entity.proto_file_path.clone(),
        };
        let detail = match (&hit.entity.field_type, &hit.entity.method_input_type) {
            (Some(field_type), _) => format!(" : {}", field_type),
            (None, Some(input)) => format!(
                " ({}) -> {}",
                input,
                hit.entity.method_output_type.as_deref().unwrap_or("")
            ),
            _ => String::new(),
        };
        println!(
            "{:<10} {}{}  [{}@{} {}]",
            hit.entity.entity_type.as_str(),
            hit.entity.full_path,
            detail,
            hit.module_name,
            hit.version,
            location
        );
        if !quiet && !hit.entity.description.is_empty() {
            println!("           {}", hit.entity.description);
        }
    }

    if !quiet {
        let shown = request.offset + response.results.len() as i64;
        println!("\nShowing {} of {} results", response.results.len(), response.total_count);
        if response.has_more(request.offset) {
            println!("Next page: --offset {}", shown);
        }
    }
    Ok(())
}

fn cmd_explain(query: &str, format: OutputFormat) -> anyhow::Result<()> {
    let parsed = parse_query(query)?;
    let compiled = compile(&parsed);

    if format == OutputFormat::Json {
        let out = serde_json::json!({
            "parsed": parsed,
            "expression": compiled.expression_string(),
            "fts": compiled.fts_query(),
            "filters": compiled.clauses(),
            "warnings": compiled.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Expression: {}",
        compiled.expression_string().unwrap_or_else(|| "(none)".to_string())
    );
    if let Some(fts) = compiled.fts_query() {
        println!("FTS5: {}", fts);
    }
    for clause in compiled.clauses() {
        println!("Filter: {}  {:?}", clause.sql, clause.params);
    }
    for warning in &compiled.warnings {
        println!("Warning: {}", warning);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<&Path>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Protoscope Health Check");
        println!("=======================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            Config::default()
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    match open_database(database, &config).await {
        Ok(db) => {
            match db.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Database: Connected");
                        println!("     Path: {}", db.path().display());
                    }
                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => {
                            all_ok = false;
                            if !quiet {
                                println!(
                                    "[!!] Database: Migrations pending (v{} -> v{})",
                                    status.current_version, status.target_version
                                );
                            }
                        }
                        Ok(status) => {
                            if !quiet {
                                println!("[OK] Database: Schema v{}", status.current_version);
                            }
                        }
                        Err(e) => {
                            all_ok = false;
                            if !quiet {
                                println!("[!!] Database: Migration check failed - {}", e);
                            }
                        }
                    }

                    let registry = RegistryRepository::new(db.pool().clone());
                    let modules = registry.list_modules().await.unwrap_or_default();
                    if !quiet {
                        println!("     Modules: {}", modules.len());
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: Health check failed - {}", e);
                    }
                }
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to open - {}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    info!(healthy = all_ok, "Health check finished");
    Ok(())
}
