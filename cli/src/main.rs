use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rdb_core::{Ulid, UlidGenerator};
use rdb_sqlite::render::{self, RenderOptions};
use rdb_sqlite::{
    BackupOptions, BackupOutcome, Connection, Database, RestructureReport, SchemaProvider,
    StoreConfig, drop_tables,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod sample;

use sample::{MemberSchema, TransactionSchema};

/// Output format for `query`.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum QueryFormat {
    /// Tab-delimited text.
    Tab,
    /// JSON array of objects.
    Json,
    /// One line per row, fields separated by ` | `.
    Rows,
}

#[derive(Debug, Parser)]
#[command(name = "rdb")]
#[command(version)]
#[command(about = "Open, reconcile, query, migrate and back up embedded databases")]
struct Cli {
    /// YAML store configuration (database paths, open options, backup settings).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a sample database, creating missing objects and reconciling its schema.
    Open(OpenArgs),
    /// Run SQL and print the result.
    Query(QueryArgs),
    /// Move tables from one sample database into another.
    Migrate(MigrateArgs),
    /// Copy a database file while it stays usable.
    Backup(BackupArgs),
    /// Generate and inspect identifiers.
    Id(IdArgs),
}

#[derive(Debug, Args)]
struct OpenArgs {
    /// Database file path (defaults to the configured master or transaction path).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Use the transaction catalog instead of the member catalog.
    #[arg(long)]
    transaction: bool,
    /// Drop and recreate every catalog object.
    #[arg(long)]
    recreate: bool,
    /// Skip the schema reconciliation pass.
    #[arg(long)]
    no_check: bool,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Database file path (defaults to the configured master path).
    #[arg(long)]
    db: Option<PathBuf>,
    /// SQL text to run.
    #[arg(long)]
    sql: String,
    /// Output format.
    #[arg(long, default_value = "tab")]
    format: QueryFormat,
    /// Print column names first.
    #[arg(long)]
    header: bool,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Source database (transaction catalog).
    #[arg(long)]
    from: PathBuf,
    /// Destination database (member catalog).
    #[arg(long)]
    to: PathBuf,
    /// Comma-separated tables to migrate (default: every source table).
    #[arg(long)]
    tables: Option<String>,
    /// Drop migrated tables from the source afterwards.
    #[arg(long)]
    drop_source: bool,
}

#[derive(Debug, Args)]
struct BackupArgs {
    /// Database file path (defaults to the configured master path).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Backup file to write.
    #[arg(long)]
    dest: PathBuf,
    /// Pages copied per step.
    #[arg(long)]
    pages_per_step: Option<i32>,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[command(subcommand)]
    operation: IdOperation,
}

#[derive(Debug, Subcommand)]
enum IdOperation {
    /// Generate new identifiers.
    New {
        /// Number of identifiers.
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Fixed millisecond timestamp instead of the current time.
        #[arg(long)]
        at_ms: Option<u64>,
    },
    /// Show the parts of a 26-character identifier.
    Decode {
        /// Identifier text.
        text: String,
    },
    /// Convert 32 hex characters to identifier text.
    Hex {
        /// Hex digits.
        hex: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Command::Open(args) => run_open(args, &config),
        Command::Query(args) => run_query(args, &config),
        Command::Migrate(args) => run_migrate(args, &config),
        Command::Backup(args) => run_backup(args, &config),
        Command::Id(args) => run_id(args),
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<StoreConfig, String> {
    match path {
        Some(path) => {
            let config = StoreConfig::load(path)
                .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?;
            debug!(path = %path.display(), ?config, "configuration loaded");
            Ok(config)
        }
        None => Ok(StoreConfig::default()),
    }
}

fn resolve_path(explicit: Option<PathBuf>, configured: Option<&PathBuf>, what: &str) -> Result<PathBuf, String> {
    explicit
        .or_else(|| configured.cloned())
        .ok_or_else(|| format!("No database path: pass --db or set {what} in --config"))
}

// ---------------------------------------------------------------------------
// open command
// ---------------------------------------------------------------------------

fn run_open(args: OpenArgs, config: &StoreConfig) -> Result<(), String> {
    if args.transaction {
        let path = resolve_path(args.db.clone(), config.transaction_path.as_ref(), "transaction_path")?;
        open_and_check(Database::new(TransactionSchema, path), &args, config)
    } else {
        let path = resolve_path(args.db.clone(), config.master_path.as_ref(), "master_path")?;
        open_and_check(Database::new(MemberSchema, path), &args, config)
    }
}

fn open_and_check<P: SchemaProvider>(
    db: Database<P>,
    args: &OpenArgs,
    config: &StoreConfig,
) -> Result<(), String> {
    let mut db = db.with_options(config.open.clone());
    if args.recreate {
        db.recreate_objects();
    }
    db.open(true)
        .map_err(|e| format!("Failed to open database '{}': {e}", db.path().display()))?;
    println!(
        "Opened '{}' ({}).",
        db.path().display(),
        if db.is_new_database() { "created" } else { "existing" }
    );

    if !args.no_check {
        let report = db
            .check_schema_and_restructure()
            .map_err(|e| format!("Schema check failed: {e}"))?;
        print_restructure_report(&report);
    }
    db.close().map_err(|e| format!("Failed to close database: {e}"))
}

fn print_restructure_report(report: &RestructureReport) {
    if report.is_unchanged() {
        println!("Schema up to date.");
        return;
    }
    println!("Restructure complete:");
    println!("  Tables rebuilt: {}", report.rebuilt.join(", "));
    println!("  Old tables dropped: {}", report.dropped.len());
    for (table, error) in &report.failed {
        println!("  Failed: {table}: {error}");
    }
}

// ---------------------------------------------------------------------------
// query command
// ---------------------------------------------------------------------------

fn run_query(args: QueryArgs, config: &StoreConfig) -> Result<(), String> {
    let path = resolve_path(args.db, config.master_path.as_ref(), "master_path")?;
    let conn = Connection::open(&path, &config.open)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?;
    let mut stmt = conn.prepare(&args.sql).map_err(|e| format!("Invalid SQL: {e}"))?;
    let mut cursor = stmt.query().map_err(|e| format!("Query failed: {e}"))?;

    let output = match args.format {
        QueryFormat::Tab => render::tab_delimited(
            &mut cursor,
            RenderOptions {
                include_row_count: false,
                include_header: args.header,
                use_actual_tab: true,
            },
        )
        .map(|text| text.replace("\r\n", "\n")),
        QueryFormat::Json => render::json(&mut cursor)
            .and_then(|value| serde_json::to_string_pretty(&value).map_err(Into::into)),
        QueryFormat::Rows => render::rows(&mut cursor, args.header).map(|rows| {
            rows.iter()
                .map(|row| row.join(" | "))
                .collect::<Vec<_>>()
                .join("\n")
        }),
    }
    .map_err(|e| format!("Query failed: {e}"))?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate command
// ---------------------------------------------------------------------------

fn run_migrate(args: MigrateArgs, config: &StoreConfig) -> Result<(), String> {
    let mut source = Database::new(TransactionSchema, &args.from).with_options(config.open.clone());
    source
        .open(false)
        .map_err(|e| format!("Failed to open source '{}': {e}", args.from.display()))?;
    let mut dest = Database::new(MemberSchema, &args.to).with_options(config.open.clone());
    dest.open(true)
        .map_err(|e| format!("Failed to open destination '{}': {e}", args.to.display()))?;

    let tables = parse_csv_list(args.tables);
    let table_refs: Vec<&str> = tables.iter().map(String::as_str).collect();
    let selection = (!table_refs.is_empty()).then_some(table_refs.as_slice());

    let source_conn = source.connection().map_err(|e| e.to_string())?;
    let report = dest
        .migrate_from(source_conn, selection)
        .map_err(|e| format!("Migration failed: {e}"))?;

    println!("Migration complete:");
    println!("  Tables migrated: {}", report.migrated().join(", "));
    println!("  Tables skipped: {}", report.skipped.len());
    println!("  Rows copied: {}", report.rows_copied);

    let restructure = dest
        .check_schema_and_restructure()
        .map_err(|e| format!("Schema check failed: {e}"))?;
    print_restructure_report(&restructure);

    if args.drop_source {
        let dropped = drop_tables(source_conn, &report.pending_drop)
            .map_err(|e| format!("Failed to drop source tables: {e}"))?;
        println!("  Source tables dropped: {}", dropped.len());
    }

    dest.close().map_err(|e| format!("Failed to close destination: {e}"))?;
    source.close().map_err(|e| format!("Failed to close source: {e}"))
}

// ---------------------------------------------------------------------------
// backup command
// ---------------------------------------------------------------------------

fn run_backup(args: BackupArgs, config: &StoreConfig) -> Result<(), String> {
    let path = resolve_path(args.db, config.master_path.as_ref(), "master_path")?;
    let conn = Connection::open(&path, &config.open)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?;
    let mut options = BackupOptions::from(&config.backup);
    if let Some(pages) = args.pages_per_step {
        options.pages_per_step = pages;
    }

    let outcome = conn
        .backup_to(
            &args.dest,
            || false,
            |remaining, total| println!("  {} of {total} pages copied", total - remaining),
            &options,
        )
        .map_err(|e| format!("Backup failed: {e}"))?;
    match outcome {
        BackupOutcome::Completed => println!("Backup written to '{}'.", args.dest.display()),
        BackupOutcome::Stopped => println!("Backup stopped."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// id command
// ---------------------------------------------------------------------------

fn run_id(args: IdArgs) -> Result<(), String> {
    match args.operation {
        IdOperation::New { count, at_ms } => {
            let mut generator = UlidGenerator::new();
            for _ in 0..count {
                let id = match at_ms {
                    Some(ms) => Ulid::from_timestamp_ms(ms),
                    None => generator.generate(),
                };
                println!("{id}");
            }
            Ok(())
        }
        IdOperation::Decode { text } => {
            let id: Ulid = text.parse().map_err(|e| format!("{e}"))?;
            print_id(&id);
            Ok(())
        }
        IdOperation::Hex { hex } => {
            let id = Ulid::from_hex(&hex).map_err(|e| format!("{e}"))?;
            print_id(&id);
            Ok(())
        }
    }
}

fn print_id(id: &Ulid) {
    println!("text:      {id}");
    println!("hex:       {}", id.to_hex());
    println!("timestamp: {}", id.timestamp_ms());
    if let Some(at) = id.datetime() {
        println!("time:      {}", at.to_rfc3339());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_csv_list(raw: Option<String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    })
    .unwrap_or_default()
}
