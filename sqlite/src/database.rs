//! Database lifecycle around a declared catalog.
//!
//! A [`SchemaProvider`] supplies the catalog for one kind of database. A
//! derived kind builds its catalog by appending to its base's with
//! [`compose_catalogs`](rdb_core::compose_catalogs). [`Database`] owns the
//! connection and drives the open sequence:
//!
//! 1. validate the catalog,
//! 2. note whether the file is new, creating parent directories,
//! 3. open the connection,
//! 4. create missing catalog objects (one-shot commands only when new),
//! 5. let the provider populate a new database.
//!
//! [`Database::check_schema_and_restructure`] then reconciles a database
//! created by an older catalog with the current one.
//!
//! # Example
//!
//! ```
//! use rdb_core::{Catalog, SchemaObject};
//! use rdb_sqlite::{Database, MEMORY_PATH, SchemaProvider};
//!
//! struct Keys;
//!
//! impl SchemaProvider for Keys {
//!     fn catalog(&self) -> Catalog {
//!         Catalog::new().with(SchemaObject::table(
//!             "ul_keys",
//!             "CREATE TABLE <TABLENAME>(key TEXT PRIMARY KEY, value TEXT)",
//!         ))
//!     }
//! }
//!
//! let mut db = Database::new(Keys, MEMORY_PATH);
//! db.open(true).unwrap();
//! assert!(db.is_new_database());
//! let report = db.check_schema_and_restructure().unwrap();
//! assert!(report.is_unchanged());
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rdb_core::{Catalog, ObjectKind, RelatedNames, validate_catalog};
use tracing::{info, warn};

use crate::backup::{BackupOptions, BackupOutcome};
use crate::config::OpenOptions;
use crate::connection::{Connection, is_memory_path};
use crate::error::{Result, StoreError};
use crate::guard::AutoCommit;
use crate::introspect::{quote_ident, table_exists, table_names};
use crate::migrate::{self, MigrationReport, OTHER_ALIAS};
use crate::restructure::{self, RestructureReport, plan_restructure, restructure_table};
use crate::schema::{CreateOptions, create_all_objects};

/// Supplies the declared catalog of one kind of database.
pub trait SchemaProvider {
    fn catalog(&self) -> Catalog;

    /// Seeds a newly created database. Runs once, after the catalog.
    fn populate(&self, _conn: &Connection) -> Result<()> {
        Ok(())
    }
}

/// Fix-up run on a table right after it was rebuilt.
pub type RebuildHook = Box<dyn Fn(&Connection) -> Result<()>>;

/// A database file bound to its catalog.
pub struct Database<P: SchemaProvider> {
    provider: P,
    catalog: Catalog,
    path: PathBuf,
    options: OpenOptions,
    related: RelatedNames,
    conn: Option<Connection>,
    is_new: bool,
    recreate_objects: bool,
    hooks: HashMap<String, RebuildHook>,
}

impl<P: SchemaProvider> Database<P> {
    pub fn new(provider: P, path: impl Into<PathBuf>) -> Self {
        let catalog = provider.catalog();
        Self {
            provider,
            catalog,
            path: path.into(),
            options: OpenOptions::default(),
            related: RelatedNames::default(),
            conn: None,
            is_new: false,
            recreate_objects: false,
            hooks: HashMap::new(),
        }
    }

    pub fn with_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_related(mut self, related: RelatedNames) -> Self {
        self.related = related;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether the last [`open`](Self::open) created the database.
    pub fn is_new_database(&self) -> bool {
        self.is_new
    }

    /// Makes the next open drop and recreate every catalog object.
    pub fn recreate_objects(&mut self) {
        self.recreate_objects = true;
    }

    /// Names substituted for `<MASTER>` and `<SIBLING>`.
    pub fn set_related(&mut self, related: RelatedNames) {
        self.related = related;
    }

    /// Registers a fix-up for `table`, run after the table is rebuilt.
    pub fn add_rebuild_hook(
        &mut self,
        table: &str,
        hook: impl Fn(&Connection) -> Result<()> + 'static,
    ) {
        self.hooks.insert(table.to_ascii_lowercase(), Box::new(hook));
    }

    /// The open connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] when the database is not open.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    /// Opens the database. With `check_and_create`, missing catalog objects
    /// are created; any creation failure aborts the open. A database created
    /// by this call is always initialised, one-shot commands and
    /// [`SchemaProvider::populate`] included, whatever the flag says.
    ///
    /// Opening an already open database does nothing.
    pub fn open(&mut self, check_and_create: bool) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        if let Some(problem) = validate_catalog(&self.catalog).into_iter().next() {
            return Err(StoreError::SchemaInconsistent {
                object: "catalog".to_string(),
                message: problem.to_string(),
            });
        }

        let memory = is_memory_path(&self.path);
        self.is_new = memory || !self.path.exists();
        if !memory {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&self.path, &self.options)?;
        if check_and_create || self.is_new {
            let options = CreateOptions {
                drop_existing: self.recreate_objects,
                run_one_shot: self.is_new,
            };
            create_all_objects(&conn, &self.catalog, &self.related, options)?;
            if self.is_new {
                self.provider.populate(&conn)?;
            }
        }
        self.recreate_objects = false;
        self.conn = Some(conn);
        info!(path = %self.path.display(), new = self.is_new, "database open");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }

    /// Closes and opens again without touching the schema, dropping cached
    /// statements and table metadata. In-memory databases stay as they are.
    pub fn reopen(&mut self) -> Result<()> {
        if is_memory_path(&self.path) {
            return Ok(());
        }
        let was_new = self.is_new;
        self.close()?;
        self.open(false)?;
        self.is_new = was_new;
        Ok(())
    }

    /// Rebuilds every table whose live shape differs from the catalog.
    ///
    /// A disposable in-memory copy of the catalog's tables serves as the
    /// reference. Failing to read either schema aborts; a failing table
    /// rebuild is logged, reported and skipped.
    pub fn check_schema_and_restructure(&mut self) -> Result<RestructureReport> {
        let reference = Connection::open_in_memory()?;
        let declared: Catalog = self.catalog.tables().cloned().collect();
        create_all_objects(&reference, &declared, &self.related, CreateOptions::default())?;

        let plans = plan_restructure(self.connection()?, &reference)?;
        let mut report = RestructureReport::default();
        if plans.is_empty() {
            return Ok(report);
        }

        self.reopen()?;
        let mut pending = Vec::new();
        {
            let conn = self.connection()?;
            for plan in &plans {
                let Some(object) = self.catalog.find(&plan.table, ObjectKind::Table) else {
                    continue;
                };
                match restructure_table(conn, object, plan, &self.related) {
                    Ok(old) => {
                        pending.push(old);
                        if let Some(hook) = self.hooks.get(&plan.table.to_ascii_lowercase()) {
                            if let Err(err) = hook(conn) {
                                warn!(table = %plan.table, error = %err, "rebuild hook failed");
                            }
                        }
                        report.rebuilt.push(plan.table.clone());
                    }
                    Err(err) => {
                        warn!(table = %plan.table, error = %err, "table rebuild failed");
                        report.failed.push((plan.table.clone(), err.to_string()));
                    }
                }
            }
        }

        self.reopen()?;
        let conn = self.connection()?;
        report.dropped = restructure::drop_tables(conn, &pending)?;
        // Triggers went away with the old tables.
        create_all_objects(conn, &self.catalog, &self.related, CreateOptions::default())?;
        info!(
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            dropped = report.dropped.len(),
            "restructure done"
        );
        Ok(report)
    }

    /// Attaches the other database of the pair under [`OTHER_ALIAS`].
    pub fn attach_other(&self, path: impl AsRef<Path>) -> Result<bool> {
        migrate::attach(self.connection()?, path, OTHER_ALIAS)
    }

    pub fn detach_other(&self) -> Result<bool> {
        migrate::detach(self.connection()?, OTHER_ALIAS)
    }

    /// Migrates tables from `source` into this database. `None` or an empty
    /// list migrates every source table.
    pub fn migrate_from(&self, source: &Connection, tables: Option<&[&str]>) -> Result<MigrationReport> {
        migrate::migrate(self.connection()?, source, tables)
    }

    /// Drops the named tables and compacts the file if any went away.
    pub fn drop_tables(&self, tables: &[String]) -> Result<Vec<String>> {
        restructure::drop_tables(self.connection()?, tables)
    }

    pub fn backup_to(
        &self,
        dest: impl AsRef<Path>,
        should_stop: impl FnMut() -> bool,
        progress: impl FnMut(i32, i32),
        options: &BackupOptions,
    ) -> Result<BackupOutcome> {
        self.connection()?
            .backup_to(dest, should_stop, progress, options)
    }

    /// Deletes every row of every catalog table, atomically.
    pub fn truncate_all_tables(&self) -> Result<()> {
        let conn = self.connection()?;
        let mut guard = AutoCommit::begin(conn)?;
        for table in self.catalog.tables() {
            if table_exists(conn, &table.name)? {
                conn.execute(&format!("DELETE FROM {}", quote_ident(&table.name)))?;
            }
        }
        guard.set_ok();
        guard.finish()
    }

    /// Drops every user table in the database.
    pub fn drop_all_tables(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let tables = table_names(conn, None)?;
        restructure::drop_tables(conn, &tables)
    }

    /// Closes, deletes the file with its journal side files, and opens a
    /// fresh database.
    pub fn delete_database(&mut self) -> Result<()> {
        self.close()?;
        if !is_memory_path(&self.path) {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let mut file = self.path.clone().into_os_string();
                file.push(suffix);
                match fs::remove_file(&file) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
            info!(path = %self.path.display(), "database deleted");
        }
        self.open(true)
    }
}

impl<P: SchemaProvider> std::fmt::Debug for Database<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .field("objects", &self.catalog.len())
            .finish()
    }
}
