//! Integration tests for the rdb-sqlite crate.

use std::path::Path;

use rdb_core::{Catalog, RelatedNames, SchemaObject, Timestamp, Ulid, compose_catalogs};
use rdb_sqlite::introspect::{column_exists, column_types, index_exists, table_exists};
use rdb_sqlite::render::{self, RenderOptions};
use rdb_sqlite::{
    AutoCommit, BackupOptions, BackupOutcome, BusyPolicy, Connection, Database, OpenOptions,
    SchemaProvider, StoreConfig, StoreError, create_all_objects, CreateOptions, migrate,
};

/// Base catalog shared by every database kind.
struct Base;

impl SchemaProvider for Base {
    fn catalog(&self) -> Catalog {
        Catalog::new()
            .with(SchemaObject::table(
                "ul_keys",
                "CREATE TABLE <TABLENAME>(key TEXT PRIMARY KEY, value TEXT)",
            ))
            .with(SchemaObject::command(
                "seed_version",
                "INSERT INTO ul_keys VALUES ('version', '1')",
            ))
    }
}

/// Product catalog; `price_type` lets a test play an older release.
struct Products {
    price_type: &'static str,
    with_legacy: bool,
}

impl SchemaProvider for Products {
    fn catalog(&self) -> Catalog {
        let legacy = if self.with_legacy { ", legacy TEXT" } else { "" };
        let products = Catalog::new()
            .with(
                SchemaObject::table(
                    "Products",
                    format!(
                        "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, name TEXT, price {}, \
                         qoh INTEGER, reorderQty INTEGER, timeCreated INTEGER{legacy})",
                        self.price_type
                    ),
                )
                .with_statement("CREATE INDEX idx_products_name ON <TABLENAME>(name)"),
            )
            .with(SchemaObject::view(
                "v_products",
                "CREATE VIEW <TABLENAME> AS SELECT name, price FROM Products",
            ));
        compose_catalogs(&Base.catalog(), &products)
    }
}

fn busy_options(attempts: u32, sleep_ms: u64) -> OpenOptions {
    OpenOptions {
        busy: BusyPolicy {
            handler_timeout_ms: 10,
            retry_attempts: attempts,
            retry_sleep_ms: sleep_ms,
        },
        ..OpenOptions::default()
    }
}

fn insert_product(conn: &Connection, name: &str, price: i64, qoh: i64) -> Ulid {
    let id = Ulid::new();
    conn.execute_update(
        "INSERT INTO Products(id, name, price, qoh, reorderQty, timeCreated) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &[&id, &name, &price, &qoh, &qoh, &Timestamp::now()],
    )
    .unwrap();
    id
}

fn open_products(path: &Path, price_type: &'static str, with_legacy: bool) -> Database<Products> {
    let mut db = Database::new(
        Products {
            price_type,
            with_legacy,
        },
        path,
    );
    db.open(true).unwrap();
    db
}

// =============================================================================
// Schema creation
// =============================================================================

#[test]
fn test_composed_catalog_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.db");

    let mut db = open_products(&path, "REAL", false);
    {
        let conn = db.connection().unwrap();
        assert!(table_exists(conn, "ul_keys").unwrap());
        assert!(table_exists(conn, "Products").unwrap());
        assert!(index_exists(conn, "idx_products_name").unwrap());
        assert_eq!(conn.execute_scalar("SELECT count(*) FROM ul_keys").unwrap(), 1);
    }
    db.close().unwrap();

    db.open(true).unwrap();
    assert_eq!(
        db.connection()
            .unwrap()
            .execute_scalar("SELECT count(*) FROM ul_keys")
            .unwrap(),
        1
    );
}

#[test]
fn test_create_all_with_drop_recreates_everything() {
    let conn = Connection::open_in_memory().unwrap();
    let catalog = Products {
        price_type: "REAL",
        with_legacy: false,
    }
    .catalog();
    let related = RelatedNames::default();
    create_all_objects(&conn, &catalog, &related, CreateOptions::default()).unwrap();
    insert_product(&conn, "pen", 100, 1);

    let report = create_all_objects(
        &conn,
        &catalog,
        &related,
        CreateOptions {
            drop_existing: true,
            run_one_shot: false,
        },
    )
    .unwrap();
    assert_eq!(report.recreated, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(conn.execute_scalar("SELECT count(*) FROM Products").unwrap(), 0);
}

// =============================================================================
// Restructuring
// =============================================================================

#[test]
fn test_restructure_divides_integer_prices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.db");

    let mut old = open_products(&path, "INTEGER", true);
    let pen = insert_product(old.connection().unwrap(), "pen", 25_000, 40);
    let ink = insert_product(old.connection().unwrap(), "ink", 1_234, 3);
    old.close().unwrap();

    let mut db = open_products(&path, "REAL", false);
    let report = db.check_schema_and_restructure().unwrap();
    assert_eq!(report.rebuilt, ["Products"]);
    assert_eq!(report.dropped, ["Products_old"]);

    let conn = db.connection().unwrap();
    let columns = column_types(conn, None, "Products").unwrap();
    assert_eq!(columns.declared_type("price").as_deref(), Some("real"));
    assert!(!column_exists(conn, "Products", "legacy").unwrap());
    assert!(!table_exists(conn, "Products_old").unwrap());
    assert!(index_exists(conn, "idx_products_name").unwrap());

    let rows = conn
        .query_rows(
            "SELECT id, price, qoh, reorderQty FROM Products ORDER BY name",
            &[],
            |row| {
                Ok((
                    row.get::<Ulid>(0)?,
                    row.get::<f64>(1)?,
                    row.get::<i64>(2)?,
                    row.get::<i64>(3)?,
                ))
            },
        )
        .unwrap();
    assert_eq!(rows, vec![(ink, 0.1234, 3, 3), (pen, 2.5, 40, 40)]);

    // The view still reads the rebuilt table.
    assert_eq!(
        conn.execute_scalar("SELECT count(*) FROM v_products").unwrap(),
        2
    );
}

#[test]
fn test_quantity_columns_keep_their_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stock.db");
    {
        let conn = Connection::open(&path, &OpenOptions::default()).unwrap();
        conn.execute(
            "CREATE TABLE Stock(id INTEGER PRIMARY KEY, qoh INTEGER, packSize INTEGER, cost INTEGER);
             INSERT INTO Stock VALUES (1, 12, 6, 30000);",
        )
        .unwrap();
    }

    struct Stock;
    impl SchemaProvider for Stock {
        fn catalog(&self) -> Catalog {
            Catalog::new().with(SchemaObject::table(
                "Stock",
                "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, qoh REAL, packSize REAL, cost REAL)",
            ))
        }
    }

    let mut db = Database::new(Stock, &path);
    db.open(true).unwrap();
    db.check_schema_and_restructure().unwrap();
    let row = db
        .connection()
        .unwrap()
        .query_rows("SELECT qoh, packSize, cost FROM Stock", &[], |row| {
            Ok((row.get::<f64>(0)?, row.get::<f64>(1)?, row.get::<f64>(2)?))
        })
        .unwrap();
    assert_eq!(row, vec![(12.0, 6.0, 3.0)]);
}

#[test]
fn test_added_column_rebuilds_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.db");
    {
        let conn = Connection::open(&path, &OpenOptions::default()).unwrap();
        conn.execute(
            "CREATE TABLE ul_keys(key TEXT PRIMARY KEY);
             INSERT INTO ul_keys VALUES ('a'), ('b');",
        )
        .unwrap();
    }

    let mut db = Database::new(Base, &path);
    db.open(true).unwrap();
    let report = db.check_schema_and_restructure().unwrap();
    assert_eq!(report.rebuilt, ["ul_keys"]);
    let conn = db.connection().unwrap();
    assert_eq!(conn.execute_scalar("SELECT count(*) FROM ul_keys").unwrap(), 2);
    assert_eq!(
        conn.execute_scalar("SELECT count(*) FROM ul_keys WHERE value IS NULL")
            .unwrap(),
        2
    );
}

#[test]
fn test_undeclared_tables_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extra.db");
    let mut db = open_products(&path, "REAL", false);
    db.connection()
        .unwrap()
        .execute("CREATE TABLE scratch(a, b, c)")
        .unwrap();
    let report = db.check_schema_and_restructure().unwrap();
    assert!(report.is_unchanged());
    assert!(table_exists(db.connection().unwrap(), "scratch").unwrap());
}

// =============================================================================
// Migration
// =============================================================================

#[test]
fn test_migrate_between_pair_and_drop_source() {
    let dir = tempfile::tempdir().unwrap();
    let source_db = open_products(&dir.path().join("trans.db"), "INTEGER", false);
    let source = source_db.connection().unwrap();
    insert_product(source, "pen", 50_000, 5);
    insert_product(source, "cap", 10_000, 9);

    let mut master = Database::new(Base, dir.path().join("master.db"));
    master.open(true).unwrap();
    master
        .connection()
        .unwrap()
        .execute("CREATE TABLE Products(id BLOB PRIMARY KEY, name TEXT, price REAL, qoh REAL)")
        .unwrap();

    let report = master
        .migrate_from(source, Some(&["Products", "Missing"]))
        .unwrap();
    assert_eq!(report.migrated(), ["Products"]);
    assert_eq!(report.skipped, ["Missing"]);
    assert_eq!(report.rows_copied, 2);

    let conn = master.connection().unwrap();
    let rows = conn
        .query_rows("SELECT name, price, qoh FROM Products ORDER BY name", &[], |row| {
            Ok((row.get::<String>(0)?, row.get::<f64>(1)?, row.get::<f64>(2)?))
        })
        .unwrap();
    assert_eq!(
        rows,
        vec![("cap".to_string(), 1.0, 9.0), ("pen".to_string(), 5.0, 5.0)]
    );

    let dropped = source_db.drop_tables(&report.pending_drop).unwrap();
    assert_eq!(dropped, ["Products"]);
    assert!(!table_exists(source, "Products").unwrap());
}

#[test]
fn test_migrate_all_tables_creates_identical_schema() {
    let source = Connection::open_in_memory().unwrap();
    source
        .execute(
            "CREATE TABLE Sessions(id BLOB PRIMARY KEY, opened INTEGER, note TEXT);
             INSERT INTO Sessions VALUES (x'00', 1, NULL);
             CREATE TABLE Types(code TEXT, label TEXT);",
        )
        .unwrap();
    let dest = Connection::open_in_memory().unwrap();

    let report = migrate(&dest, &source, None).unwrap();
    assert_eq!(report.migrated(), ["Sessions", "Types"]);
    let sql = |conn: &Connection| {
        rdb_sqlite::introspect::create_sql(conn, None, "Sessions")
            .unwrap()
            .unwrap()
    };
    assert_eq!(sql(&dest), sql(&source));
    assert_eq!(
        dest.execute_scalar("SELECT count(*) FROM Sessions WHERE note IS NULL")
            .unwrap(),
        1
    );
}

#[test]
fn test_attach_other_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let other = dir.path().join("master.db");
    let mut master = Database::new(Base, &other);
    master.open(true).unwrap();
    master.close().unwrap();

    let mut db = Database::new(Base, dir.path().join("trans.db"));
    db.open(true).unwrap();
    assert!(db.attach_other(&other).unwrap());
    assert!(!db.attach_other(&other).unwrap());
    assert_eq!(
        db.connection()
            .unwrap()
            .execute_scalar("SELECT count(*) FROM master.ul_keys")
            .unwrap(),
        1
    );
    assert!(db.detach_other().unwrap());
    assert!(!db.detach_other().unwrap());
}

// =============================================================================
// Busy and locked handling
// =============================================================================

#[test]
fn test_autocommit_write_retries_then_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.db");
    let writer = Connection::open(&path, &busy_options(3, 20)).unwrap();
    writer.execute("CREATE TABLE t(a)").unwrap();
    let other = Connection::open(&path, &busy_options(3, 20)).unwrap();

    writer.begin().unwrap();
    writer.execute("INSERT INTO t VALUES (1)").unwrap();

    let started = std::time::Instant::now();
    let err = other.execute("INSERT INTO t VALUES (2)").unwrap_err();
    match err {
        StoreError::LockTimeout { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected {other:?}"),
    }
    // Two sleeps between three attempts.
    assert!(started.elapsed() >= std::time::Duration::from_millis(40));

    writer.commit().unwrap();
    other.execute("INSERT INTO t VALUES (2)").unwrap();
    assert_eq!(other.execute_scalar("SELECT count(*) FROM t").unwrap(), 2);
}

#[test]
fn test_write_inside_transaction_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let writer = Connection::open(&path, &busy_options(50, 1000)).unwrap();
    writer.execute("CREATE TABLE t(a)").unwrap();
    let other = Connection::open(&path, &busy_options(50, 1000)).unwrap();

    writer.begin().unwrap();
    writer.execute("INSERT INTO t VALUES (1)").unwrap();

    other.execute("BEGIN").unwrap();
    let started = std::time::Instant::now();
    let err = other
        .execute_update("INSERT INTO t VALUES (?1)", &[&2i64])
        .unwrap_err();
    assert!(matches!(err, StoreError::Locked { .. }), "{err:?}");
    // No retry sleep happened.
    assert!(started.elapsed() < std::time::Duration::from_millis(1000));
    other.rollback().unwrap();
    writer.commit().unwrap();
}

#[test]
fn test_guard_rolls_back_failed_batch() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute("CREATE TABLE t(a UNIQUE)").unwrap();
    let result = (|| -> rdb_sqlite::Result<()> {
        let mut guard = AutoCommit::begin(&conn)?;
        conn.execute_update("INSERT INTO t VALUES (?1)", &[&1i64])?;
        conn.execute_update("INSERT INTO t VALUES (?1)", &[&1i64])?;
        guard.set_ok();
        guard.finish()
    })();
    assert!(result.is_err());
    assert_eq!(conn.execute_scalar("SELECT count(*) FROM t").unwrap(), 0);
}

// =============================================================================
// Backup, rendering and configuration
// =============================================================================

#[test]
fn test_backup_of_open_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_products(&dir.path().join("live.db"), "REAL", false);
    insert_product(db.connection().unwrap(), "pen", 1, 1);

    let dest = dir.path().join("backups").join("live.db");
    let outcome = db
        .backup_to(&dest, || false, |_, _| {}, &BackupOptions::default())
        .unwrap();
    assert_eq!(outcome, BackupOutcome::Completed);

    let copy = Connection::open(&dest, &OpenOptions::default()).unwrap();
    assert_eq!(copy.execute_scalar("SELECT count(*) FROM Products").unwrap(), 1);
}

#[test]
fn test_render_products_report() {
    let conn = Connection::open_in_memory().unwrap();
    create_all_objects(
        &conn,
        &Products {
            price_type: "REAL",
            with_legacy: false,
        }
        .catalog(),
        &RelatedNames::default(),
        CreateOptions::default(),
    )
    .unwrap();
    let id = insert_product(&conn, "pen", 3, 1);

    let mut stmt = conn
        .prepare("SELECT id AS \"id@key\", name, price FROM Products")
        .unwrap();
    let text = render::tab_delimited(&mut stmt.query().unwrap(), RenderOptions::default()).unwrap();
    assert_eq!(text, format!("id\tname\tprice\r\n{id}\tpen\t3"));

    let json = render::json(&mut stmt.query().unwrap()).unwrap();
    assert_eq!(json[0]["name"], "pen");
    assert_eq!(json[0]["id"], id.to_string());
}

#[test]
fn test_store_config_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rdb.yml");
    let config = StoreConfig {
        master_path: Some(dir.path().join("master.db")),
        open: busy_options(5, 50),
        ..StoreConfig::default()
    };
    config.save(&path).unwrap();
    assert_eq!(StoreConfig::load(&path).unwrap(), config);
}
