//! Member database lifecycle example.
//!
//! Demonstrates opening a catalog-backed database, writing typed rows with
//! ULID keys, reading them back through a cursor, and letting a later
//! release of the catalog restructure the table in place.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rdb-demos --example member_db
//! ```

use rdb_core::{Catalog, SchemaObject, Timestamp, UlidGenerator};
use rdb_sqlite::render::{self, RenderOptions};
use rdb_sqlite::{AutoCommit, Database, SchemaProvider};

/// First release: prices stored as integer ten-thousandths.
struct ShopV1;

impl SchemaProvider for ShopV1 {
    fn catalog(&self) -> Catalog {
        Catalog::new()
            .with(SchemaObject::table(
                "Products",
                "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, name TEXT, price INTEGER, \
                 qoh INTEGER, timeCreated INTEGER)",
            ))
            .with(SchemaObject::index(
                "idx_products_name",
                "CREATE INDEX <TABLENAME> ON Products(name)",
            ))
            .with(SchemaObject::command(
                "seed_products",
                "INSERT INTO Products VALUES (x'00', 'sample', 15000, 1, NULL)",
            ))
    }
}

/// Second release: prices become reals.
struct ShopV2;

impl SchemaProvider for ShopV2 {
    fn catalog(&self) -> Catalog {
        Catalog::new()
            .with(SchemaObject::table(
                "Products",
                "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, name TEXT, price REAL, \
                 qoh REAL, timeCreated INTEGER)",
            ))
            .with(SchemaObject::index(
                "idx_products_name",
                "CREATE INDEX <TABLENAME> ON Products(name)",
            ))
            .with(SchemaObject::view(
                "v_InStock",
                "CREATE VIEW <TABLENAME> AS SELECT name, price FROM Products WHERE qoh > 0",
            ))
    }
}

fn main() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");

    // === Step 1: Create the database from the first catalog ===
    println!("=== Create ===");
    let mut db = Database::new(ShopV1, &path);
    db.open(true).unwrap();
    println!("Opened {} (new: {})", path.display(), db.is_new_database());

    // === Step 2: Insert rows in one auto-commit scope ===
    println!("\n=== Insert ===");
    {
        let conn = db.connection().unwrap();
        let mut ids = UlidGenerator::new();
        let mut guard = AutoCommit::begin(conn).unwrap();
        for (name, price, qoh) in [("pen", 25_000i64, 12i64), ("ink", 1_234, 0), ("pad", 40_000, 3)] {
            conn.execute_update(
                "INSERT INTO Products VALUES (?1, ?2, ?3, ?4, ?5)",
                &[&ids.generate(), &name, &price, &qoh, &Timestamp::now()],
            )
            .unwrap();
        }
        guard.set_ok();
        guard.finish().unwrap();
        println!(
            "Rows: {}",
            conn.execute_scalar("SELECT count(*) FROM Products").unwrap()
        );
    }
    db.close().unwrap();

    // === Step 3: Reopen with the second catalog and restructure ===
    println!("\n=== Restructure ===");
    let mut db = Database::new(ShopV2, &path);
    db.open(true).unwrap();
    let report = db.check_schema_and_restructure().unwrap();
    println!("Rebuilt: {:?}", report.rebuilt);
    println!("Old tables dropped: {:?}", report.dropped);

    // === Step 4: Read back through the cursor ===
    println!("\n=== Query ===");
    {
        let conn = db.connection().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, price, qoh, timeCreated FROM Products ORDER BY name")
            .unwrap();
        let mut cursor = stmt.query().unwrap();
        while let Some(row) = cursor.next_row().unwrap() {
            let name: String = row.get(1).unwrap();
            let price: f64 = row.get(2).unwrap();
            let created: Timestamp = row.get(4).unwrap();
            println!(
                "  {name:<8} price={price:<8} qoh={} created={}",
                row.get::<f64>(3).unwrap(),
                created
                    .to_datetime()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".into())
            );
        }

        // === Step 5: Render the view as a report ===
        println!("\n=== Report ===");
        let mut stmt = conn.prepare("SELECT * FROM v_InStock ORDER BY name").unwrap();
        let mut cursor = stmt.query().unwrap();
        let text = render::tab_delimited(&mut cursor, RenderOptions::default()).unwrap();
        println!("{}", text.replace("\r\n", "\n"));
    }

    db.close().unwrap();
    println!("\nDone!");
}
