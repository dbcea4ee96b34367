//! Master/transaction pair example.
//!
//! Demonstrates attaching the sibling database of a pair, moving the
//! write-heavy session table from the transaction file into the master
//! file, dropping it from the source, and taking an online backup.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rdb-demos --example migrate_pair
//! ```

use rdb_core::{Catalog, RelatedNames, SchemaObject, compose_catalogs};
use rdb_sqlite::{BackupOptions, BackupOutcome, Database, OTHER_ALIAS, SchemaProvider};

fn keys() -> Catalog {
    Catalog::new().with(SchemaObject::table(
        "ul_keys",
        "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, key TEXT UNIQUE, value TEXT)",
    ))
}

struct Master;

impl SchemaProvider for Master {
    fn catalog(&self) -> Catalog {
        let own = Catalog::new().with(SchemaObject::table(
            "Members",
            "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, name TEXT)",
        ));
        compose_catalogs(&keys(), &own)
    }
}

struct Transactions;

impl SchemaProvider for Transactions {
    fn catalog(&self) -> Catalog {
        let own = Catalog::new()
            .with(
                SchemaObject::table(
                    "UL_Sessions",
                    "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, timeIn INTEGER, \
                     ipAddress TEXT, UserID INTEGER)",
                )
                .with_statement("CREATE INDEX idx_session_uid ON <TABLENAME>(UserID)"),
            )
            // Remembers which master file this transaction file belongs to.
            .with(SchemaObject::command(
                "note_master",
                "INSERT INTO ul_keys(key, value) VALUES ('master', '<MASTER>')",
            ));
        compose_catalogs(&keys(), &own)
    }

    fn populate(&self, conn: &rdb_sqlite::Connection) -> rdb_sqlite::Result<()> {
        for (ip, user) in [("10.0.0.1", 1i64), ("10.0.0.2", 2), ("10.0.0.3", 1)] {
            conn.execute_update(
                "INSERT INTO UL_Sessions(timeIn, ipAddress, UserID) VALUES (strftime('%s','now'), ?1, ?2)",
                &[&ip, &user],
            )?;
        }
        Ok(())
    }
}

fn main() {
    let dir = tempfile::tempdir().unwrap();
    let master_path = dir.path().join("master.db");
    let trans_path = dir.path().join("transactions.db");
    let related = RelatedNames::new(
        master_path.display().to_string(),
        trans_path.display().to_string(),
    );

    // === Step 1: Open both halves of the pair ===
    println!("=== Open ===");
    let mut master = Database::new(Master, &master_path).with_related(related.clone());
    master.open(true).unwrap();
    let mut trans = Database::new(Transactions, &trans_path).with_related(related);
    trans.open(true).unwrap();
    let sessions = trans
        .connection()
        .unwrap()
        .execute_scalar("SELECT count(*) FROM UL_Sessions")
        .unwrap();
    println!("Sessions in transaction file: {sessions}");

    // === Step 2: Cross-file query through ATTACH ===
    println!("\n=== Attach ===");
    master
        .connection()
        .unwrap()
        .execute("INSERT INTO Members(id, name) VALUES (1, 'ada'), (2, 'grace')")
        .unwrap();
    println!("Attached: {}", trans.attach_other(&master_path).unwrap());
    println!("Attached again: {}", trans.attach_other(&master_path).unwrap());
    let rows = trans
        .connection()
        .unwrap()
        .query_rows(
            &format!(
                "SELECT m.name, count(*) FROM UL_Sessions s \
                 JOIN {OTHER_ALIAS}.Members m ON m.id = s.UserID GROUP BY m.name ORDER BY m.name"
            ),
            &[],
            |row| Ok((row.get::<String>(0)?, row.get::<i64>(1)?)),
        )
        .unwrap();
    for (name, count) in rows {
        println!("  {name}: {count} sessions");
    }
    trans.detach_other().unwrap();

    // === Step 3: Move the session table into the master file ===
    println!("\n=== Migrate ===");
    let report = master
        .migrate_from(trans.connection().unwrap(), Some(&["UL_Sessions"][..]))
        .unwrap();
    println!("Migrated: {:?}", report.migrated());
    println!("Rows copied: {}", report.rows_copied);
    let dropped = trans.drop_tables(&report.pending_drop).unwrap();
    println!("Dropped from source: {dropped:?}");

    // === Step 4: Online backup of the master file ===
    println!("\n=== Backup ===");
    let backup_path = dir.path().join("backups").join("master.bak");
    let outcome = master
        .backup_to(
            &backup_path,
            || false,
            |remaining, total| println!("  {} of {total} pages", total - remaining),
            &BackupOptions::default(),
        )
        .unwrap();
    assert_eq!(outcome, BackupOutcome::Completed);
    println!("Backup written to {}", backup_path.display());

    master.close().unwrap();
    trans.close().unwrap();
    println!("\nDone!");
}
