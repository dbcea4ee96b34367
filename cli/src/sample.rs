//! Sample catalogs for a member service.
//!
//! The member (master) database and the transaction database share the key
//! tables of [`BaseSchema`] and add their own tables after them.

use rdb_core::{Catalog, SchemaObject, compose_catalogs};
use rdb_sqlite::SchemaProvider;

fn key_table(name: &str) -> SchemaObject {
    SchemaObject::table(
        name,
        "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, key TEXT, value TEXT, \
         description TEXT, isDeleted INTEGER, UNIQUE(key))",
    )
    .with_statement("CREATE INDEX idx_<TABLENAME>_key ON <TABLENAME>(key)")
}

/// Key/value settings every database carries.
pub struct BaseSchema;

impl SchemaProvider for BaseSchema {
    fn catalog(&self) -> Catalog {
        Catalog::new().with(key_table("ul_keys")).with(SchemaObject::command(
            "seed_schema_version",
            "INSERT INTO ul_keys(key, value, description, isDeleted) \
             VALUES ('schemaVersion', '1', 'catalog version', 0)",
        ))
    }
}

/// The member master database.
pub struct MemberSchema;

impl SchemaProvider for MemberSchema {
    fn catalog(&self) -> Catalog {
        let members = Catalog::new()
            .with(key_table("UL_LocalKeys"))
            .with(SchemaObject::table(
                "Types",
                "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, parentID INTEGER, code TEXT, \
                 name TEXT, limitvalue TEXT, defaultvalue TEXT, isDeleted INTEGER, \
                 FOREIGN KEY(parentID) REFERENCES Types(id))",
            ))
            .with(SchemaObject::table(
                "Members",
                "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, dob INTEGER, noOfTrans INTEGER, \
                 timeCreated INTEGER)",
            ))
            .with(SchemaObject::table(
                "MemberTransactions",
                "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, amount INTEGER, timeCreated INTEGER)",
            ))
            .with(SchemaObject::view(
                "v_ActiveMembers",
                "CREATE VIEW <TABLENAME> AS SELECT id, dob, noOfTrans FROM Members WHERE noOfTrans > 0",
            ));
        compose_catalogs(&BaseSchema.catalog(), &members)
    }
}

/// The write-heavy transaction database.
pub struct TransactionSchema;

impl SchemaProvider for TransactionSchema {
    fn catalog(&self) -> Catalog {
        let sessions = Catalog::new()
            .with(
                SchemaObject::table(
                    "UL_Sessions",
                    "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, timeIn INTEGER, \
                     timeOut INTEGER, ipAddress TEXT, UserID INTEGER, terminalID INTEGER, \
                     listenerPortNo INTEGER, remark TEXT)",
                )
                .with_statement("CREATE INDEX idx_session_uid ON <TABLENAME>(UserID)")
                .with_statement(
                    "CREATE INDEX idx_session_terminalID ON <TABLENAME>(terminalID, UserID)",
                ),
            )
            .with(key_table("UL_LocalKeys"));
        compose_catalogs(&BaseSchema.catalog(), &sessions)
    }
}
