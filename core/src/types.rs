//! Declarative schema catalog types.
//!
//! A database type describes the objects it expects to exist as an ordered
//! [`Catalog`] of [`SchemaObject`]s. Each object carries DDL templates that
//! may reference three placeholders, substituted just before execution:
//!
//! - [`TABLE_PLACEHOLDER`]: the object's own name
//! - [`MASTER_PLACEHOLDER`]: the related master database name
//! - [`SIBLING_PLACEHOLDER`]: the related sibling database name
//!
//! Catalogs are serde-serializable so they can also be kept in JSON or YAML
//! files next to the code that uses them.

use serde::{Deserialize, Serialize};

/// Replaced with the object's own name.
pub const TABLE_PLACEHOLDER: &str = "<TABLENAME>";
/// Replaced with [`RelatedNames::master`].
pub const MASTER_PLACEHOLDER: &str = "<MASTER>";
/// Replaced with [`RelatedNames::sibling`].
pub const SIBLING_PLACEHOLDER: &str = "<SIBLING>";

/// Kind of a catalog entry.
///
/// Only tables, views, indexes and triggers can be looked up in the live
/// database; every other kind is treated as absent and simply executed.
///
/// # Examples
///
/// ```
/// use rdb_core::ObjectKind;
///
/// assert_eq!(ObjectKind::Index.keyword(), "INDEX");
/// assert!(ObjectKind::Trigger.is_introspectable());
/// assert!(ObjectKind::Command.is_one_shot());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
    Index,
    Trigger,
    /// Script executed once, when the database file is first created.
    Command,
    Constraint,
    Function,
    Procedure,
}

impl ObjectKind {
    /// SQL keyword naming this kind, as used in `DROP <KIND>`.
    pub fn keyword(self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
            ObjectKind::Index => "INDEX",
            ObjectKind::Trigger => "TRIGGER",
            ObjectKind::Command => "COMMAND",
            ObjectKind::Constraint => "CONSTRAINT",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Procedure => "PROCEDURE",
        }
    }

    /// Whether existence of this kind can be checked in `sqlite_master`.
    pub fn is_introspectable(self) -> bool {
        matches!(
            self,
            ObjectKind::Table | ObjectKind::View | ObjectKind::Index | ObjectKind::Trigger
        )
    }

    pub fn is_one_shot(self) -> bool {
        self == ObjectKind::Command
    }
}

/// Names substituted for [`MASTER_PLACEHOLDER`] and [`SIBLING_PLACEHOLDER`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedNames {
    pub master: String,
    pub sibling: String,
}

impl RelatedNames {
    pub fn new(master: impl Into<String>, sibling: impl Into<String>) -> Self {
        Self {
            master: master.into(),
            sibling: sibling.into(),
        }
    }
}

/// One declared database object and the statements that create it.
///
/// # Examples
///
/// ```
/// use rdb_core::{ObjectKind, RelatedNames, SchemaObject};
///
/// let index = SchemaObject::index(
///     "idx_members_dob",
///     "CREATE INDEX <TABLENAME> ON members(dob)",
/// );
/// assert_eq!(index.kind, ObjectKind::Index);
///
/// let rendered = index.render(&RelatedNames::default());
/// assert_eq!(rendered, vec!["CREATE INDEX idx_members_dob ON members(dob)"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub name: String,
    pub kind: ObjectKind,
    /// DDL templates, executed in order.
    pub statements: Vec<String>,
}

impl SchemaObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            statements: Vec::new(),
        }
    }

    /// A table created by a single statement.
    pub fn table(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::Table).with_statement(sql)
    }

    pub fn view(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::View).with_statement(sql)
    }

    pub fn index(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::Index).with_statement(sql)
    }

    pub fn trigger(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::Trigger).with_statement(sql)
    }

    /// A one-shot script run only when the database is first created.
    pub fn command(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::Command).with_statement(sql)
    }

    /// Appends another statement template.
    pub fn with_statement(mut self, sql: impl Into<String>) -> Self {
        self.statements.push(sql.into());
        self
    }

    /// Returns the statements with all three placeholders substituted.
    pub fn render(&self, related: &RelatedNames) -> Vec<String> {
        self.statements
            .iter()
            .map(|sql| substitute(sql, &self.name, related))
            .collect()
    }
}

/// Substitutes the three placeholders in one template.
pub fn substitute(template: &str, name: &str, related: &RelatedNames) -> String {
    template
        .replace(TABLE_PLACEHOLDER, name)
        .replace(MASTER_PLACEHOLDER, &related.master)
        .replace(SIBLING_PLACEHOLDER, &related.sibling)
}

/// Ordered list of declared objects.
///
/// Order matters: objects are created front to back, so a table must come
/// before the indexes and triggers that reference it.
///
/// # Examples
///
/// ```
/// use rdb_core::{Catalog, ObjectKind, SchemaObject};
///
/// let catalog = Catalog::new()
///     .with(SchemaObject::table("Members", "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY)"))
///     .with(SchemaObject::index("idx_members_id", "CREATE INDEX <TABLENAME> ON Members(id)"));
///
/// assert_eq!(catalog.len(), 2);
/// assert!(catalog.find("members", ObjectKind::Table).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    objects: Vec<SchemaObject>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, object: SchemaObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn push(&mut self, object: SchemaObject) {
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchemaObject> {
        self.objects.iter()
    }

    pub fn objects(&self) -> &[SchemaObject] {
        &self.objects
    }

    /// Finds an object by kind and case-insensitive name.
    pub fn find(&self, name: &str, kind: ObjectKind) -> Option<&SchemaObject> {
        self.objects
            .iter()
            .find(|obj| obj.kind == kind && obj.name.eq_ignore_ascii_case(name))
    }

    /// All table entries, in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &SchemaObject> {
        self.objects
            .iter()
            .filter(|obj| obj.kind == ObjectKind::Table)
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a SchemaObject;
    type IntoIter = std::slice::Iter<'a, SchemaObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

impl FromIterator<SchemaObject> for Catalog {
    fn from_iter<I: IntoIterator<Item = SchemaObject>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}
