//! Catalog composition.
//!
//! A derived database type's catalog is its base catalog followed by its
//! own additions. Composition only appends: inherited entries are never
//! replaced or removed, and order is preserved so dependent objects are
//! still created after what they depend on.
//!
//! # Example
//!
//! ```
//! use rdb_core::*;
//!
//! let base = Catalog::new()
//!     .with(SchemaObject::table("ul_keys", "CREATE TABLE <TABLENAME>(key TEXT)"));
//! let own = Catalog::new()
//!     .with(SchemaObject::table("Members", "CREATE TABLE <TABLENAME>(id BLOB)"));
//!
//! let composed = compose_catalogs(&base, &own);
//! let names: Vec<_> = composed.iter().map(|o| o.name.as_str()).collect();
//! assert_eq!(names, ["ul_keys", "Members"]);
//! ```

use crate::Catalog;

/// Concatenates `base` and `additions`, base first.
pub fn compose_catalogs(base: &Catalog, additions: &Catalog) -> Catalog {
    base.iter().chain(additions.iter()).cloned().collect()
}

impl Catalog {
    /// Appends every entry of `additions` after the current entries.
    pub fn extend_with(mut self, additions: &Catalog) -> Self {
        for object in additions {
            self.push(object.clone());
        }
        self
    }
}
