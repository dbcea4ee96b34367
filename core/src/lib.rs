//! Engine-independent building blocks for embedded relational storage.
//!
//! This crate defines the pieces that do not need a database connection:
//!
//! - [`Ulid`]: 16-byte time-sortable identifiers with a 26-character text
//!   form, and the monotonic [`UlidGenerator`] behind [`Ulid::new`].
//! - [`Timestamp`]: milliseconds since the epoch with a reserved
//!   [`Timestamp::NULL`] value meaning "no timestamp".
//! - [`Catalog`]: an ordered list of [`SchemaObject`]s describing the
//!   tables, views, indexes, triggers and one-shot commands a database
//!   expects, written as DDL templates with placeholders.
//!
//! Catalogs compose by concatenation ([`compose_catalogs`]) and can be
//! checked up front with [`validate_catalog`].
//!
//! # Example
//!
//! ```
//! use rdb_core::*;
//!
//! let base = Catalog::new().with(SchemaObject::table(
//!     "ul_keys",
//!     "CREATE TABLE <TABLENAME>(id INTEGER PRIMARY KEY, key TEXT, value TEXT)",
//! ));
//! let members = Catalog::new().with(SchemaObject::table(
//!     "Members",
//!     "CREATE TABLE <TABLENAME>(id BLOB PRIMARY KEY, timeCreated INTEGER)",
//! ));
//! let catalog = compose_catalogs(&base, &members);
//! assert!(validate_catalog(&catalog).is_empty());
//!
//! let id = Ulid::new();
//! assert_eq!(id.to_string().parse::<Ulid>().unwrap(), id);
//! ```

mod merge;
mod timestamp;
mod types;
mod ulid;
mod validate;

pub use merge::compose_catalogs;
pub use timestamp::{NULL_TIMESTAMP_MS, Timestamp};
pub use types::*;
pub use ulid::{ALPHABET, BYTE_LEN, ENCODED_LEN, IdError, Ulid, UlidGenerator};
pub use validate::{ValidationError, validate_catalog};
