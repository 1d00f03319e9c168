//! # recordjoin-los
//!
//! Local override storage: a persistent list of records, each an optional
//! snapshot of a background record plus the values overridden locally.
//!
//! Entries move through three states:
//!
//! - **New**: exists only locally, every value is an override
//! - **Linked**: the background record was found on the last refresh
//! - **Lost**: the background record disappeared; snapshot and overrides
//!   are kept until the entry is removed explicitly
//!
//! ```rust
//! use recordjoin_los::{EntryState, LocalOverrideStorage};
//! use recordjoin_query::{Dataset, Record, Schema};
//! use std::sync::Arc;
//!
//! let schema = Schema::new(["Vorname", "Nachname"]);
//! let mut los = LocalOverrideStorage::new(schema.clone());
//!
//! let sheldon = Record::new("1", Arc::new(schema)).with_value("Vorname", "Sheldon");
//! let id = los.add(&sheldon, true);
//! los.override_value(id, "Vorname", "Shelly").unwrap();
//!
//! let entry = los.selected().unwrap();
//! assert_eq!(entry.state(), EntryState::Linked);
//! assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Shelly"));
//! assert!(entry.is_different_from_background("Vorname"));
//! ```

pub mod cache_file;
pub mod entry;
pub mod error;
pub mod storage;

pub use entry::{is_local_key, EntryId, EntryState, LosEntry, SelectionMarker, LOCAL_KEY_PREFIX};
pub use error::{LosError, Result};
pub use storage::{LocalOverrideStorage, RefreshReport, SchemaDiff};
