//! Directory service driver for recordjoin-query
//!
//! Maps the columns of a datasource onto attributes of directory entries.
//! A column path `depth:attribute` reads the attribute from the matched
//! entry (`0`) or from its ancestor `-depth` levels up, so values stored on
//! organisational units can be joined to the people below them.
//!
//! The wire protocol stays outside this crate: searches go through a
//! [`DirectoryClient`], which a [`DirectoryConnector`] creates for the `URL`
//! of a datasource definition.
//!
//! ```text
//! Datenquelle(
//!   NAME "personen"  TYPE "ldap"
//!   URL "ldap://verzeichnis:389"  BASE_DN "o=Uni"  OBJECT_CLASS "person"
//!   Spalten(
//!     (DB_SPALTE "Nachname"  PATH "0:sn")
//!     (DB_SPALTE "Abteilung" PATH "-1:ou")
//!   )
//!   Schluessel("Nachname")
//! )
//! ```

mod client;
mod filter;
mod key;
mod name;
mod source;

pub use client::{Credentials, DirectoryClient, DirectoryConnector, DirectoryEntry, SearchScope};
pub use filter::{escape, Filter};
pub use key::{KeyKind, ABSOLUTE_SEPARATOR, RELATIVE_SEPARATOR};
pub use name::Dn;
pub use source::{ColumnDefinition, LdapFactory, LdapSettings, LdapSource};
