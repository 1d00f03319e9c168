//! Datasources built out of other datasources

mod attach;
mod matching;
mod overlay;
mod prefer;
mod schema;
mod union;

pub use attach::{AttachFactory, AttachSource, ATTACH_SEPARATOR};
pub use overlay::{OverlayFactory, OverlayMode, OverlaySource};
pub use prefer::{PreferFactory, PreferSource};
pub use schema::{SchemaChanges, SchemaFactory, SchemaSource};
pub use union::{UnionFactory, UnionSource};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::sources::TableSource;
    use crate::traits::Datasource;
    use crate::types::Schema;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Table keyed by its first column
    pub(crate) fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> Arc<dyn Datasource> {
        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>()
            })
            .collect();
        let key = vec![columns[0].to_string()];
        Arc::new(TableSource::new(name, Schema::new(columns.iter().copied()), &key, rows).unwrap())
    }
}
