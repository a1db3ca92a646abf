//! Index declarations attached to document types.

use bson::{Bson, Document as BsonDocument, doc};

/// Declares which fields to index on a collection and with what constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Index keys in declaration order, `1` for ascending and `-1` for descending.
    pub keys: BsonDocument,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Optional explicit index name.
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn compound(keys: BsonDocument) -> Self {
        Self { keys, unique: false, name: None }
    }

    pub fn ascending(field: &str) -> Self {
        Self::compound(doc! { field: 1 })
    }

    pub fn descending(field: &str) -> Self {
        Self::compound(doc! { field: -1 })
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the indexed field paths in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Returns the explicit name or the `field_direction` name MongoDB would generate.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        self.keys
            .iter()
            .map(|(field, direction)| match direction {
                Bson::Int32(d) => format!("{field}_{d}"),
                Bson::Int64(d) => format!("{field}_{d}"),
                other => format!("{field}_{other}"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}
