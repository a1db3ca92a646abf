//! Result vocabulary for update operations.

/// Raw result of a single-document update as reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Number of documents matched by the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
    /// Whether the update inserted a new document through upsert.
    pub upserted: bool,
}

/// Outcome of [`CrudDao::update`](crate::dao::CrudDao::update).
///
/// Exactly one state holds per outcome. A missing match and a uniqueness conflict are
/// ordinary outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was applied; `inserted` is set when it created a document via upsert.
    Modified { inserted: bool },
    /// The filter matched nothing and upsert was disabled.
    NotFound,
    /// The update would have violated a uniqueness constraint.
    UniqueConflict,
}

impl UpdateOutcome {
    pub fn is_modified(&self) -> bool {
        matches!(self, UpdateOutcome::Modified { .. })
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, UpdateOutcome::Modified { inserted: true })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, UpdateOutcome::NotFound)
    }

    pub fn is_unique_conflict(&self) -> bool {
        matches!(self, UpdateOutcome::UniqueConflict)
    }
}
